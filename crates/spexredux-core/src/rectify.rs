//! Continuum rectification with a natural cubic spline.

use tracing::debug;

use crate::error::{ReduxError, Result};
use crate::spectrum::Spectrum;
use crate::stats::nan_median;

/// Natural cubic spline (zero second derivative at both ends).
///
/// Segment `i` is `a + b*dx + c*dx^2 + d*dx^3` with `dx = x - x[i]`.
/// Outside the knot range the end values are held constant.
#[derive(Clone, Debug)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    coeffs: Vec<[f64; 4]>,
}

impl CubicSpline {
    /// Knots must be strictly increasing, with at least two of them.
    pub fn natural(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(ReduxError::InvalidConfig(format!(
                "{} knots for {} values",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(ReduxError::TooFewReferencePoints {
                required: 2,
                found: x.len(),
            });
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(ReduxError::InvalidConfig(
                "spline knots must be strictly increasing".into(),
            ));
        }

        let coeffs = natural_coefficients(&x, &y);
        Ok(Self { x, y, coeffs })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let last = self.x.len() - 1;
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[last] {
            return self.y[last];
        }
        // First knot strictly greater than x, minus one.
        let segment = self.x.partition_point(|&k| k <= x) - 1;
        let dx = x - self.x[segment];
        let [a, b, c, d] = self.coeffs[segment];
        a + dx * (b + dx * (c + dx * d))
    }
}

/// Thomas-algorithm solve of the natural-spline tridiagonal system.
fn natural_coefficients(x: &[f64], y: &[f64]) -> Vec<[f64; 4]> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    let mut alpha = vec![0.0; n];
    for i in 1..n - 1 {
        alpha[i] = 3.0 / h[i] * (y[i + 1] - y[i]) - 3.0 / h[i - 1] * (y[i] - y[i - 1]);
    }

    let mut l = vec![1.0; n];
    let mut mu = vec![0.0; n];
    let mut z = vec![0.0; n];
    for i in 1..n - 1 {
        l[i] = 2.0 * (x[i + 1] - x[i - 1]) - h[i - 1] * mu[i - 1];
        mu[i] = h[i] / l[i];
        z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
    }

    let mut c = vec![0.0; n];
    let mut coeffs = vec![[0.0; 4]; n - 1];
    for j in (0..n - 1).rev() {
        c[j] = z[j] - mu[j] * c[j + 1];
        let b = (y[j + 1] - y[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
        let d = (c[j + 1] - c[j]) / (3.0 * h[j]);
        coeffs[j] = [y[j], b, c[j], d];
    }
    coeffs
}

/// A continuum point: the median flux in a wavelength window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContinuumAnchor {
    pub wavelength: f64,
    pub level: f64,
}

/// Median of `flux` over bins with `|wv - anchor| <= window / 2`, per anchor.
///
/// Anchors are returned sorted by wavelength.
pub fn continuum_anchors(
    wv: &[f64],
    flux: &[f64],
    anchors: &[f64],
    window: f64,
) -> Result<Vec<ContinuumAnchor>> {
    if !(window > 0.0) {
        return Err(ReduxError::InvalidConfig(format!(
            "continuum window must be positive, got {window}"
        )));
    }
    let half = window / 2.0;

    let mut result = anchors
        .iter()
        .map(|&anchor| {
            let mut values: Vec<f64> = wv
                .iter()
                .zip(flux.iter())
                .filter(|(&w, _)| (w - anchor).abs() <= half)
                .map(|(_, &f)| f)
                .collect();
            let level = nan_median(&mut values);
            if level.is_nan() {
                return Err(ReduxError::InvalidConfig(format!(
                    "no spectrum bins within {half} of continuum point {anchor}"
                )));
            }
            Ok(ContinuumAnchor {
                wavelength: anchor,
                level,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    result.sort_by(|a, b| a.wavelength.total_cmp(&b.wavelength));
    Ok(result)
}

/// Divide the spectrum's `rms` by a spline continuum through `anchors`,
/// storing the result in `rectified`. Returns the continuum.
///
/// Requires calibrated wavelengths.
pub fn rectify(spectrum: &mut Spectrum, anchors: &[f64], window: f64) -> Result<Vec<f64>> {
    if !spectrum.has_wavelengths() {
        return Err(ReduxError::InvalidState(format!(
            "{} has no wavelength solution",
            spectrum.name
        )));
    }
    let points = continuum_anchors(&spectrum.wv, &spectrum.rms, anchors, window)?;
    let spline = CubicSpline::natural(
        points.iter().map(|p| p.wavelength).collect(),
        points.iter().map(|p| p.level).collect(),
    )?;

    let continuum: Vec<f64> = spectrum.wv.iter().map(|&w| spline.evaluate(w)).collect();
    spectrum.rectified = spectrum
        .rms
        .iter()
        .zip(continuum.iter())
        .map(|(&f, &c)| f / c)
        .collect();
    debug!(spectrum = %spectrum.name, anchors = points.len(), "Rectified continuum");
    Ok(continuum)
}
