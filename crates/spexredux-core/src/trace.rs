//! Locating the stellar trace along the cross-dispersion axis.

use ndarray::{Array2, Axis};
use tracing::debug;

use crate::consts::{
    FALLBACK_TRACE_WIDTH, TRACE_DIVERGENCE_LIMIT, TRACE_INITIAL_AMPLITUDE, TRACE_INITIAL_OFFSET,
    TRACE_MEDIAN_FILTER_SIZE,
};
use crate::error::{ReduxError, Result};
use crate::filters::median_filter::median_filter;
use crate::fit::{optimize, LmConfig, LmModel, LmResult};
use crate::stats::nan_median;

/// Position and Gaussian width of the trace, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceLocation {
    pub center: f64,
    pub width: f64,
}

/// Why a Gaussian fit was replaced by the profile maximum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FallbackReason {
    /// Fitted center strayed at least the divergence limit from the maximum.
    Diverged { fitted_center: f64 },
    NotConverged,
    /// Fitted sigma was zero or non-finite.
    InvalidWidth { fitted_width: f64 },
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diverged { fitted_center } => {
                write!(f, "fitted center {fitted_center:.2} too far from profile maximum")
            }
            Self::NotConverged => write!(f, "Gaussian fit did not converge"),
            Self::InvalidWidth { fitted_width } => {
                write!(f, "fitted width {fitted_width} is not usable")
            }
        }
    }
}

/// Which path produced a [`TraceLocation`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TraceMethod {
    Fitted,
    /// Fitting was not requested.
    PeakOnly,
    Fallback(FallbackReason),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceOutcome {
    pub location: TraceLocation,
    pub method: TraceMethod,
    /// Row of the collapsed profile's maximum.
    pub peak: usize,
}

/// `cont + a * exp(-(x - x0)^2 / (2 sigma^2))`, params `[a, x0, sigma, cont]`.
pub struct GaussianWithOffset;

impl LmModel<4> for GaussianWithOffset {
    fn evaluate(&self, x: f64, p: &[f64; 4]) -> f64 {
        let [a, x0, sigma, cont] = *p;
        let dx = x - x0;
        cont + a * (-dx * dx / (2.0 * sigma * sigma)).exp()
    }

    fn jacobian_row(&self, x: f64, p: &[f64; 4]) -> [f64; 4] {
        let [a, x0, sigma, _] = *p;
        let dx = x - x0;
        let s2 = sigma * sigma;
        let e = (-dx * dx / (2.0 * s2)).exp();
        [e, a * e * dx / s2, a * e * dx * dx / (s2 * sigma), 1.0]
    }
}

/// Median-filter the image and collapse it across the dispersion axis.
///
/// Returns one value per row.
pub fn collapse_profile(image: &Array2<f64>) -> Vec<f64> {
    let filtered = median_filter(image, TRACE_MEDIAN_FILTER_SIZE);
    filtered
        .axis_iter(Axis(0))
        .map(|row| {
            let mut values: Vec<f64> = row.iter().copied().collect();
            nan_median(&mut values)
        })
        .collect()
}

/// Locate the trace in a calibrated 2-D spectral image.
pub fn locate(image: &Array2<f64>, use_fit: bool) -> Result<TraceOutcome> {
    let profile = collapse_profile(image);
    locate_in_profile(&profile, use_fit)
}

/// Locate the trace in an already collapsed cross-dispersion profile.
///
/// Non-finite samples are dropped; positions keep their original row index.
pub fn locate_in_profile(profile: &[f64], use_fit: bool) -> Result<TraceOutcome> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = profile
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i as f64, v))
        .unzip();
    if xs.is_empty() {
        return Err(ReduxError::InvalidCalibration(
            "cross-dispersion profile has no finite values".into(),
        ));
    }

    let mut peak_idx = 0;
    for (i, &y) in ys.iter().enumerate() {
        if y > ys[peak_idx] {
            peak_idx = i;
        }
    }
    let peak = xs[peak_idx] as usize;

    let outcome = if use_fit {
        let initial = [
            TRACE_INITIAL_AMPLITUDE,
            peak as f64,
            FALLBACK_TRACE_WIDTH,
            TRACE_INITIAL_OFFSET,
        ];
        let fit = optimize(&GaussianWithOffset, &xs, &ys, initial, &LmConfig::default());
        accept_fit(peak, &fit)
    } else {
        TraceOutcome {
            location: peak_location(peak),
            method: TraceMethod::PeakOnly,
            peak,
        }
    };

    debug!(
        peak,
        center = outcome.location.center,
        width = outcome.location.width,
        method = ?outcome.method,
        "Trace located"
    );
    Ok(outcome)
}

/// Keep a Gaussian fit only if it converged to a usable width near the peak.
pub fn accept_fit(peak: usize, fit: &LmResult<4>) -> TraceOutcome {
    let [_, center, sigma, _] = fit.params;
    let reason = if !fit.converged {
        Some(FallbackReason::NotConverged)
    } else if !center.is_finite() || (center - peak as f64).abs() >= TRACE_DIVERGENCE_LIMIT {
        Some(FallbackReason::Diverged {
            fitted_center: center,
        })
    } else if !sigma.is_finite() || sigma == 0.0 {
        Some(FallbackReason::InvalidWidth {
            fitted_width: sigma,
        })
    } else {
        None
    };

    match reason {
        Some(reason) => TraceOutcome {
            location: peak_location(peak),
            method: TraceMethod::Fallback(reason),
            peak,
        },
        None => TraceOutcome {
            location: TraceLocation {
                center,
                width: sigma.abs(),
            },
            method: TraceMethod::Fitted,
            peak,
        },
    }
}

fn peak_location(peak: usize) -> TraceLocation {
    TraceLocation {
        center: peak as f64,
        width: FALLBACK_TRACE_WIDTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_fit(center: f64, sigma: f64, converged: bool) -> LmResult<4> {
        LmResult {
            params: [100.0, center, sigma, 0.0],
            chi2: 0.0,
            converged,
            iterations: 1,
        }
    }

    #[test]
    fn test_accept_close_fit() {
        let outcome = accept_fit(20, &fake_fit(21.5, -2.5, true));
        assert_eq!(outcome.method, TraceMethod::Fitted);
        assert_eq!(outcome.location.center, 21.5);
        assert_eq!(outcome.location.width, 2.5);
    }

    #[test]
    fn test_diverged_fit_falls_back_to_peak() {
        let outcome = accept_fit(20, &fake_fit(25.0, 2.0, true));
        assert!(matches!(
            outcome.method,
            TraceMethod::Fallback(FallbackReason::Diverged { .. })
        ));
        assert_eq!(outcome.location.center, 20.0);
        assert_eq!(outcome.location.width, FALLBACK_TRACE_WIDTH);
    }

    #[test]
    fn test_unconverged_fit_falls_back() {
        let outcome = accept_fit(7, &fake_fit(7.0, 2.0, false));
        assert_eq!(
            outcome.method,
            TraceMethod::Fallback(FallbackReason::NotConverged)
        );
        assert_eq!(outcome.location.center, 7.0);
    }

    #[test]
    fn test_profile_nan_keeps_row_positions() {
        let mut profile = vec![1.0; 30];
        profile[3] = f64::NAN;
        profile[4] = f64::INFINITY;
        profile[17] = 50.0;
        let outcome = locate_in_profile(&profile, false).unwrap();
        assert_eq!(outcome.peak, 17);
        assert_eq!(outcome.method, TraceMethod::PeakOnly);
    }
}
