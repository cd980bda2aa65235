//! Pixel-to-wavelength calibration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{LINE_SNAP_BUFFER, MIN_REFERENCE_POINTS, QUADRATIC_MIN_POINTS};
use crate::error::{ReduxError, Result};
use crate::fit::{fit_polynomial, Polynomial};
use crate::spectrum::Spectrum;

/// A detector column identified with a known line wavelength.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub pixel: f64,
    pub wavelength: f64,
}

impl ReferencePoint {
    pub fn new(pixel: f64, wavelength: f64) -> Self {
        Self { pixel, wavelength }
    }
}

/// Progress of one spectrum's wavelength calibration.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CalibrationState {
    #[default]
    Unsolved,
    /// Points sorted by pixel, at least two of them.
    PointsSelected { points: Vec<ReferencePoint> },
    Solved {
        points: Vec<ReferencePoint>,
        fit: Polynomial,
    },
}

/// Wavelength calibration state machine:
/// `Unsolved -> PointsSelected -> Solved`, and back with [`reset`](Self::reset).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WaveCalibration {
    state: CalibrationState,
}

impl WaveCalibration {
    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn points(&self) -> Option<&[ReferencePoint]> {
        match &self.state {
            CalibrationState::Unsolved => None,
            CalibrationState::PointsSelected { points } | CalibrationState::Solved { points, .. } => {
                Some(points)
            }
        }
    }

    pub fn fit(&self) -> Option<&Polynomial> {
        match &self.state {
            CalibrationState::Solved { fit, .. } => Some(fit),
            _ => None,
        }
    }

    /// Record reference points, replacing any earlier selection.
    ///
    /// A solved calibration must be [`reset`](Self::reset) first.
    pub fn select_points(&mut self, mut points: Vec<ReferencePoint>) -> Result<()> {
        if matches!(self.state, CalibrationState::Solved { .. }) {
            return Err(ReduxError::InvalidState(
                "calibration is solved; reset it before selecting new points".into(),
            ));
        }
        if points.len() < MIN_REFERENCE_POINTS {
            return Err(ReduxError::TooFewReferencePoints {
                required: MIN_REFERENCE_POINTS,
                found: points.len(),
            });
        }
        if let Some(bad) = points
            .iter()
            .find(|p| !p.pixel.is_finite() || !p.wavelength.is_finite())
        {
            return Err(ReduxError::InvalidConfig(format!(
                "non-finite reference point {bad:?}"
            )));
        }
        points.sort_by(|a, b| a.pixel.total_cmp(&b.pixel));
        self.state = CalibrationState::PointsSelected { points };
        Ok(())
    }

    /// Fit the dispersion relation and evaluate it at pixels `0..len`.
    ///
    /// Quadratic with four or more points, linear otherwise.
    pub fn solve(&mut self, len: usize) -> Result<Vec<f64>> {
        let points = match &self.state {
            CalibrationState::Unsolved => {
                return Err(ReduxError::InvalidState(
                    "no reference points selected".into(),
                ))
            }
            CalibrationState::PointsSelected { points } | CalibrationState::Solved { points, .. } => {
                points.clone()
            }
        };

        let degree = if points.len() >= QUADRATIC_MIN_POINTS { 2 } else { 1 };
        let pixels: Vec<f64> = points.iter().map(|p| p.pixel).collect();
        let wavelengths: Vec<f64> = points.iter().map(|p| p.wavelength).collect();
        let fit = fit_polynomial(&pixels, &wavelengths, degree)?;
        debug!(degree, coefficients = ?fit.coefficients, "Solved dispersion relation");

        let wv = (0..len).map(|i| fit.evaluate(i as f64)).collect();
        self.state = CalibrationState::Solved { points, fit };
        Ok(wv)
    }

    /// Drop the fit, keeping the selected points if asked to.
    pub fn reset(&mut self, keep_points: bool) {
        let state = std::mem::take(&mut self.state);
        self.state = match state {
            CalibrationState::PointsSelected { points } | CalibrationState::Solved { points, .. }
                if keep_points =>
            {
                CalibrationState::PointsSelected { points }
            }
            _ => CalibrationState::Unsolved,
        };
    }
}

/// Deepest point of `waves` within the snap window around `pixel`.
///
/// The window covers `pixel - 5 .. pixel + 5` (exclusive end), clipped to the
/// spectrum. Ties go to the lowest index. `None` if no finite value lies in it.
pub fn snap_to_line(waves: &[f64], pixel: usize) -> Option<usize> {
    let lo = pixel.saturating_sub(LINE_SNAP_BUFFER);
    let hi = (pixel + LINE_SNAP_BUFFER).min(waves.len());
    (lo..hi)
        .filter(|&i| waves[i].is_finite())
        .min_by(|&a, &b| waves[a].total_cmp(&waves[b]))
}

/// Spacing between successive reference lines, learned from one spectrum and
/// replayed on others that share the same dispersion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineKeys {
    /// Pixel distance from each line to the next.
    pub offsets: Vec<i64>,
}

impl LineKeys {
    /// Learn offsets from line pixels identified on a template spectrum.
    pub fn from_pixels(pixels: &[usize]) -> Option<Self> {
        if pixels.is_empty() {
            return None;
        }
        let mut sorted = pixels.to_vec();
        sorted.sort_unstable();
        let offsets = sorted
            .windows(2)
            .map(|w| w[1] as i64 - w[0] as i64)
            .collect();
        Some(Self { offsets })
    }

    /// Line pixels starting at `anchor`, stopping at the first one that falls
    /// outside a spectrum of `len` bins.
    pub fn place(&self, anchor: usize, len: usize) -> Vec<usize> {
        if anchor >= len {
            return Vec::new();
        }
        let mut placed = vec![anchor];
        let mut current = anchor as i64;
        for &offset in &self.offsets {
            current += offset;
            if current < 0 || current >= len as i64 {
                break;
            }
            placed.push(current as usize);
        }
        placed
    }
}

/// Names of spectra that still lack a wavelength solution.
pub fn unsolved(spectra: &[Spectrum]) -> Vec<&str> {
    spectra
        .iter()
        .filter(|s| !s.is_solved())
        .map(|s| s.name.as_str())
        .collect()
}

/// A batch is complete once every spectrum is solved.
pub fn require_solved(spectra: &[Spectrum]) -> Result<()> {
    let missing = unsolved(spectra);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReduxError::InvalidState(format!(
            "{} spectra lack a wavelength solution: {}",
            missing.len(),
            missing.join(", ")
        )))
    }
}
