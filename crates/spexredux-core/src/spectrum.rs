use std::path::PathBuf;

use crate::error::Result;
use crate::trace::{FallbackReason, TraceOutcome};
use crate::wavecal::{CalibrationState, ReferencePoint, WaveCalibration};

/// One extracted object spectrum.
///
/// All per-bin arrays have the same length (the detector's dispersion-axis
/// size) and index `i` refers to the same detector column in each of them.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub name: String,
    /// Summed aperture flux, electrons.
    pub raw: Vec<f64>,
    /// Raw minus local sky, electrons.
    pub rms: Vec<f64>,
    /// Signal-to-noise ratio from the CCD equation.
    pub snr: Vec<f64>,
    /// Calibrated wavelength per bin; zero until solved.
    pub wv: Vec<f64>,
    /// Spectrum used to identify reference lines (lamp extraction or a copy of `rms`).
    pub waves: Vec<f64>,
    /// Continuum-normalized `rms`; zero until rectified.
    pub rectified: Vec<f64>,
    pub wavecal: WaveCalibration,
    pub provenance: Provenance,
}

impl Spectrum {
    /// An empty spectrum of `len` bins.
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            raw: vec![0.0; len],
            rms: vec![0.0; len],
            snr: vec![0.0; len],
            wv: vec![0.0; len],
            waves: vec![0.0; len],
            rectified: vec![0.0; len],
            wavecal: WaveCalibration::default(),
            provenance: Provenance::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.rms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rms.is_empty()
    }

    pub fn is_solved(&self) -> bool {
        matches!(self.wavecal.state(), CalibrationState::Solved { .. })
    }

    /// True once `wv` holds wavelengths: solved here, or read back from a
    /// spectrum file written after calibration.
    pub fn has_wavelengths(&self) -> bool {
        self.is_solved() || self.wv.iter().any(|&w| w != 0.0)
    }

    /// Select reference lines for wavelength calibration.
    pub fn select_reference_points(&mut self, points: Vec<ReferencePoint>) -> Result<()> {
        self.wavecal.select_points(points)
    }

    /// Solve the dispersion relation and fill `wv`.
    pub fn solve_wavelengths(&mut self) -> Result<()> {
        self.wv = self.wavecal.solve(self.len())?;
        Ok(())
    }

    /// Discard the wavelength solution (and optionally the selected lines).
    pub fn reset_wavelengths(&mut self, keep_points: bool) {
        self.wavecal.reset(keep_points);
        self.wv.iter_mut().for_each(|w| *w = 0.0);
    }

    pub fn mean_snr(&self) -> f64 {
        let finite: Vec<f64> = self.snr.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        finite.iter().sum::<f64>() / finite.len() as f64
    }
}

impl std::fmt::Display for Spectrum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Spectrum for {}", self.name)
    }
}

/// How dark current was removed from a source frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DarkSubtraction {
    /// Master dark of the matching exposure time.
    MasterDark { exptime: f64 },
    /// No matching master dark; the scalar bias level was subtracted.
    BiasLevel(f64),
}

/// Recoverable conditions met while reducing one source frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ReductionWarning {
    UnmatchedExposureTime { exptime: f64 },
    TraceFallback(FallbackReason),
    /// Columns where neither sky window held a finite pixel.
    EmptySkyWindows { columns: usize },
    /// The cross-dispersion profile had no finite value; nothing was extracted.
    TraceNotFound,
}

impl std::fmt::Display for ReductionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmatchedExposureTime { exptime } => {
                write!(f, "no master dark for {exptime}s; bias level subtracted")
            }
            Self::TraceFallback(reason) => write!(f, "trace fit rejected: {reason}"),
            Self::EmptySkyWindows { columns } => {
                write!(f, "{columns} column(s) had no usable sky pixels")
            }
            Self::TraceNotFound => write!(f, "no finite trace profile; source skipped"),
        }
    }
}

/// A source frame that produced no spectrum, and why.
#[derive(Clone, Debug)]
pub struct SkippedSource {
    pub name: String,
    pub source: Option<PathBuf>,
    pub warnings: Vec<ReductionWarning>,
}

/// Where a spectrum came from and which fallbacks were taken.
#[derive(Clone, Debug, Default)]
pub struct Provenance {
    pub source: Option<PathBuf>,
    pub exptime: Option<f64>,
    pub trace: Option<TraceOutcome>,
    pub dark: Option<DarkSubtraction>,
    pub warnings: Vec<ReductionWarning>,
}
