use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_EXTRACTION_FACTOR, DEFAULT_SKY_GAP, DEFAULT_SKY_WINDOW};
use crate::error::{ReduxError, Result};

/// Parameters for a night's reduction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Directory for master calibration frames, if they should be exported.
    pub masters_dir: Option<PathBuf>,
    pub extraction: ExtractionConfig,
    pub trace: TraceConfig,
    pub darks: DarkConfig,
    pub detector: DetectorConfig,
}

impl ReductionConfig {
    /// Reject parameter values no reduction can run with.
    pub fn validate(&self) -> Result<()> {
        self.extraction.validate()?;
        if !(self.darks.exptime_tolerance >= 0.0) {
            return Err(ReduxError::InvalidConfig(format!(
                "dark exposure tolerance must be >= 0, got {}",
                self.darks.exptime_tolerance
            )));
        }
        if let Some(gain) = self.detector.gain {
            if !(gain > 0.0 && gain.is_finite()) {
                return Err(ReduxError::InvalidConfig(format!(
                    "detector gain must be positive, got {gain}"
                )));
            }
        }
        if let Some(read_noise) = self.detector.read_noise {
            if !(read_noise >= 0.0 && read_noise.is_finite()) {
                return Err(ReduxError::InvalidConfig(format!(
                    "read noise must be >= 0, got {read_noise}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Aperture half-width in units of the trace sigma.
    pub factor: f64,
    /// Width (pixels) of each flanking sky window.
    pub sky_window: usize,
    /// Pixels between the aperture edge and each sky window.
    pub sky_gap: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            factor: DEFAULT_EXTRACTION_FACTOR,
            sky_window: DEFAULT_SKY_WINDOW,
            sky_gap: DEFAULT_SKY_GAP,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.factor > 0.0 && self.factor.is_finite()) {
            return Err(ReduxError::InvalidConfig(format!(
                "extraction factor must be positive, got {}",
                self.factor
            )));
        }
        if self.sky_window == 0 {
            return Err(ReduxError::InvalidConfig(
                "sky window must be at least one pixel wide".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub use_fit: FitSelection,
}

/// Whether to Gaussian-fit the trace: once for all images, or per image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FitSelection {
    All(bool),
    PerImage(Vec<bool>),
}

impl Default for FitSelection {
    fn default() -> Self {
        Self::All(true)
    }
}

impl FitSelection {
    /// Resolve to exactly one flag per source image.
    pub fn flags(&self, images: usize) -> Result<Vec<bool>> {
        match self {
            Self::All(flag) => Ok(vec![*flag; images]),
            Self::PerImage(flags) if flags.len() == images => Ok(flags.clone()),
            Self::PerImage(flags) => Err(ReduxError::InvalidConfig(format!(
                "use_fit lists {} flags for {images} source images",
                flags.len()
            ))),
        }
    }
}

/// How dark frames are sorted into exposure-time groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DarkGrouping {
    /// Parse `<prefix>NNN-<exptime><suffix>` file names.
    #[default]
    FileName,
    /// Read EXPTIME from each frame's header.
    Header,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkConfig {
    pub grouping: DarkGrouping,
    pub prefix: String,
    pub suffix: String,
    /// Largest exposure-time difference (seconds) still matching a master dark.
    pub exptime_tolerance: f64,
}

impl Default for DarkConfig {
    fn default() -> Self {
        Self {
            grouping: DarkGrouping::FileName,
            prefix: "dark-".into(),
            suffix: "s.fit".into(),
            exptime_tolerance: 0.0,
        }
    }
}

/// Known detector properties, overriding values measured from bias/flat pairs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Electrons per ADU.
    pub gain: Option<f64>,
    /// Electrons per pixel.
    pub read_noise: Option<f64>,
}
