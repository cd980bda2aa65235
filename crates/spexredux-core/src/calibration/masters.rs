//! Master calibration frames.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info};

use crate::error::{ReduxError, Result};
use crate::frame::{Frame, ImageStack};
use crate::io::image_io::save_fits;
use crate::stack::median::median_stack;
use crate::stats::{mode, nan_median};

use super::darks::DarkGroup;

/// Median-combined dark frame for one exposure time.
#[derive(Clone, Debug)]
pub struct MasterDark {
    pub exptime: f64,
    pub frame: Frame,
}

/// Master darks sorted by exposure time.
#[derive(Clone, Debug, Default)]
pub struct MasterDarks {
    darks: Vec<MasterDark>,
}

impl MasterDarks {
    /// Median-combine every group.
    pub fn from_groups(groups: &[DarkGroup]) -> Result<Self> {
        let mut darks = groups
            .iter()
            .map(|group| {
                let mut frame = median_stack(&group.frames)?;
                frame.metadata.exptime = Some(group.exptime);
                debug!(
                    exptime = group.exptime,
                    frames = group.frames.len(),
                    "Combined master dark"
                );
                Ok(MasterDark {
                    exptime: group.exptime,
                    frame,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        darks.sort_by(|a, b| a.exptime.total_cmp(&b.exptime));
        Ok(Self { darks })
    }

    /// The master dark closest to `exptime`, if within `tolerance` seconds.
    ///
    /// A tolerance of zero demands an exact match.
    pub fn matching(&self, exptime: f64, tolerance: f64) -> Option<&MasterDark> {
        self.darks
            .iter()
            .filter(|d| (d.exptime - exptime).abs() <= tolerance)
            .min_by(|a, b| {
                (a.exptime - exptime)
                    .abs()
                    .total_cmp(&(b.exptime - exptime).abs())
            })
    }

    pub fn exptimes(&self) -> Vec<f64> {
        self.darks.iter().map(|d| d.exptime).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MasterDark> {
        self.darks.iter()
    }

    pub fn len(&self) -> usize {
        self.darks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.darks.is_empty()
    }
}

/// Median-combine the flats, subtract the bias level and divide by the
/// statistical mode so the result is centered on 1.0.
///
/// The mode resists skew from bright or dark features better than the mean.
/// When no pixel value repeats (the mode is undefined), the median is used.
pub fn master_flat(flats: &ImageStack, bias_level: f64) -> Result<Frame> {
    let combined = median_stack(flats.frames())?;
    let debiased: Array2<f64> = combined.data.mapv(|v| v - bias_level);

    let values: Vec<f64> = debiased.iter().copied().collect();
    let norm = match mode(&values) {
        Some(m) => m,
        None => {
            let mut values = values;
            nan_median(&mut values)
        }
    };
    if !(norm.is_finite() && norm != 0.0) {
        return Err(ReduxError::InvalidCalibration(format!(
            "flat field normalization level is {norm}"
        )));
    }
    debug!(norm, "Normalized master flat");

    Ok(Frame::new(debiased.mapv(|v| v / norm)))
}

/// Median-combine the bias frames into a master bias.
pub fn master_bias(bias: &ImageStack) -> Result<Frame> {
    median_stack(bias.frames())
}

/// Remove dark (or the bias level) and divide by the flat.
pub fn correct_frame(data: &Array2<f64>, dark: DarkReference<'_>, flat: &Array2<f64>) -> Array2<f64> {
    let mut out = match dark {
        DarkReference::Frame(dark) => data - dark,
        DarkReference::Level(level) => data.mapv(|v| v - level),
    };
    out /= flat;
    out
}

/// What to subtract from a source frame before flat-fielding.
#[derive(Clone, Copy, Debug)]
pub enum DarkReference<'a> {
    Frame(&'a Array2<f64>),
    Level(f64),
}

/// Write `masterbias.fits`, `masterflat.fits` and one
/// `masterdark<exptime>s.fits` per dark group into `dir`.
pub fn export_masters(
    dir: &Path,
    bias: &Frame,
    flat: &Frame,
    darks: &MasterDarks,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(darks.len() + 2);

    let path = dir.join("masterbias.fits");
    save_fits(bias, &path)?;
    written.push(path);

    let path = dir.join("masterflat.fits");
    save_fits(flat, &path)?;
    written.push(path);

    for dark in darks.iter() {
        let path = dir.join(format!("masterdark{}s.fits", dark.exptime));
        save_fits(&dark.frame, &path)?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), "Exported master calibration frames");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dark_set(exptimes: &[f64]) -> MasterDarks {
        let groups: Vec<DarkGroup> = exptimes
            .iter()
            .map(|&exptime| DarkGroup {
                exptime,
                frames: vec![Frame::new(Array2::from_elem((2, 2), exptime))],
            })
            .collect();
        MasterDarks::from_groups(&groups).unwrap()
    }

    #[test]
    fn test_exact_match_required_by_default() {
        let darks = dark_set(&[120.0, 30.0]);
        assert_eq!(darks.exptimes(), vec![30.0, 120.0]);
        assert_eq!(darks.matching(30.0, 0.0).unwrap().exptime, 30.0);
        assert!(darks.matching(30.5, 0.0).is_none());
    }

    #[test]
    fn test_tolerance_picks_closest() {
        let darks = dark_set(&[30.0, 32.0]);
        assert_eq!(darks.matching(31.5, 2.0).unwrap().exptime, 32.0);
    }

    #[test]
    fn test_correct_with_level() {
        let data = Array2::from_elem((2, 2), 110.0);
        let flat = Array2::from_elem((2, 2), 2.0);
        let out = correct_frame(&data, DarkReference::Level(10.0), &flat);
        assert!(out.iter().all(|&v| v == 50.0));
    }
}
