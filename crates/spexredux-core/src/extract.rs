//! Column-by-column extraction of a spectrum around the trace.

use std::ops::Range;

use ndarray::{s, Array2, ArrayView1};
use rayon::prelude::*;

use crate::calibration::CalibrationProfile;
use crate::consts::{DIGITIZATION_NOISE, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{ReduxError, Result};
use crate::pipeline::config::ExtractionConfig;
use crate::stats::{nan_mean, nan_sum};
use crate::trace::TraceLocation;

/// Rows summed for the object and rows averaged for the sky, clipped to the image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aperture {
    pub object: Range<usize>,
    pub sky_below: Range<usize>,
    pub sky_above: Range<usize>,
}

impl Aperture {
    /// Object rows `trunc(center) -/+ trunc(factor * width)` (at least one row
    /// each side), with a sky window of `sky_window` rows starting `sky_gap`
    /// rows beyond each edge.
    pub fn around(trace: &TraceLocation, factor: f64, sky_window: usize, sky_gap: usize, rows: usize) -> Self {
        let peak = (trace.center.max(0.0) as usize).min(rows.saturating_sub(1));
        let half = ((factor * trace.width) as usize).max(1);
        let lo = peak.saturating_sub(half);
        let hi = (peak + half).min(rows);

        let below_hi = lo.saturating_sub(sky_gap);
        let below_lo = below_hi.saturating_sub(sky_window);
        let above_lo = (hi + sky_gap).min(rows);
        let above_hi = (above_lo + sky_window).min(rows);

        Self {
            object: lo..hi,
            sky_below: below_lo..below_hi,
            sky_above: above_lo..above_hi,
        }
    }

    /// Number of object rows.
    pub fn width(&self) -> usize {
        self.object.len()
    }
}

/// Per-column extraction results, all of one length.
#[derive(Clone, Debug)]
pub struct Extraction {
    /// Aperture sum, electrons.
    pub raw: Vec<f64>,
    /// Aperture sum minus sky, electrons.
    pub rms: Vec<f64>,
    pub snr: Vec<f64>,
    pub aperture: Aperture,
    /// Columns where neither sky window had a finite pixel; sky was taken as zero.
    pub empty_sky_columns: usize,
}

struct Column {
    raw: f64,
    rms: f64,
    snr: f64,
    sky_missing: bool,
}

/// Sky-subtracted extraction with CCD-equation uncertainties.
///
/// For each column, with `n` object rows and sky level `S` (mean of the two
/// sky-window means):
///
/// ```text
/// raw = sum * gain
/// rms = (sum - S * n) * gain
/// err = sqrt(rms + n * (1 + n / (2 * sky_window)) *
///            (S * gain + dark_rate * exptime + read_noise^2 + gain^2 * 0.289^2))
/// snr = rms / err
/// ```
pub fn extract(
    image: &Array2<f64>,
    profile: &CalibrationProfile,
    trace: &TraceLocation,
    config: &ExtractionConfig,
    exptime: f64,
) -> Result<Extraction> {
    config.validate()?;
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Err(ReduxError::InvalidCalibration("cannot extract from an empty image".into()));
    }

    let aperture = Aperture::around(trace, config.factor, config.sky_window, config.sky_gap, rows);
    let n = aperture.width() as f64;
    let amplification = n * (1.0 + n / (2.0 * config.sky_window as f64));
    let gain = profile.gain;
    let floor = profile.dark_current_rate * exptime
        + profile.read_noise * profile.read_noise
        + gain * gain * DIGITIZATION_NOISE * DIGITIZATION_NOISE;

    let extract_column = |col: usize| -> Column {
        let column = image.column(col);
        let sum = nan_sum(column.slice(s![aperture.object.clone()]));
        let (sky, sky_missing) = sky_level(&column, &aperture);
        let rms = (sum - sky * n) * gain;
        let err = (rms + amplification * (sky * gain + floor)).sqrt();
        Column {
            raw: sum * gain,
            rms,
            snr: rms / err,
            sky_missing,
        }
    };

    let columns: Vec<Column> = if rows * cols >= PARALLEL_PIXEL_THRESHOLD {
        (0..cols).into_par_iter().map(extract_column).collect()
    } else {
        (0..cols).map(extract_column).collect()
    };

    let empty_sky_columns = columns.iter().filter(|c| c.sky_missing).count();
    Ok(Extraction {
        raw: columns.iter().map(|c| c.raw).collect(),
        rms: columns.iter().map(|c| c.rms).collect(),
        snr: columns.iter().map(|c| c.snr).collect(),
        aperture,
        empty_sky_columns,
    })
}

/// Mean of the available sky-window means. `(0.0, true)` if neither has data.
fn sky_level(column: &ArrayView1<'_, f64>, aperture: &Aperture) -> (f64, bool) {
    let means: Vec<f64> = [&aperture.sky_below, &aperture.sky_above]
        .into_iter()
        .filter(|r| !r.is_empty())
        .map(|r| nan_mean(column.slice(s![r.clone()])))
        .filter(|m| m.is_finite())
        .collect();
    if means.is_empty() {
        (0.0, true)
    } else {
        (means.iter().sum::<f64>() / means.len() as f64, false)
    }
}

/// Plain aperture sums with no sky subtraction or error propagation.
///
/// Used for arc-lamp frames, which only serve to locate reference lines.
pub fn extract_fixed(image: &Array2<f64>, trace: &TraceLocation, factor: f64) -> Vec<f64> {
    let (rows, _) = image.dim();
    if rows == 0 {
        return Vec::new();
    }
    let aperture = Aperture::around(trace, factor, 0, 0, rows);
    image
        .columns()
        .into_iter()
        .map(|column| nan_sum(column.slice(s![aperture.object.clone()])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aperture_truncates_like_integer_pixels() {
        let trace = TraceLocation {
            center: 25.7,
            width: 2.3,
        };
        let ap = Aperture::around(&trace, 2.0, 50, 10, 100);
        assert_eq!(ap.object, 21..29);
        assert_eq!(ap.sky_below, 0..11);
        assert_eq!(ap.sky_above, 39..89);
    }

    #[test]
    fn test_aperture_clipped_at_edge() {
        let trace = TraceLocation {
            center: 98.0,
            width: 3.0,
        };
        let ap = Aperture::around(&trace, 2.0, 50, 10, 100);
        assert_eq!(ap.object, 92..100);
        assert!(ap.sky_above.is_empty());
        assert_eq!(ap.sky_below, 32..82);
    }

    #[test]
    fn test_fixed_extraction_sums_aperture() {
        let mut image = Array2::zeros((20, 4));
        image.slice_mut(s![8..12, ..]).fill(1.0);
        let trace = TraceLocation {
            center: 10.0,
            width: 1.0,
        };
        let lamp = extract_fixed(&image, &trace, 2.0);
        assert_eq!(lamp, vec![4.0; 4]);
    }
}
