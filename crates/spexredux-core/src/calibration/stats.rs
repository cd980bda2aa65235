//! Detector noise characteristics from calibration frames.

use ndarray::Array2;
use tracing::{debug, info};

use crate::error::{ReduxError, Result};
use crate::frame::{Frame, ImageStack};
use crate::stats::{nan_mean, nan_median, nan_std};

/// Gain and read noise from Howell's bias/flat pair method.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainEstimate {
    /// Electrons per ADU.
    pub gain: f64,
    /// Electrons per pixel.
    pub read_noise: f64,
    /// Bias-pair x flat-pair combinations evaluated.
    pub pairs: usize,
    /// Combinations excluded because the variance difference was not positive.
    pub degenerate: usize,
}

/// Scalar bias level: the median over every pixel of every bias frame.
pub fn bias_level(bias: &ImageStack) -> f64 {
    let mut values: Vec<f64> = bias
        .iter()
        .flat_map(|frame| frame.data.iter().copied())
        .collect();
    nan_median(&mut values)
}

/// Gain and read noise from every consecutive bias pair crossed with every
/// consecutive flat pair.
///
/// Per combination:
/// `gain = ((F1 + F2) - (B1 + B2)) / (var(F1 - F2) - var(B1 - B2))` on frame
/// means, and `read_noise = gain * std(B1 - B2) / sqrt(2)`. Combinations with
/// a non-positive variance difference are skipped. Returns `Ok(None)` when
/// either stack has a single frame, since no pair exists.
pub fn gain_and_read_noise(bias: &ImageStack, flats: &ImageStack) -> Result<Option<GainEstimate>> {
    if bias.dim() != flats.dim() {
        return Err(ReduxError::DimensionMismatch {
            path: flats.frames()[0].metadata.source.clone().unwrap_or_default(),
            expected: bias.dim(),
            found: flats.dim(),
        });
    }

    let bias_pairs: Vec<PairStats> = consecutive_pairs(bias.frames());
    let flat_pairs: Vec<PairStats> = consecutive_pairs(flats.frames());
    let pairs = bias_pairs.len() * flat_pairs.len();
    if pairs == 0 {
        debug!(
            bias_frames = bias.depth(),
            flat_frames = flats.depth(),
            "Too few calibration frames for Howell's method"
        );
        return Ok(None);
    }

    let mut gains = Vec::with_capacity(pairs);
    let mut read_noises = Vec::with_capacity(pairs);
    for b in &bias_pairs {
        for f in &flat_pairs {
            let denominator = f.diff_std * f.diff_std - b.diff_std * b.diff_std;
            let gain = if denominator > 0.0 {
                (f.mean_sum - b.mean_sum) / denominator
            } else {
                f64::NAN
            };
            gains.push(gain);
            read_noises.push(gain * b.diff_std / std::f64::consts::SQRT_2);
        }
    }

    let degenerate = gains.iter().filter(|g| g.is_nan()).count();
    if degenerate == pairs {
        return Err(ReduxError::DegenerateGain { pairs });
    }

    let estimate = GainEstimate {
        gain: nan_mean(&gains),
        read_noise: nan_mean(&read_noises),
        pairs,
        degenerate,
    };
    info!(
        gain = estimate.gain,
        read_noise = estimate.read_noise,
        pairs,
        degenerate,
        "Measured detector gain and read noise"
    );
    Ok(Some(estimate))
}

/// Mean dark current in electrons per second per pixel.
///
/// `mean((dark - bias_level) * gain) / exptime`, with NaN pixels counted as zero.
pub fn dark_current_rate(master_dark: &Array2<f64>, bias_level: f64, gain: f64, exptime: f64) -> f64 {
    if master_dark.is_empty() || exptime <= 0.0 {
        return 0.0;
    }
    let total: f64 = master_dark
        .iter()
        .map(|&v| if v.is_nan() { 0.0 } else { v })
        .map(|v| (v - bias_level) * gain)
        .sum();
    total / master_dark.len() as f64 / exptime
}

/// Sum of the two frame means and the std of their difference.
struct PairStats {
    mean_sum: f64,
    diff_std: f64,
}

fn consecutive_pairs(frames: &[Frame]) -> Vec<PairStats> {
    frames
        .windows(2)
        .map(|pair| {
            let (a, b) = (&pair[0].data, &pair[1].data);
            let diff: Vec<f64> = (a - b).into_iter().collect();
            PairStats {
                mean_sum: nan_mean(a.iter()) + nan_mean(b.iter()),
                diff_std: nan_std(&diff),
            }
        })
        .collect()
}
