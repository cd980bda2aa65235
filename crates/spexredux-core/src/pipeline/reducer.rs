use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::calibration::{
    bias_level, correct_frame, dark_current_rate, export_masters, gain_and_read_noise,
    group_darks, master_bias, master_flat, CalibrationProfile, DarkReference, MasterDarks,
};
use crate::consts::{
    DEFAULT_DETECTOR_GAIN, DEFAULT_DETECTOR_READ_NOISE, EXPTIME_KEY, PARALLEL_FRAME_THRESHOLD,
};
use crate::error::{ReduxError, Result};
use crate::extract::{extract, extract_fixed};
use crate::frame::{Frame, ImageStack};
use crate::io::image_io::{load_frame, load_stack};
use crate::io::spectrum_io::read_names;
use crate::spectrum::{DarkSubtraction, Provenance, ReductionWarning, SkippedSource, Spectrum};
use crate::trace::{locate, TraceMethod};

use super::config::{DetectorConfig, ReductionConfig};
use super::types::{CancelToken, NoOpReporter, ProgressReporter, Reduction, ReductionStage};

/// A dark/flat corrected source image and how its dark was removed.
type Corrected = (Array2<f64>, DarkSubtraction);

enum Extracted {
    Spectrum(Spectrum),
    Skipped(SkippedSource),
}

/// File sets making up one observing night.
#[derive(Clone, Debug, Default)]
pub struct NightInputs {
    pub sources: Vec<PathBuf>,
    /// Object names, one per line. Source file stems are used when absent.
    pub names: Option<PathBuf>,
    pub bias: Vec<PathBuf>,
    pub flats: Vec<PathBuf>,
    pub darks: Vec<PathBuf>,
    /// Arc-lamp frames: none, one shared by every source, or one per source.
    pub lamps: Vec<PathBuf>,
}

/// One night's frames, already in memory.
#[derive(Clone, Debug)]
pub struct NightFrames {
    pub sources: ImageStack,
    /// One per source frame.
    pub names: Vec<String>,
    pub bias: ImageStack,
    pub flats: ImageStack,
    pub darks: Vec<Frame>,
    pub lamps: Option<ImageStack>,
}

/// Load and reduce a night with no progress reporting or cancellation.
pub fn reduce_night(inputs: &NightInputs, config: &ReductionConfig) -> Result<Reduction> {
    reduce_night_reported(inputs, config, Arc::new(NoOpReporter), &CancelToken::new())
}

/// Load every frame of a night, then reduce it.
///
/// Missing source, bias or flat files abort the run before any processing.
pub fn reduce_night_reported(
    inputs: &NightInputs,
    config: &ReductionConfig,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<Reduction> {
    config.validate()?;
    let frames = load_night(inputs, reporter.as_ref())?;
    reduce_frames(frames, config, reporter, cancel)
}

fn load_night(inputs: &NightInputs, reporter: &dyn ProgressReporter) -> Result<NightFrames> {
    let total = inputs.sources.len()
        + inputs.bias.len()
        + inputs.flats.len()
        + inputs.darks.len()
        + inputs.lamps.len();
    reporter.begin_stage(ReductionStage::Reading, Some(total));

    let sources = load_stack(&inputs.sources)?;
    reporter.advance(sources.depth());
    let bias = load_stack(&inputs.bias)?;
    let flats = load_stack(&inputs.flats)?;
    reporter.advance(sources.depth() + bias.depth() + flats.depth());

    let darks = inputs
        .darks
        .iter()
        .map(|p| load_frame(p))
        .collect::<Result<Vec<_>>>()?;
    let lamps = if inputs.lamps.is_empty() {
        None
    } else {
        Some(load_stack(&inputs.lamps)?)
    };
    reporter.advance(total);

    let names = match &inputs.names {
        Some(path) => read_names(path)?,
        None => inputs.sources.iter().map(|p| file_stem(p)).collect(),
    };
    reporter.finish_stage();

    info!(
        sources = sources.depth(),
        bias = bias.depth(),
        flats = flats.depth(),
        darks = darks.len(),
        lamps = lamps.as_ref().map_or(0, ImageStack::depth),
        "Loaded night"
    );

    Ok(NightFrames {
        sources,
        names,
        bias,
        flats,
        darks,
        lamps,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reduce in-memory frames into one spectrum per source.
///
/// Master frames and the calibration profile are built once; each source
/// frame is then corrected, traced and extracted independently on the
/// Rayon pool. Results keep the input order. A frame whose trace cannot be
/// found is reported in [`Reduction::skipped`] and the rest still reduce.
/// Cancellation is checked before each source frame.
pub fn reduce_frames(
    night: NightFrames,
    config: &ReductionConfig,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<Reduction> {
    config.validate()?;
    let NightFrames {
        sources,
        names,
        bias,
        flats,
        darks,
        lamps,
    } = night;

    let count = sources.depth();
    if names.len() != count {
        return Err(ReduxError::InvalidConfig(format!(
            "{} names for {count} source frames",
            names.len()
        )));
    }
    let fit_flags = config.trace.use_fit.flags(count)?;
    if let Some(lamps) = &lamps {
        if lamps.depth() != 1 && lamps.depth() != count {
            return Err(ReduxError::InvalidConfig(format!(
                "{} lamp frames for {count} sources; expected 1 or {count}",
                lamps.depth()
            )));
        }
    }

    let dim = sources.dim();
    check_dim(dim, bias.frames())?;
    check_dim(dim, flats.frames())?;
    check_dim(dim, &darks)?;
    if let Some(lamps) = &lamps {
        check_dim(dim, lamps.frames())?;
    }

    let exptimes = sources
        .iter()
        .map(|f| {
            f.exptime().ok_or_else(|| ReduxError::MissingHeader {
                path: f.metadata.source.clone().unwrap_or_default(),
                key: EXPTIME_KEY.to_string(),
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let CalibrationSet {
        profile,
        master_flat: flat,
        master_darks,
    } = build_calibration(&bias, &flats, darks, config, reporter.as_ref())?;
    let bias_value = profile.bias_level;

    // Dark/flat correction
    reporter.begin_stage(ReductionStage::Correcting, Some(count));
    let done = AtomicUsize::new(0);
    let correct_one = |(i, frame): (usize, &Frame)| -> Result<Corrected> {
        if cancel.is_cancelled() {
            return Err(ReduxError::Cancelled);
        }
        let exptime = exptimes[i];
        let matched = master_darks.matching(exptime, config.darks.exptime_tolerance);
        let (dark, subtraction) = match matched {
            Some(d) => (
                DarkReference::Frame(&d.frame.data),
                DarkSubtraction::MasterDark { exptime: d.exptime },
            ),
            None => (
                DarkReference::Level(bias_value),
                DarkSubtraction::BiasLevel(bias_value),
            ),
        };
        let corrected = correct_frame(&frame.data, dark, &flat.data);
        reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
        Ok((corrected, subtraction))
    };
    let corrected: Vec<Corrected> = if count >= PARALLEL_FRAME_THRESHOLD {
        sources
            .frames()
            .par_iter()
            .enumerate()
            .map(correct_one)
            .collect::<Result<_>>()?
    } else {
        sources
            .iter()
            .enumerate()
            .map(correct_one)
            .collect::<Result<_>>()?
    };
    reporter.finish_stage();

    // Trace and extraction
    reporter.begin_stage(ReductionStage::Extracting, Some(count));
    let done = AtomicUsize::new(0);
    let extract_one = |(i, (image, subtraction)): (usize, &Corrected)| -> Result<Extracted> {
        if cancel.is_cancelled() {
            return Err(ReduxError::Cancelled);
        }
        let source = &sources.frames()[i];
        let name = &names[i];
        let exptime = exptimes[i];
        let mut warnings = Vec::new();

        if let DarkSubtraction::BiasLevel(_) = subtraction {
            warn!(
                source = %name,
                exptime,
                "No master dark matches exposure time; subtracting bias level"
            );
            warnings.push(ReductionWarning::UnmatchedExposureTime { exptime });
        }

        let trace = match locate(image, fit_flags[i]) {
            Ok(trace) => trace,
            Err(err) => {
                warn!(source = %name, %err, "Trace not found; skipping source");
                warnings.push(ReductionWarning::TraceNotFound);
                reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                return Ok(Extracted::Skipped(SkippedSource {
                    name: name.clone(),
                    source: source.metadata.source.clone(),
                    warnings,
                }));
            }
        };
        if let TraceMethod::Fallback(reason) = trace.method {
            warn!(
                source = %name,
                %reason,
                peak = trace.peak,
                "Trace fit rejected; using profile maximum"
            );
            warnings.push(ReductionWarning::TraceFallback(reason));
        }

        let extraction = extract(image, &profile, &trace.location, &config.extraction, exptime)?;
        if extraction.empty_sky_columns > 0 {
            warn!(
                source = %name,
                columns = extraction.empty_sky_columns,
                "Sky windows empty; sky taken as zero"
            );
            warnings.push(ReductionWarning::EmptySkyWindows {
                columns: extraction.empty_sky_columns,
            });
        }

        let mut spectrum = Spectrum::new(name.clone(), extraction.rms.len());
        spectrum.waves = match &lamps {
            Some(lamps) => {
                let lamp = if lamps.depth() == 1 {
                    &lamps.frames()[0]
                } else {
                    &lamps.frames()[i]
                };
                extract_fixed(&lamp.data, &trace.location, config.extraction.factor)
            }
            None => extraction.rms.clone(),
        };
        spectrum.raw = extraction.raw;
        spectrum.rms = extraction.rms;
        spectrum.snr = extraction.snr;
        spectrum.provenance = Provenance {
            source: source.metadata.source.clone(),
            exptime: Some(exptime),
            trace: Some(trace),
            dark: Some(subtraction.clone()),
            warnings,
        };
        debug!(
            source = %name,
            center = trace.location.center,
            width = trace.location.width,
            mean_snr = spectrum.mean_snr(),
            "Extracted spectrum"
        );

        reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
        Ok(Extracted::Spectrum(spectrum))
    };
    let extracted: Vec<Extracted> = if count >= PARALLEL_FRAME_THRESHOLD {
        corrected.par_iter().enumerate().map(extract_one).collect::<Result<_>>()?
    } else {
        corrected.iter().enumerate().map(extract_one).collect::<Result<_>>()?
    };
    reporter.finish_stage();

    let mut spectra = Vec::with_capacity(extracted.len());
    let mut skipped = Vec::new();
    for item in extracted {
        match item {
            Extracted::Spectrum(spectrum) => spectra.push(spectrum),
            Extracted::Skipped(source) => skipped.push(source),
        }
    }

    info!(
        spectra = spectra.len(),
        skipped = skipped.len(),
        "Reduction complete"
    );
    Ok(Reduction {
        spectra,
        skipped,
        profile,
    })
}

/// Master frames and detector profile shared by every source in a run.
#[derive(Clone, Debug)]
pub struct CalibrationSet {
    pub profile: CalibrationProfile,
    /// Bias-subtracted flat normalized to its mode.
    pub master_flat: Frame,
    pub master_darks: MasterDarks,
}

/// Combine master frames and measure the detector, exporting the masters
/// when `config.masters_dir` is set.
pub fn build_calibration(
    bias: &ImageStack,
    flats: &ImageStack,
    darks: Vec<Frame>,
    config: &ReductionConfig,
    reporter: &dyn ProgressReporter,
) -> Result<CalibrationSet> {
    check_dim(bias.dim(), flats.frames())?;
    check_dim(bias.dim(), &darks)?;

    reporter.begin_stage(ReductionStage::Combining, None);
    let bias_value = bias_level(bias);
    info!(bias_level = bias_value, "Measured bias level");
    let dark_groups = group_darks(darks, &config.darks);
    let master_darks = MasterDarks::from_groups(&dark_groups)?;
    drop(dark_groups);
    let flat = master_flat(flats, bias_value)?;
    reporter.finish_stage();

    reporter.begin_stage(ReductionStage::Calibrating, None);
    let (gain, read_noise) = detector_gain(bias, flats, &config.detector)?;
    let dark_rate = mean_dark_rate(&master_darks, bias_value, gain);
    let profile = CalibrationProfile {
        bias_level: bias_value,
        read_noise,
        gain,
        dark_current_rate: dark_rate,
    };
    info!(%profile, "Calibration profile");
    if let Some(dir) = &config.masters_dir {
        let bias_master = master_bias(bias)?;
        export_masters(dir, &bias_master, &flat, &master_darks)?;
    }
    reporter.finish_stage();

    Ok(CalibrationSet {
        profile,
        master_flat: flat,
        master_darks,
    })
}

fn check_dim(expected: (usize, usize), frames: &[Frame]) -> Result<()> {
    match frames.iter().find(|f| f.dim() != expected) {
        Some(frame) => Err(ReduxError::DimensionMismatch {
            path: frame.metadata.source.clone().unwrap_or_default(),
            expected,
            found: frame.dim(),
        }),
        None => Ok(()),
    }
}

/// Gain and read noise: configured values win, then Howell's method, then
/// defaults for calibration sets too small to form pairs.
fn detector_gain(
    bias: &ImageStack,
    flats: &ImageStack,
    detector: &DetectorConfig,
) -> Result<(f64, f64)> {
    if let (Some(gain), Some(read_noise)) = (detector.gain, detector.read_noise) {
        info!(gain, read_noise, "Using configured detector gain and read noise");
        return Ok((gain, read_noise));
    }

    let measured = gain_and_read_noise(bias, flats)?;
    if measured.is_none() {
        warn!(
            gain = DEFAULT_DETECTOR_GAIN,
            read_noise = DEFAULT_DETECTOR_READ_NOISE,
            "Fewer than two bias or flat frames; assuming default detector values"
        );
    }
    let gain = detector
        .gain
        .or(measured.map(|m| m.gain))
        .unwrap_or(DEFAULT_DETECTOR_GAIN);
    let read_noise = detector
        .read_noise
        .or(measured.map(|m| m.read_noise))
        .unwrap_or(DEFAULT_DETECTOR_READ_NOISE);
    Ok((gain, read_noise))
}

/// Dark current averaged over every master dark; zero with no darks.
fn mean_dark_rate(darks: &MasterDarks, bias_level: f64, gain: f64) -> f64 {
    if darks.is_empty() {
        return 0.0;
    }
    let rates: Vec<f64> = darks
        .iter()
        .map(|d| dark_current_rate(&d.frame.data, bias_level, gain, d.exptime))
        .collect();
    let rate = rates.iter().sum::<f64>() / rates.len() as f64;
    info!(dark_current = rate, groups = rates.len(), "Measured dark current");
    rate
}
