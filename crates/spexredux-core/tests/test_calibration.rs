mod common;

use approx::assert_relative_eq;
use ndarray::Array2;

use common::Noise;
use spexredux_core::calibration::{
    bias_level, dark_current_rate, gain_and_read_noise, group_darks, master_flat, MasterDarks,
};
use spexredux_core::error::ReduxError;
use spexredux_core::frame::{Frame, ImageStack};
use spexredux_core::pipeline::config::{DarkConfig, DarkGrouping};

const ROWS: usize = 120;
const COLS: usize = 120;

fn stack(frames: Vec<Array2<f64>>) -> ImageStack {
    ImageStack::new(frames.into_iter().map(Frame::new).collect()).unwrap()
}

/// Bias and flat stacks for a detector with the given gain (e-/ADU) and
/// read noise (ADU); flats carry `signal` ADU above the bias with shot noise.
fn detector_frames(gain: f64, read_noise_adu: f64, signal: f64) -> (ImageStack, ImageStack) {
    let mut noise = Noise::new(42);
    let bias_level = 100.0;
    let flat_sigma = (read_noise_adu * read_noise_adu + signal / gain).sqrt();
    let bias = (0..4)
        .map(|_| noise.frame(ROWS, COLS, bias_level, read_noise_adu))
        .collect();
    let flats = (0..4)
        .map(|_| noise.frame(ROWS, COLS, bias_level + signal, flat_sigma))
        .collect();
    (stack(bias), stack(flats))
}

#[test]
fn test_howell_recovers_known_gain() {
    let gain = 2.0;
    let read_noise_adu = 5.0;
    let (bias, flats) = detector_frames(gain, read_noise_adu, 10_000.0);

    let estimate = gain_and_read_noise(&bias, &flats).unwrap().unwrap();
    assert_eq!(estimate.pairs, 9);
    assert_eq!(estimate.degenerate, 0);
    assert_relative_eq!(estimate.gain, gain, max_relative = 0.05);
    // Read noise in electrons.
    assert_relative_eq!(estimate.read_noise, gain * read_noise_adu, max_relative = 0.05);
}

#[test]
fn test_single_frames_cannot_form_pairs() {
    let bias = stack(vec![common::constant(4, 4, 5.0)]);
    let flats = stack(vec![
        common::constant(4, 4, 1000.0),
        common::constant(4, 4, 1001.0),
    ]);
    assert!(gain_and_read_noise(&bias, &flats).unwrap().is_none());
}

#[test]
fn test_noiseless_frames_are_degenerate() {
    // Identical frames: every variance difference is zero.
    let bias = stack(vec![common::constant(4, 4, 5.0); 3]);
    let flats = stack(vec![common::constant(4, 4, 1000.0); 2]);

    match gain_and_read_noise(&bias, &flats) {
        Err(ReduxError::DegenerateGain { pairs }) => assert_eq!(pairs, 2),
        other => panic!("expected DegenerateGain, got {other:?}"),
    }
}

#[test]
fn test_gain_rejects_shape_mismatch() {
    let bias = stack(vec![common::constant(4, 4, 5.0); 2]);
    let flats = stack(vec![common::constant(4, 5, 1000.0); 2]);
    assert!(matches!(
        gain_and_read_noise(&bias, &flats),
        Err(ReduxError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_bias_level_is_global_median() {
    let bias = stack(vec![
        common::constant(3, 3, 4.0),
        common::constant(3, 3, 5.0),
        common::constant(3, 3, 9.0),
    ]);
    assert_eq!(bias_level(&bias), 5.0);
}

#[test]
fn test_bias_level_ignores_nan() {
    let mut data = common::constant(2, 2, 7.0);
    data[[0, 0]] = f64::NAN;
    assert_eq!(bias_level(&stack(vec![data])), 7.0);
}

#[test]
fn test_master_flat_normalized_to_mode() {
    // Mostly 1005 with a brighter patch; after bias 5 the mode is 1000.
    let mut data = common::constant(10, 10, 1005.0);
    for c in 0..3 {
        data[[0, c]] = 1505.0;
    }
    let flats = stack(vec![data.clone(), data.clone(), data]);

    let flat = master_flat(&flats, 5.0).unwrap();
    assert_relative_eq!(flat.data[[5, 5]], 1.0);
    assert_relative_eq!(flat.data[[0, 0]], 1.5);
}

#[test]
fn test_master_flat_zero_level_rejected() {
    let flats = stack(vec![common::constant(4, 4, 5.0)]);
    assert!(matches!(
        master_flat(&flats, 5.0),
        Err(ReduxError::InvalidCalibration(_))
    ));
}

#[test]
fn test_dark_current_rate() {
    // 60 ADU above bias over 30 s at 2 e-/ADU.
    let dark = common::constant(4, 4, 65.0);
    assert_relative_eq!(dark_current_rate(&dark, 5.0, 2.0, 30.0), 4.0);
    assert_eq!(dark_current_rate(&dark, 5.0, 2.0, 0.0), 0.0);
}

#[test]
fn test_darks_grouped_by_file_name() {
    let named = |name: &str, value: f64| {
        let mut frame = Frame::new(common::constant(2, 2, value));
        frame.metadata.source = Some(format!("/night/{name}").into());
        frame
    };
    let frames = vec![
        named("dark-001-120s.fit", 12.0),
        named("dark-002-60s.fit", 6.0),
        named("dark-003-120s.fit", 14.0),
        named("bias-001.fit", 0.0),
    ];

    let groups = group_darks(frames, &DarkConfig::default());
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].exptime, 60.0);
    assert_eq!(groups[0].frames.len(), 1);
    assert_eq!(groups[1].exptime, 120.0);
    assert_eq!(groups[1].frames.len(), 2);

    let masters = MasterDarks::from_groups(&groups).unwrap();
    assert_eq!(masters.exptimes(), vec![60.0, 120.0]);
    assert_eq!(masters.matching(120.0, 0.0).unwrap().frame.data[[0, 0]], 13.0);
}

#[test]
fn test_darks_grouped_by_header() {
    let config = DarkConfig {
        grouping: DarkGrouping::Header,
        ..DarkConfig::default()
    };
    let frames = vec![
        common::frame(common::constant(2, 2, 1.0), 30.0),
        Frame::new(common::constant(2, 2, 1.0)),
        common::frame(common::constant(2, 2, 3.0), 30.0),
    ];

    let groups = group_darks(frames, &config);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].exptime, 30.0);
    assert_eq!(groups[0].frames.len(), 2);
}
