mod common;

use approx::assert_relative_eq;

use spexredux_core::calibration::CalibrationProfile;
use spexredux_core::consts::DIGITIZATION_NOISE;
use spexredux_core::extract::{extract, extract_fixed, Aperture};
use spexredux_core::pipeline::config::ExtractionConfig;
use spexredux_core::trace::TraceLocation;

fn profile(gain: f64, read_noise: f64, dark_rate: f64) -> CalibrationProfile {
    CalibrationProfile {
        bias_level: 0.0,
        read_noise,
        gain,
        dark_current_rate: dark_rate,
    }
}

#[test]
fn test_flat_image_has_zero_flux() {
    let image = common::constant(100, 40, 50.0);
    let trace = TraceLocation {
        center: 50.0,
        width: 3.0,
    };
    let ex = extract(
        &image,
        &profile(1.5, 4.0, 0.1),
        &trace,
        &ExtractionConfig::default(),
        30.0,
    )
    .unwrap();

    assert_eq!(ex.rms.len(), 40);
    for i in 0..40 {
        assert!(ex.rms[i].abs() < 1e-9);
        assert!(ex.snr[i].is_finite());
        assert!(ex.snr[i].abs() < 1e-9);
        assert_relative_eq!(ex.raw[i], 50.0 * 12.0 * 1.5, max_relative = 1e-12);
    }
    assert_eq!(ex.empty_sky_columns, 0);
}

#[test]
fn test_ccd_equation() {
    let gain = 2.0;
    let read_noise = 3.0;
    let dark_rate = 0.5;
    let exptime = 10.0;
    let sky = 20.0;
    let image = common::trace_image(120, 8, 60.0, 2.0, 400.0, sky);
    let trace = TraceLocation {
        center: 60.0,
        width: 2.0,
    };
    let config = ExtractionConfig::default();
    let ex = extract(
        &image,
        &profile(gain, read_noise, dark_rate),
        &trace,
        &config,
        exptime,
    )
    .unwrap();

    assert_eq!(ex.aperture.object, 56..64);
    let n = 8.0;
    let signal: f64 = (56..64)
        .map(|r| 400.0 * common::gaussian(r as f64, 60.0, 2.0))
        .sum();
    let rms = signal * gain;
    let err = (rms
        + n * (1.0 + n / (2.0 * config.sky_window as f64))
            * (sky * gain
                + dark_rate * exptime
                + read_noise * read_noise
                + gain * gain * DIGITIZATION_NOISE * DIGITIZATION_NOISE))
        .sqrt();

    for col in 0..8 {
        assert_relative_eq!(ex.rms[col], rms, max_relative = 1e-6);
        assert_relative_eq!(ex.snr[col], rms / err, max_relative = 1e-6);
    }
}

#[test]
fn test_aperture_windows() {
    let trace = TraceLocation {
        center: 25.7,
        width: 2.1,
    };
    let aperture = Aperture::around(&trace, 2.0, 50, 10, 100);
    assert_eq!(aperture.object, 21..29);
    assert_eq!(aperture.width(), 8);
    assert_eq!(aperture.sky_below, 0..11);
    assert_eq!(aperture.sky_above, 39..89);
}

#[test]
fn test_sky_from_one_side_near_edge() {
    // Trace hugging row 0: no sky below, sky above still measured.
    let image = common::trace_image(80, 5, 2.0, 1.0, 300.0, 7.0);
    let trace = TraceLocation {
        center: 2.0,
        width: 1.0,
    };
    let ex = extract(
        &image,
        &profile(1.0, 0.0, 0.0),
        &trace,
        &ExtractionConfig::default(),
        1.0,
    )
    .unwrap();

    assert!(ex.aperture.sky_below.is_empty());
    assert!(!ex.aperture.sky_above.is_empty());
    assert_eq!(ex.empty_sky_columns, 0);
    assert!(ex.snr.iter().all(|v| v.is_finite() && *v > 0.0));
}

#[test]
fn test_missing_sky_is_flagged() {
    // Image too short for either sky window.
    let image = common::constant(10, 3, 5.0);
    let trace = TraceLocation {
        center: 5.0,
        width: 1.0,
    };
    let ex = extract(
        &image,
        &profile(1.0, 0.0, 0.0),
        &trace,
        &ExtractionConfig::default(),
        1.0,
    )
    .unwrap();

    assert_eq!(ex.empty_sky_columns, 3);
    assert_relative_eq!(ex.rms[0], 5.0 * ex.aperture.width() as f64);
}

#[test]
fn test_fixed_extraction_sums_aperture() {
    let image = common::constant(40, 6, 3.0);
    let trace = TraceLocation {
        center: 20.0,
        width: 1.5,
    };
    let sums = extract_fixed(&image, &trace, 2.0);
    assert_eq!(sums.len(), 6);
    // half = trunc(3.0) = 3 rows each side, rows 17..23.
    assert!(sums.iter().all(|&v| (v - 18.0).abs() < 1e-12));
}

#[test]
fn test_invalid_factor_rejected() {
    let image = common::constant(40, 6, 3.0);
    let trace = TraceLocation {
        center: 20.0,
        width: 1.5,
    };
    let config = ExtractionConfig {
        factor: 0.0,
        ..ExtractionConfig::default()
    };
    assert!(extract(&image, &profile(1.0, 0.0, 0.0), &trace, &config, 1.0).is_err());
}
