use approx::assert_abs_diff_eq;

use spexredux_core::error::ReduxError;
use spexredux_core::rectify::{continuum_anchors, rectify, CubicSpline};
use spexredux_core::spectrum::Spectrum;
use spexredux_core::wavecal::ReferencePoint;

/// Linear dispersion 4000 + 2 * pixel over 500 bins.
fn calibrated(name: &str, flux: impl Fn(f64) -> f64) -> Spectrum {
    let mut s = Spectrum::new(name, 500);
    s.select_reference_points(vec![
        ReferencePoint::new(0.0, 4000.0),
        ReferencePoint::new(499.0, 4998.0),
    ])
    .unwrap();
    s.solve_wavelengths().unwrap();
    s.rms = s.wv.iter().map(|&w| flux(w)).collect();
    s
}

#[test]
fn test_linear_continuum_rectifies_to_one() {
    let mut s = calibrated("star", |w| 100.0 + 0.05 * (w - 4000.0));
    let continuum = rectify(&mut s, &[4100.0, 4500.0, 4900.0], 10.0).unwrap();

    assert_eq!(continuum.len(), 500);
    // Inside the anchor range the spline reproduces a straight line.
    for (i, &w) in s.wv.iter().enumerate() {
        if (4100.0..=4900.0).contains(&w) {
            assert_abs_diff_eq!(s.rectified[i], 1.0, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_absorption_line_survives_rectification() {
    let line = |w: f64| 1.0 - 0.6 * (-(w - 4600.0).powi(2) / 50.0).exp();
    let mut s = calibrated("star", |w| 200.0 * line(w));
    rectify(&mut s, &[4200.0, 4400.0, 4800.0], 10.0).unwrap();

    let core = (0..s.len())
        .min_by(|&a, &b| (s.wv[a] - 4600.0).abs().total_cmp(&(s.wv[b] - 4600.0).abs()))
        .unwrap();
    assert_abs_diff_eq!(s.rectified[core], 0.4, epsilon = 1e-3);
}

#[test]
fn test_rectify_requires_wavelengths() {
    let mut s = Spectrum::new("raw", 100);
    s.rms = vec![1.0; 100];
    assert!(matches!(
        rectify(&mut s, &[1.0, 2.0], 1.0),
        Err(ReduxError::InvalidState(_))
    ));
}

#[test]
fn test_anchor_outside_spectrum_rejected() {
    let wv: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let flux = vec![1.0; 10];
    assert!(continuum_anchors(&wv, &flux, &[2.0, 50.0], 2.0).is_err());
}

#[test]
fn test_anchors_take_median_and_sort() {
    let wv: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let mut flux = vec![5.0; 10];
    flux[7] = 500.0; // outlier inside the second window
    let anchors = continuum_anchors(&wv, &flux, &[7.0, 2.0], 2.0).unwrap();

    assert_eq!(anchors[0].wavelength, 2.0);
    assert_eq!(anchors[1].wavelength, 7.0);
    assert_eq!(anchors[1].level, 5.0);
}

#[test]
fn test_spline_is_smooth_between_knots() {
    let spline = CubicSpline::natural(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 0.0]).unwrap();
    // Natural spline through a symmetric peak is symmetric.
    assert_abs_diff_eq!(spline.evaluate(0.5), spline.evaluate(1.5), epsilon = 1e-12);
    assert!(spline.evaluate(0.5) > 0.5);
}
