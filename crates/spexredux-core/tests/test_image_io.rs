mod common;

use std::path::PathBuf;

use ndarray::Array2;

use spexredux_core::error::ReduxError;
use spexredux_core::io::fits::{read_fits, write_fits, FitsHeader, FitsValue};
use spexredux_core::io::image_io::{load_frame, load_stack, load_stack_in, save_png, save_tiff};

#[test]
fn test_fits_roundtrip_keeps_values_and_exptime() {
    let dir = tempfile::tempdir().unwrap();
    let data = Array2::from_shape_fn((6, 4), |(r, c)| r as f64 * 10.0 + c as f64 - 3.5);
    let path = common::write_frame(dir.path(), "src.fits", data.clone(), Some(60.0));

    let frame = load_frame(&path).unwrap();
    assert_eq!(frame.dim(), (6, 4));
    assert_eq!(frame.exptime(), Some(60.0));
    assert_eq!(frame.metadata.source.as_deref(), Some(path.as_path()));
    for (a, b) in frame.data.iter().zip(data.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_fits_header_cards_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hdr.fits");
    let mut header = FitsHeader::new();
    header.set("OBJECT", FitsValue::Text("HD 12345".into()));
    header.set("EXPTIME", FitsValue::Float(30.0));
    header.set("GAIN", FitsValue::Integer(2));

    write_fits(&path, &Array2::zeros((3, 3)), &header).unwrap();
    let (data, read) = read_fits(&path).unwrap();

    assert_eq!(data.dim(), (3, 3));
    assert_eq!(read.get_str("OBJECT"), Some("HD 12345"));
    assert_eq!(read.get_f64("EXPTIME"), Some(30.0));
    assert_eq!(read.get_i64("GAIN"), Some(2));
}

#[test]
fn test_frame_without_exptime() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_frame(dir.path(), "bias.fits", common::constant(4, 4, 5.0), None);
    let frame = load_frame(&path).unwrap();
    assert_eq!(frame.exptime(), None);
}

#[test]
fn test_load_stack_depth_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..3)
        .map(|i| {
            common::write_frame(
                dir.path(),
                &format!("flat{i}.fits"),
                common::constant(5, 7, i as f64),
                None,
            )
        })
        .collect();

    let stack = load_stack(&paths).unwrap();
    assert_eq!(stack.depth(), 3);
    assert_eq!(stack.dim(), (5, 7));
    for (i, frame) in stack.iter().enumerate() {
        assert_eq!(frame.data[[0, 0]], i as f64);
    }
}

#[test]
fn test_load_stack_in_directory() {
    let dir = tempfile::tempdir().unwrap();
    common::write_frame(dir.path(), "a.fits", common::constant(2, 2, 1.0), None);
    common::write_frame(dir.path(), "b.fits", common::constant(2, 2, 2.0), None);

    let stack = load_stack_in(dir.path(), &["b.fits", "a.fits"]).unwrap();
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.frames()[0].data[[0, 0]], 2.0);
}

#[test]
fn test_load_stack_dimension_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let a = common::write_frame(dir.path(), "a.fits", common::constant(4, 4, 0.0), None);
    let b = common::write_frame(dir.path(), "b.fits", common::constant(4, 5, 0.0), None);

    match load_stack(&[a, b.clone()]) {
        Err(ReduxError::DimensionMismatch {
            path,
            expected,
            found,
        }) => {
            assert_eq!(path, b);
            assert_eq!(expected, (4, 4));
            assert_eq!(found, (4, 5));
        }
        other => panic!("expected DimensionMismatch, got {other:?}"),
    }
}

#[test]
fn test_load_stack_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = common::write_frame(dir.path(), "a.fits", common::constant(2, 2, 0.0), None);
    let missing = dir.path().join("nope.fits");

    let err = load_stack(&[a, missing.clone()]).unwrap_err();
    assert!(matches!(err, ReduxError::MissingFile { path } if path == missing));
}

#[test]
fn test_load_stack_empty() {
    let paths: Vec<PathBuf> = Vec::new();
    assert!(matches!(load_stack(&paths), Err(ReduxError::EmptySequence)));
}

#[test]
fn test_not_a_fits_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.fits");
    std::fs::write(&path, b"this is not a FITS file").unwrap();
    assert!(load_frame(&path).is_err());
}

#[test]
fn test_preview_exports() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::trace_image(20, 30, 10.0, 2.0, 100.0, 5.0);

    let png = dir.path().join("preview.png");
    let tiff = dir.path().join("preview.tiff");
    save_png(&data, &png).unwrap();
    save_tiff(&data, &tiff).unwrap();
    assert!(png.exists());
    assert!(tiff.exists());
}
