use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;
use tracing::debug;

use crate::consts::EXPTIME_KEY;
use crate::error::{ReduxError, Result};
use crate::frame::{Frame, FrameMetadata, ImageStack};
use crate::io::fits::{read_fits, write_fits, FitsHeader, FitsValue};

/// Load a single FITS frame, picking up EXPTIME from its header.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let (data, header) = read_fits(path)?;
    let exptime = header.get_f64(EXPTIME_KEY);
    Ok(Frame {
        data,
        metadata: FrameMetadata {
            source: Some(path.to_path_buf()),
            exptime,
            header,
        },
    })
}

/// Load every file in `paths`, in order, into one stack.
///
/// Fails on the first missing file, and if any frame differs in shape
/// from the first.
pub fn load_stack<P: AsRef<Path>>(paths: &[P]) -> Result<ImageStack> {
    if paths.is_empty() {
        return Err(ReduxError::EmptySequence);
    }
    // Check existence up front so a missing file aborts before any decoding.
    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReduxError::MissingFile {
                path: path.to_path_buf(),
            });
        }
    }
    let frames = paths
        .iter()
        .map(|p| load_frame(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    debug!(frames = frames.len(), "Loaded image stack");
    ImageStack::new(frames)
}

/// Load `names` relative to `dir`.
pub fn load_stack_in(dir: &Path, names: &[&str]) -> Result<ImageStack> {
    let paths: Vec<PathBuf> = names.iter().map(|n| dir.join(n)).collect();
    load_stack(&paths)
}

/// Save a frame as a FITS image, keeping its header and exposure time.
pub fn save_fits(frame: &Frame, path: &Path) -> Result<()> {
    let mut header = frame.metadata.header.clone();
    if let Some(exptime) = frame.metadata.exptime {
        header.set(EXPTIME_KEY, FitsValue::Float(exptime));
    }
    write_fits(path, &frame.data, &header)
}

/// Save a min/max stretched 16-bit grayscale TIFF preview.
pub fn save_tiff(data: &Array2<f64>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let (lo, hi) = finite_range(data);

    let mut pixels: Vec<u16> = Vec::with_capacity(h * w);
    for &v in data.iter() {
        pixels.push((stretch(v, lo, hi) * 65535.0) as u16);
    }

    let img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| ReduxError::InvalidConfig("image buffer size mismatch".into()))?;
    img.save(path)?;
    Ok(())
}

/// Save a min/max stretched 8-bit grayscale PNG preview.
pub fn save_png(data: &Array2<f64>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let (lo, hi) = finite_range(data);

    let mut img = GrayImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let val = (stretch(data[[row, col]], lo, hi) * 255.0) as u8;
            img.put_pixel(col as u32, row as u32, Luma([val]));
        }
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a frame, choosing format from file extension. FITS is the default.
pub fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tiff" | "tif") => save_tiff(&frame.data, path),
        Some("png") => save_png(&frame.data, path),
        _ => save_fits(frame, path),
    }
}

/// Wrap a bare array as a frame with an optional exposure time.
pub fn frame_from_array(data: Array2<f64>, exptime: Option<f64>) -> Frame {
    let mut frame = Frame::new(data);
    frame.metadata.exptime = exptime;
    frame.metadata.header = FitsHeader::new();
    frame
}

fn finite_range(data: &Array2<f64>) -> (f64, f64) {
    data.iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

fn stretch(v: f64, lo: f64, hi: f64) -> f64 {
    if !v.is_finite() || !(hi > lo) {
        return 0.0;
    }
    ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
}
