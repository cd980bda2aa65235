#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::Array2;
use spexredux_core::frame::Frame;
use spexredux_core::io::image_io::{frame_from_array, save_fits};

/// Gaussian profile value at `row`.
pub fn gaussian(row: f64, center: f64, sigma: f64) -> f64 {
    let d = row - center;
    (-d * d / (2.0 * sigma * sigma)).exp()
}

/// `background + amplitude * g(row)` in every column.
pub fn trace_image(
    rows: usize,
    cols: usize,
    center: f64,
    sigma: f64,
    amplitude: f64,
    background: f64,
) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, _)| {
        background + amplitude * gaussian(r as f64, center, sigma)
    })
}

pub fn constant(rows: usize, cols: usize, value: f64) -> Array2<f64> {
    Array2::from_elem((rows, cols), value)
}

/// Deterministic xorshift generator with Box-Muller normals.
pub struct Noise {
    state: u64,
}

impl Noise {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn uniform(&mut self) -> f64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        // (0, 1]
        ((self.state >> 11) as f64 + 1.0) / (1u64 << 53) as f64
    }

    pub fn normal(&mut self) -> f64 {
        let u1 = self.uniform();
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// `level` plus Gaussian noise of standard deviation `sigma` per pixel.
    pub fn frame(&mut self, rows: usize, cols: usize, level: f64, sigma: f64) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |_| level + sigma * self.normal())
    }
}

/// Write `data` as a FITS file in `dir`, with EXPTIME when given.
pub fn write_frame(dir: &Path, name: &str, data: Array2<f64>, exptime: Option<f64>) -> PathBuf {
    let path = dir.join(name);
    save_fits(&frame_from_array(data, exptime), &path).expect("write FITS frame");
    path
}

pub fn frame(data: Array2<f64>, exptime: f64) -> Frame {
    Frame::with_exptime(data, exptime)
}
