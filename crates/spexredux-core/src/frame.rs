use std::path::PathBuf;

use ndarray::Array2;

use crate::error::{ReduxError, Result};
use crate::io::fits::FitsHeader;

/// A single detector image.
///
/// Rows run along the cross-dispersion (spatial) axis, columns along the
/// dispersion (wavelength) axis. Pixel values are raw ADU.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (rows, columns)
    pub data: Array2<f64>,
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(data: Array2<f64>) -> Self {
        Self {
            data,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn with_exptime(data: Array2<f64>, exptime: f64) -> Self {
        let mut frame = Self::new(data);
        frame.metadata.exptime = Some(exptime);
        frame
    }

    /// Number of cross-dispersion rows.
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of dispersion columns (spectral bins).
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn exptime(&self) -> Option<f64> {
        self.metadata.exptime
    }

    /// Display name for log and error messages.
    pub fn label(&self) -> String {
        match &self.metadata.source {
            Some(path) => path.display().to_string(),
            None => "<memory>".to_string(),
        }
    }
}

/// Provenance and header values carried alongside the pixels.
#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    pub source: Option<PathBuf>,
    /// Exposure time in seconds (EXPTIME).
    pub exptime: Option<f64>,
    pub header: FitsHeader,
}

/// An ordered set of frames sharing one pixel shape.
#[derive(Clone, Debug)]
pub struct ImageStack {
    frames: Vec<Frame>,
}

impl ImageStack {
    /// Build a stack, failing fast if any frame differs in shape from the first.
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(ReduxError::EmptySequence);
        };
        let expected = first.dim();
        for frame in &frames[1..] {
            if frame.dim() != expected {
                return Err(ReduxError::DimensionMismatch {
                    path: frame.metadata.source.clone().unwrap_or_default(),
                    expected,
                    found: frame.dim(),
                });
            }
        }
        Ok(Self { frames })
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.frames[0].dim()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }
}

impl<'a> IntoIterator for &'a ImageStack {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}
