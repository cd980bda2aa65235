use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReduxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error(
        "Frame {} is {}x{}, expected {}x{}",
        path.display(),
        found.0,
        found.1,
        expected.0,
        expected.1
    )]
    DimensionMismatch {
        path: PathBuf,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Missing header keyword {key} in {}", path.display())]
    MissingHeader { path: PathBuf, key: String },

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("All {pairs} bias/flat pairs are degenerate; gain cannot be measured")]
    DegenerateGain { pairs: usize },

    #[error("Calibration error: {0}")]
    InvalidCalibration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Need at least {required} reference points, got {found}")]
    TooFewReferencePoints { required: usize, found: usize },

    #[error("Least-squares system is singular")]
    SingularFit,

    #[error("Invalid calibration state: {0}")]
    InvalidState(String),

    #[error("Reduction cancelled")]
    Cancelled,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ReduxError>;
