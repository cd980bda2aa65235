use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::calibration::CalibrationProfile;
use crate::spectrum::{SkippedSource, Spectrum};

/// Reduction stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReductionStage {
    Reading,
    Combining,
    Calibrating,
    Correcting,
    Extracting,
    Writing,
}

impl std::fmt::Display for ReductionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading frames"),
            Self::Combining => write!(f, "Combining master frames"),
            Self::Calibrating => write!(f, "Measuring detector"),
            Self::Correcting => write!(f, "Correcting source frames"),
            Self::Extracting => write!(f, "Extracting spectra"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting for a reduction run.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: ReductionStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    /// Called from worker threads; counts only increase.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Cooperative cancellation flag shared between a caller and a running reduction.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Output of a night's reduction.
#[derive(Clone, Debug)]
pub struct Reduction {
    /// One spectrum per extracted source frame, in input order.
    pub spectra: Vec<Spectrum>,
    /// Source frames that could not be traced, in input order.
    pub skipped: Vec<SkippedSource>,
    pub profile: CalibrationProfile,
}
