pub mod config;
mod reducer;
mod types;

pub use reducer::{
    build_calibration, reduce_frames, reduce_night, reduce_night_reported, CalibrationSet,
    NightFrames, NightInputs,
};
pub use types::{CancelToken, NoOpReporter, ProgressReporter, Reduction, ReductionStage};
