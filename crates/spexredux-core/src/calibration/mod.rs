pub mod darks;
pub mod masters;
pub mod stats;

pub use darks::{exptime_from_name, group_darks, DarkGroup};
pub use masters::{
    correct_frame, export_masters, master_bias, master_flat, DarkReference, MasterDark,
    MasterDarks,
};
pub use stats::{bias_level, dark_current_rate, gain_and_read_noise, GainEstimate};

use serde::Serialize;

/// Detector characteristics shared read-only by every extraction in a run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CalibrationProfile {
    /// ADU.
    pub bias_level: f64,
    /// Electrons.
    pub read_noise: f64,
    /// Electrons per ADU.
    pub gain: f64,
    /// Electrons per second per pixel.
    pub dark_current_rate: f64,
}

impl std::fmt::Display for CalibrationProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bias {:.2} ADU, gain {:.3} e-/ADU, read noise {:.2} e-, dark {:.4} e-/s",
            self.bias_level, self.gain, self.read_noise, self.dark_current_rate
        )
    }
}
