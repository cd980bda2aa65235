pub mod calibration;
pub mod consts;
pub mod error;
pub mod extract;
pub mod filters;
pub mod fit;
pub mod frame;
pub mod io;
pub mod pipeline;
pub mod rectify;
pub mod spectrum;
pub mod stack;
pub mod stats;
pub mod trace;
pub mod wavecal;
