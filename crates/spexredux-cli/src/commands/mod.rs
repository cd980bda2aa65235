pub mod calibrate;
pub mod config;
pub mod info;
pub mod night;
pub mod rectify;
pub mod reduce;
pub mod wavecal;
