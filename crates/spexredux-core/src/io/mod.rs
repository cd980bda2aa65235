pub mod fits;
pub mod image_io;
pub mod spectrum_io;
