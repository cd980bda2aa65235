pub mod linear_solver;
pub mod lm;
pub mod polynomial;

pub use lm::{optimize, LmConfig, LmModel, LmResult};
pub use polynomial::{fit_polynomial, Polynomial};
