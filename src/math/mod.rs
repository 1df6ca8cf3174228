//! Mathematical utilities: interpolation, integration and physical constants.

pub mod constants;
pub mod interp;

pub use constants::*;
pub use interp::*;
