//! Data sources that are not read from user files.
//!
//! - synthetic demo references (`sample`)

pub mod sample;

pub use sample::*;
