//! Input/output helpers.
//!
//! - reference spectra and spectrum CSV (`reference`)
//! - line lists for the built-in provider (`linelist`)
//! - condition tables for sweeps and lines of sight (`layers`)
//! - fit exports (CSV/JSON) (`export`)

pub mod export;
pub mod layers;
pub mod linelist;
pub mod reference;

pub use export::*;
pub use layers::*;
pub use linelist::*;
pub use reference::*;
