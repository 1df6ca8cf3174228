//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - free-parameter slots and bounds (`FreeParam`, `Bounds`, `FitParameter`)
//! - typed model inputs (`ModelConditions`, `SpectralWindow`)
//! - spectral vocabulary (`Quantity`, `WaveUnit`)
//! - fit outputs (`FitResult`, `BestPoint`, `FitState`)

pub mod types;

pub use types::*;
