//! `spectral-fit` library crate.
//!
//! The binary (`sfit`) is a thin wrapper around this library so that:
//!
//! - the fit loop is testable without spawning processes
//! - providers, solvers and reporters are reusable from other front-ends
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod plot;
pub mod provider;
pub mod report;
pub mod spectrum;
pub mod tui;
