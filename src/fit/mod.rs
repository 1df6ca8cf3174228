//! Spectral fitting.
//!
//! Responsibilities:
//!
//! - run the boundary probes and the solver (`driver`)
//! - record every evaluation and pick the best one (`history`)
//! - bounded derivative-free minimizers (`solver`)

pub mod driver;
pub mod history;
pub mod solver;

pub use driver::*;
pub use history::*;
pub use solver::{Objective, Solver, SolverOptions, SolverResult};
