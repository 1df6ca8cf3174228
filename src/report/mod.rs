//! Progress reporting and formatted output.
//!
//! The fit driver talks to a [`ProgressReporter`]; nothing it does can fail from
//! the driver's point of view. Output problems are logged and swallowed.

use std::io::{self, Stdout, Write};

use log::warn;

use crate::domain::{FitParameter, FitResult, Quantity};
use crate::fit::{FitHistory, HistoryEntry};
use crate::spectrum::Spectrum;

pub mod format;
pub mod trajectory;

pub use format::*;
pub use trajectory::Trajectory;

/// Side channel of a fit run. All methods default to doing nothing.
pub trait ProgressReporter {
    fn on_start(&mut self, _params: &[FitParameter], _reference: &Spectrum) {}

    /// Both boundary probes have been evaluated (iterations 1 and 2).
    fn on_probes(&mut self, _params: &[FitParameter], _probes: &[HistoryEntry]) {}

    /// A solver evaluation finished; `iteration` starts at 3.
    fn on_evaluation(&mut self, _iteration: usize, _params: &[FitParameter], _entry: &HistoryEntry) {}

    /// Computed spectrum (before resampling) next to the reference.
    fn on_spectrum(&mut self, _computed: &Spectrum, _reference: &Spectrum, _quantity: Quantity, _title: &str) {}

    fn on_finish(&mut self, _params: &[FitParameter], _result: &FitResult, _history: &FitHistory) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {}

/// ASCII plot size in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotSize {
    pub width: usize,
    pub height: usize,
}

/// Progress lines on a writer, with optional ASCII plots.
pub struct ConsoleReporter<W: Write> {
    out: W,
    plot: Option<PlotSize>,
    trajectory: Trajectory,
}

impl ConsoleReporter<Stdout> {
    pub fn stdout(plot: Option<PlotSize>) -> Self {
        Self::new(io::stdout(), plot)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, plot: Option<PlotSize>) -> Self {
        Self {
            out,
            plot,
            trajectory: Trajectory::default(),
        }
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        let written = writeln!(self.out, "{text}").and_then(|_| self.out.flush());
        if let Err(e) = written {
            warn!("progress output failed: {e}");
        }
    }
}

impl<W: Write> ProgressReporter for ConsoleReporter<W> {
    fn on_start(&mut self, params: &[FitParameter], reference: &Spectrum) {
        self.trajectory = Trajectory::new(params.len());
        let names: Vec<&str> = params.iter().map(|p| p.param.name()).collect();
        self.emit(&format!(
            "Fitting {} against '{}' ({} points)",
            names.join(", "),
            reference.name().unwrap_or("reference"),
            reference.len()
        ));
    }

    fn on_probes(&mut self, params: &[FitParameter], probes: &[HistoryEntry]) {
        self.trajectory.seed(probes);
        for entry in probes {
            self.emit(&format!("probe {}", format_progress_line(params, entry)));
        }
        self.emit("\nNow starting the fitting process:\n---------------------------------\n");
    }

    fn on_evaluation(&mut self, iteration: usize, params: &[FitParameter], entry: &HistoryEntry) {
        self.trajectory.push(iteration, entry);
        let line = format_progress_line(params, entry);
        self.emit(&line);
    }

    fn on_spectrum(&mut self, computed: &Spectrum, reference: &Spectrum, quantity: Quantity, title: &str) {
        if let Some(size) = self.plot {
            let plot =
                crate::plot::render_spectrum_comparison(reference, computed, quantity, title, size.width, size.height);
            self.emit(&plot);
        }
    }

    fn on_finish(&mut self, _params: &[FitParameter], _result: &FitResult, _history: &FitHistory) {
        if let Some(size) = self.plot {
            let plot = crate::plot::render_trajectory(&self.trajectory, size.width, size.height);
            self.emit(&plot);
        }
    }
}
