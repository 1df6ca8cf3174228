//! Plot state for a running fit: residual and parameter values per iteration.

use crate::fit::{FitHistory, HistoryEntry};

#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    residuals: Vec<(f64, f64)>,
    values: Vec<Vec<(f64, f64)>>,
    last: Option<(usize, f64)>,
    failures: usize,
}

impl Trajectory {
    pub fn new(n_params: usize) -> Self {
        Self {
            values: vec![Vec::new(); n_params],
            ..Self::default()
        }
    }

    /// Replay a finished fit; entry `i` is iteration `i + 1`.
    pub fn from_history(n_params: usize, history: &FitHistory) -> Self {
        let mut out = Self::new(n_params);
        for entry in history.entries() {
            out.push(entry.index + 1, entry);
        }
        out
    }

    /// Seed with the boundary probes (iterations 1 and 2).
    pub fn seed(&mut self, probes: &[HistoryEntry]) {
        for (i, entry) in probes.iter().enumerate() {
            self.push(i + 1, entry);
        }
    }

    pub fn push(&mut self, iteration: usize, entry: &HistoryEntry) {
        let x = iteration as f64;
        if self.values.len() < entry.values.len() {
            self.values.resize(entry.values.len(), Vec::new());
        }
        for (series, &v) in self.values.iter_mut().zip(entry.values.as_slice()) {
            series.push((x, v));
        }
        match entry.residual() {
            Some(r) => {
                self.residuals.push((x, r));
                self.last = Some((iteration, r));
            }
            None => self.failures += 1,
        }
    }

    /// `(iteration, residual)` of successful evaluations.
    pub fn residuals(&self) -> &[(f64, f64)] {
        &self.residuals
    }

    pub fn parameter(&self, index: usize) -> &[(f64, f64)] {
        self.values.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn n_params(&self) -> usize {
        self.values.len()
    }

    /// Last successful evaluation.
    pub fn last(&self) -> Option<(usize, f64)> {
        self.last
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Iteration span `[0, max(last, min_span)]`.
    pub fn x_range(&self, min_span: f64) -> (f64, f64) {
        let last = self
            .values
            .iter()
            .filter_map(|s| s.last())
            .map(|(x, _)| *x)
            .fold(0.0, f64::max);
        (0.0, last.max(min_span))
    }

    /// Residual axis `[0, 1.05 * max]`.
    pub fn residual_range(&self) -> (f64, f64) {
        let max = self.residuals.iter().map(|(_, r)| *r).fold(0.0, f64::max);
        (0.0, if max > 0.0 { max * 1.05 } else { 1.0 })
    }

    /// Joint range of all parameter series.
    pub fn parameter_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .values
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
        if lo.is_finite() && hi > lo { (lo, hi) } else { (0.0, 1.0) }
    }
}
