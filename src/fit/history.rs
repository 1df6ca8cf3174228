//! Append-only record of every cost evaluation.

use crate::domain::{BestPoint, ParameterVector};
use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub index: usize,
    pub values: ParameterVector,
    pub outcome: Result<f64, EvalError>,
}

impl HistoryEntry {
    pub fn residual(&self) -> Option<f64> {
        self.outcome.as_ref().ok().copied()
    }
}

/// One entry per evaluation, boundary probes included. Entries are never rewritten.
#[derive(Debug, Clone, Default)]
pub struct FitHistory {
    entries: Vec<HistoryEntry>,
}

impl FitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome and return the stored entry.
    pub fn record(&mut self, values: ParameterVector, outcome: Result<f64, EvalError>) -> &HistoryEntry {
        let index = self.entries.len();
        self.entries.push(HistoryEntry { index, values, outcome });
        &self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    /// Lowest residual among successful entries; ties go to the earliest entry.
    pub fn best(&self) -> Option<BestPoint> {
        let mut best: Option<&HistoryEntry> = None;
        for entry in &self.entries {
            let Some(r) = entry.residual() else { continue };
            match best.and_then(HistoryEntry::residual) {
                Some(b) if r >= b => {}
                _ => best = Some(entry),
            }
        }
        best.and_then(|e| {
            Some(BestPoint {
                values: e.values.clone(),
                residual: e.residual()?,
                history_index: e.index,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pv(v: f64) -> ParameterVector {
        ParameterVector::new(vec![v])
    }

    #[test]
    fn best_skips_failures_and_prefers_earliest_tie() {
        let mut h = FitHistory::new();
        h.record(pv(0.0), Err(EvalError::Residual("x".into())));
        h.record(pv(1.0), Ok(0.5));
        h.record(pv(2.0), Ok(0.2));
        h.record(pv(3.0), Ok(0.2));
        h.record(pv(4.0), Ok(0.9));

        let best = h.best().unwrap();
        assert_eq!(best.history_index, 2);
        assert_eq!(best.values, pv(2.0));
        assert_eq!(best.residual, 0.2);
        assert_eq!(h.successes(), 4);
    }

    #[test]
    fn all_failures_have_no_best() {
        let mut h = FitHistory::new();
        h.record(pv(0.0), Err(EvalError::ProviderComputation("boom".into())));
        h.record(pv(1.0), Err(EvalError::ProviderComputation("boom".into())));
        assert!(h.best().is_none());
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn indices_follow_insertion_order() {
        let mut h = FitHistory::new();
        for i in 0..5 {
            assert_eq!(h.record(pv(i as f64), Ok(1.0)).index, i);
        }
        assert_eq!(h.last().unwrap().index, 4);
    }
}
