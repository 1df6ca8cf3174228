//! Formatted terminal output.
//!
//! Formatting lives in one place so the fit loop stays free of presentation
//! details and output changes stay local (and snapshot-testable).

use crate::app::pipeline::{LosRun, SweepStatus, SweepSummary};
use crate::domain::{FitParameter, FitResult, FitState};
use crate::fit::HistoryEntry;

/// `T12=517.0K,T3=2641.0K,Trot=491.0K, Residual: 0.0123`
pub fn format_progress_line(params: &[FitParameter], entry: &HistoryEntry) -> String {
    let values = entry.values.display_with(params);
    match &entry.outcome {
        Ok(res) => format!("{values}, Residual: {res:.4}"),
        Err(err) => format!("{values}, Residual: failed ({err})"),
    }
}

/// Final summary of a fit run.
pub fn format_fit_summary(params: &[FitParameter], result: &FitResult, history_len: usize) -> String {
    let mut out = String::new();

    out.push_str("\n=== sfit - multi-temperature fit ===\n");
    let state = match result.state {
        FitState::Converged => "converged",
        FitState::Failed => "failed",
        FitState::Optimizing => "optimizing",
        FitState::BoundaryProbe => "boundary probe",
        FitState::Uninitialized => "uninitialized",
    };
    out.push_str(&format!("Status: {state} ({})\n", result.message));
    out.push_str(&format!(
        "Evaluations: {} (solver {}, iterations {}, history {})\n",
        result.evaluations, result.optimizer_evaluations, result.iterations, history_len
    ));

    if let Some(point) = &result.solver_point {
        let label = if result.success { "Final" } else { "Solver ended at" };
        out.push_str(&format!("{label}: {}\n", point.display_with(params)));
    }

    match &result.best {
        Some(best) => out.push_str(&format!(
            "Best: {}, Residual: {:.4} reached at evaluation {}/{}\n",
            best.values.display_with(params),
            best.residual,
            best.history_index,
            history_len
        )),
        None => out.push_str("Best: none (no evaluation succeeded)\n"),
    }

    out
}

/// Per-item table of a batch sweep.
pub fn format_sweep_summary(summary: &SweepSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Sweep: {} written, {} skipped, {} failed\n",
        summary.written(),
        summary.skipped(),
        summary.failed()
    ));
    out.push_str(format!("{:<20} {:<8} {:>10} {:>14} {}\n", "name", "status", "time[s]", "integral", "detail").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<20} {:-<8} {:->10} {:->14} {:-<6}\n", "", "", "", "", "").trim_end());
    out.push('\n');

    for item in &summary.items {
        let line = match item {
            SweepStatus::Written(done) => format!(
                "{:<20} {:<8} {:>10.3} {:>14.6e} {}",
                truncate(&done.name, 20),
                "written",
                done.calculation_time,
                done.integral,
                done.path.display()
            ),
            SweepStatus::Skipped { name, path } => format!(
                "{:<20} {:<8} {:>10} {:>14} {} exists",
                truncate(name, 20),
                "skipped",
                "-",
                "-",
                path.display()
            ),
            SweepStatus::Failed { name, error } => format!(
                "{:<20} {:<8} {:>10} {:>14} {error}",
                truncate(name, 20),
                "failed",
                "-",
                "-"
            ),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Layers and integral of a line-of-sight computation.
pub fn format_los_summary(run: &LosRun) -> String {
    let mut out = String::new();
    out.push_str(&format!("Line of sight: {} layers (far to near)\n", run.layers.len()));
    for (name, time) in &run.layers {
        out.push_str(&format!("  {name:<20} computed in {time:.3}s\n"));
    }
    out.push_str(&format!(
        "Integral of {}: {:.6e} {}\n",
        run.quantity,
        run.integral,
        run.integral_unit()
    ));
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
