//! Export fit history (CSV) and the fit report (JSON).
//!
//! Both files are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BestPoint, FitParameter, FitResult, FitState, Method, Quantity};
use crate::error::AppError;
use crate::fit::FitHistory;

/// Portable summary of a fit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub tool: String,
    pub generated: DateTime<Utc>,
    pub reference: String,
    pub quantity: Quantity,
    pub method: Method,
    pub parameters: Vec<FitParameter>,
    pub success: bool,
    pub state: FitState,
    pub message: String,
    pub best: Option<BestPoint>,
    pub evaluations: usize,
    pub optimizer_evaluations: usize,
    pub iterations: usize,
    pub history_len: usize,
}

impl FitReport {
    pub fn new(
        reference: &str,
        quantity: Quantity,
        method: Method,
        parameters: &[FitParameter],
        result: &FitResult,
        history_len: usize,
    ) -> Self {
        Self {
            tool: "sfit".to_string(),
            generated: Utc::now(),
            reference: reference.to_string(),
            quantity,
            method,
            parameters: parameters.to_vec(),
            success: result.success,
            state: result.state,
            message: result.message.clone(),
            best: result.best.clone(),
            evaluations: result.evaluations,
            optimizer_evaluations: result.optimizer_evaluations,
            iterations: result.iterations,
            history_len,
        }
    }
}

/// Write every evaluation as `index,<param...>,residual,error`.
pub fn write_history_csv(path: &Path, params: &[FitParameter], history: &FitHistory) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(4, format!("Failed to create history CSV '{}': {e}", path.display()))
    })?;

    let mut header = vec!["index".to_string()];
    header.extend(params.iter().map(|p| p.param.name().to_string()));
    header.push("residual".to_string());
    header.push("error".to_string());
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(4, format!("Failed to write history CSV header: {e}")))?;

    for entry in history.entries() {
        let mut row = vec![entry.index.to_string()];
        row.extend(entry.values.as_slice().iter().map(|v| format!("{v:.6}")));
        match &entry.outcome {
            Ok(r) => {
                row.push(format!("{r:.10e}"));
                row.push(String::new());
            }
            Err(e) => {
                row.push(String::new());
                row.push(e.to_string());
            }
        }
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(4, format!("Failed to write history CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush history CSV: {e}")))?;
    Ok(())
}

/// Write the fit report as pretty JSON.
pub fn write_result_json(path: &Path, report: &FitReport) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create result JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| AppError::new(4, format!("Failed to write result JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bounds, FreeParam, ParameterVector};
    use crate::error::EvalError;

    fn params() -> Vec<FitParameter> {
        vec![
            FitParameter { param: FreeParam::T12, bounds: Bounds::new(300.0, 2000.0).unwrap() },
            FitParameter { param: FreeParam::Trot, bounds: Bounds::new(300.0, 2000.0).unwrap() },
        ]
    }

    #[test]
    fn history_csv_has_one_row_per_evaluation() {
        let mut history = FitHistory::new();
        history.record(ParameterVector::new(vec![300.0, 300.0]), Ok(0.5));
        history.record(
            ParameterVector::new(vec![2000.0, 2000.0]),
            Err(EvalError::ProviderComputation("no lines".into())),
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        write_history_csv(&path, &params(), &history).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "index,T12,Trot,residual,error");
        assert!(lines[1].starts_with("0,300.000000,300.000000,5.0000000000e-1,"));
        assert_eq!(
            lines[2],
            "1,2000.000000,2000.000000,,spectrum computation failed: no lines"
        );
    }

    #[test]
    fn result_json_round_trips_through_serde() {
        let result = FitResult {
            best: Some(BestPoint {
                values: ParameterVector::new(vec![517.0, 491.0]),
                residual: 0.001,
                history_index: 12,
            }),
            success: true,
            state: FitState::Converged,
            optimizer_evaluations: 20,
            evaluations: 22,
            iterations: 6,
            solver_point: None,
            message: "Simplex cost spread below sd_tolerance".to_string(),
        };
        let report = FitReport::new("exp", Quantity::TransmittanceNoslit, Method::NelderMead, &params(), &result, 22);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        write_result_json(&path, &report).unwrap();

        let back: FitReport = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(back.tool, "sfit");
        assert_eq!(back.quantity, Quantity::TransmittanceNoslit);
        assert_eq!(back.best.unwrap().values.as_slice(), &[517.0, 491.0]);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"quantity\": \"transmittance_noslit\""));
        assert!(raw.contains("\"method\": \"nelder-mead\""));
    }
}
