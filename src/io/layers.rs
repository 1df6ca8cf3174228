//! Condition tables (one slab per row), used by `sweep` and `los`.
//!
//! Columns: `name,t12,t3,trot,pressure_bar,path_length_cm,mole_fraction`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::domain::{ModelConditions, VibDistribution};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionRow {
    pub name: String,
    pub t12: f64,
    pub t3: f64,
    pub trot: f64,
    pub pressure_bar: f64,
    pub path_length_cm: f64,
    pub mole_fraction: f64,
}

impl ConditionRow {
    pub fn conditions(&self, distribution: VibDistribution) -> ModelConditions {
        ModelConditions {
            pressure_bar: self.pressure_bar,
            path_length_cm: self.path_length_cm,
            mole_fraction: self.mole_fraction,
            distribution,
            temperatures: [self.t12, self.t3, self.trot],
        }
    }
}

pub fn read_condition_rows(path: &Path) -> Result<Vec<ConditionRow>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open conditions CSV '{}': {e}", path.display()))
    })?;
    parse_condition_rows(file).map_err(|e| AppError::new(2, format!("{}: {e}", path.display())))
}

pub fn parse_condition_rows<R: Read>(reader: R) -> Result<Vec<ConditionRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<ConditionRow>().enumerate() {
        let row = result.map_err(|e| AppError::new(2, format!("Invalid row {}: {e}", idx + 1)))?;
        if row.name.is_empty() {
            return Err(AppError::new(2, format!("Invalid row {}: empty name", idx + 1)));
        }
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(AppError::new(2, "Conditions table has no rows."));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FreeParam;

    #[test]
    fn parses_rows_into_conditions() {
        let text = "# far to near\nname,t12,t3,trot,pressure_bar,path_length_cm,mole_fraction\n\
                    core,1500,2500,1200,0.02,5,0.066\n";
        let rows = parse_condition_rows(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        let c = rows[0].conditions(VibDistribution::Treanor);
        assert_eq!(c.get(FreeParam::T3), 2500.0);
        assert_eq!(c.path_length_cm, 5.0);
    }

    #[test]
    fn empty_table_is_an_input_error() {
        let text = "name,t12,t3,trot,pressure_bar,path_length_cm,mole_fraction\n";
        assert_eq!(parse_condition_rows(text.as_bytes()).unwrap_err().exit_code(), 2);
    }
}
