//! Line list CSV reader.
//!
//! Columns: `wavenumber,intensity,ev12,ev3,erot,v12,v3` (header required, `#` comments).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::AppError;
use crate::provider::Line;

pub fn read_line_list(path: &Path) -> Result<Vec<Line>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open line list '{}': {e}", path.display()))
    })?;
    parse_line_list(file).map_err(|e| AppError::new(2, format!("{}: {e}", path.display())))
}

pub fn parse_line_list<R: Read>(reader: R) -> Result<Vec<Line>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut lines = Vec::new();
    for (idx, result) in reader.deserialize::<Line>().enumerate() {
        let line: Line = result
            .map_err(|e| AppError::new(2, format!("Invalid line list row {}: {e}", idx + 1)))?;
        if !(line.wavenumber.is_finite() && line.intensity.is_finite() && line.intensity >= 0.0) {
            return Err(AppError::new(
                2,
                format!("Invalid line list row {}: non-finite or negative values", idx + 1),
            ));
        }
        lines.push(line);
    }
    if lines.is_empty() {
        return Err(AppError::new(2, "Line list is empty."));
    }
    Ok(lines)
}
