//! Reference spectrum loading and spectrum CSV export.
//!
//! The loader accepts plain delimited text: `#` comment lines, an optional header
//! row, and numeric columns selected by index. Any row that cannot be used is a
//! hard error (exit code 2) pointing at its line; a reference with holes would
//! silently change the residual.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::domain::{Quantity, WaveUnit};
use crate::error::AppError;
use crate::spectrum::Spectrum;

/// How to read a reference file.
#[derive(Debug, Clone)]
pub struct ReferenceFormat {
    pub quantity: Quantity,
    pub waveunit: WaveUnit,
    /// Unit label of the values (informational).
    pub unit: String,
    pub delimiter: u8,
    pub x_column: usize,
    pub y_column: usize,
    pub has_headers: bool,
    pub name: Option<String>,
}

impl ReferenceFormat {
    /// Comma-delimited, columns 0/1, no header.
    pub fn new(quantity: Quantity, waveunit: WaveUnit) -> Self {
        Self {
            quantity,
            waveunit,
            unit: quantity.default_unit().to_string(),
            delimiter: b',',
            x_column: 0,
            y_column: 1,
            has_headers: false,
            name: None,
        }
    }
}

/// Load a reference spectrum from a file.
pub fn load_reference(path: &Path, format: &ReferenceFormat) -> Result<Spectrum, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open reference '{}': {e}", path.display()))
    })?;
    let name = format
        .name
        .clone()
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()));
    let format = ReferenceFormat { name, ..format.clone() };
    read_reference(file, &format)
        .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))
}

/// Parse a reference spectrum from any reader.
pub fn read_reference<R: Read>(reader: R, format: &ReferenceFormat) -> Result<Spectrum, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter)
        .has_headers(format.has_headers)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut x = Vec::new();
    let mut y = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AppError::new(2, format!("CSV parse error: {e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let xv = parse_field(&record, format.x_column, line)?;
        let yv = parse_field(&record, format.y_column, line)?;
        x.push(xv);
        y.push(yv);
    }

    if x.is_empty() {
        return Err(AppError::new(2, "Reference contains no data rows."));
    }

    let mut spectrum = Spectrum::new(x, format.waveunit)
        .map_err(|e| AppError::new(2, format!("Invalid reference axis: {e}")))?
        .with_quantity(format.quantity, y, format.unit.clone())
        .map_err(|e| AppError::new(2, e))?;
    if let Some(name) = &format.name {
        spectrum = spectrum.with_name(name.clone());
    }
    Ok(spectrum)
}

fn parse_field(record: &csv::StringRecord, column: usize, line: u64) -> Result<f64, AppError> {
    let raw = record.get(column).ok_or_else(|| {
        AppError::new(
            2,
            format!("line {line}: missing column {column} (row has {} fields)", record.len()),
        )
    })?;
    let value: f64 = raw
        .parse()
        .map_err(|_| AppError::new(2, format!("line {line}: cannot parse '{raw}' as a number")))?;
    if !value.is_finite() {
        return Err(AppError::new(2, format!("line {line}: non-finite value '{raw}'")));
    }
    Ok(value)
}

/// Write a spectrum as `wavespace,<quantity...>` CSV (one column per quantity).
pub fn write_spectrum_csv(path: &Path, spectrum: &Spectrum) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(4, format!("Failed to create spectrum CSV '{}': {e}", path.display()))
    })?;

    let quantities: Vec<Quantity> = spectrum.quantities().collect();
    let mut header = vec![format!("wavespace_{}", spectrum.waveunit().as_str())];
    header.extend(quantities.iter().map(|q| q.as_str().to_string()));
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(4, format!("Failed to write spectrum CSV header: {e}")))?;

    for (i, w) in spectrum.wavespace().iter().enumerate() {
        let mut row = vec![format!("{w:.6}")];
        for q in &quantities {
            let v = spectrum.get(*q).map(|vals| vals[i]).unwrap_or(f64::NAN);
            row.push(format!("{v:.8e}"));
        }
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(4, format!("Failed to write spectrum CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush spectrum CSV: {e}")))?;
    Ok(())
}
