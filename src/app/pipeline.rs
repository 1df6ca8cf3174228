//! Shared pipeline logic used by the subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! line list -> provider -> reference -> fit driver -> best spectrum
//!
//! The subcommand handlers in `app` can then focus on presentation.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;

use crate::domain::{FitConfig, FitResult, LosConfig, ProviderConfig, Quantity, SweepConfig, WaveUnit};
use crate::error::{AppError, EvalError};
use crate::fit::{FitDriver, FitHistory, FitOptions, SolverOptions};
use crate::io::{ConditionRow, ReferenceFormat, load_reference, parse_line_list, read_line_list, write_spectrum_csv};
use crate::provider::linelist::BUNDLED_CO2_LINES;
use crate::provider::{LineListProvider, SpectrumProvider};
use crate::report::ProgressReporter;
use crate::spectrum::{CALCULATION_TIME, Spectrum, serial_slabs};

/// Outputs of a single fit run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub result: FitResult,
    pub history: FitHistory,
}

/// Build the line-list provider (bundled CO2 list unless a file is given).
pub fn load_provider(config: &ProviderConfig) -> Result<LineListProvider, AppError> {
    let lines = match &config.line_list {
        Some(path) => read_line_list(path)?,
        None => parse_line_list(BUNDLED_CO2_LINES.as_bytes())?,
    };
    info!("loaded {} lines", lines.len());
    let provider = LineListProvider::new(lines, config.window, config.molar_mass)
        .map_err(|e| AppError::new(2, format!("Invalid provider settings: {e}")))?
        .with_cutoff(config.cutoff);
    Ok(provider)
}

/// Load the reference named by a fit configuration.
pub fn load_fit_reference(config: &FitConfig) -> Result<Spectrum, AppError> {
    let r = &config.reference;
    let format = ReferenceFormat {
        delimiter: r.delimiter,
        x_column: r.x_column,
        y_column: r.y_column,
        has_headers: r.has_headers,
        ..ReferenceFormat::new(r.quantity, r.waveunit)
    };
    let reference = load_reference(&r.path, &format)?;
    info!(
        "reference '{}': {} points",
        reference.name().unwrap_or("reference"),
        reference.len()
    );
    Ok(reference)
}

pub fn fit_options(config: &FitConfig) -> FitOptions {
    FitOptions {
        method: config.method,
        solver: SolverOptions {
            max_iterations: config.max_iterations,
            fd_eps: config.fd_eps,
            ..SolverOptions::default()
        },
        plot_every: config.plot_every,
        energy_threshold: config.energy_threshold,
        probe_accounting: config.probe_accounting,
    }
}

/// Run the fit loop against a loaded reference.
pub fn run_fit(
    config: &FitConfig,
    provider: &dyn SpectrumProvider,
    reference: &Spectrum,
    reporter: &mut dyn ProgressReporter,
) -> FitRun {
    let mut driver = FitDriver::new(
        provider,
        reference,
        config.reference.quantity,
        config.parameters.clone(),
        config.conditions,
        fit_options(config),
    );
    let result = driver.run(reporter);
    FitRun {
        result,
        history: driver.history().clone(),
    }
}

/// Recompute the fitted quantity at the best point, if there is one.
pub fn best_spectrum(
    config: &FitConfig,
    provider: &dyn SpectrumProvider,
    result: &FitResult,
) -> Result<Option<Spectrum>, AppError> {
    let Some(best) = &result.best else {
        return Ok(None);
    };
    let conditions = config.conditions.merged(&config.parameters, &best.values);
    let mut spectrum = provider.compute(&conditions)?;
    if !spectrum.retain_only(config.reference.quantity) {
        return Err(AppError::new(4, format!("Provider did not produce {}.", config.reference.quantity)));
    }
    Ok(Some(spectrum.with_name("best")))
}

/// One successfully written sweep item.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepItem {
    pub name: String,
    pub path: PathBuf,
    /// Provider wall time (s).
    pub calculation_time: f64,
    pub integral: f64,
}

/// Per-row outcome of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepStatus {
    Written(SweepItem),
    Skipped { name: String, path: PathBuf },
    Failed { name: String, error: String },
}

#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub items: Vec<SweepStatus>,
}

impl SweepSummary {
    pub fn written(&self) -> usize {
        self.items.iter().filter(|s| matches!(s, SweepStatus::Written(_))).count()
    }

    pub fn skipped(&self) -> usize {
        self.items.iter().filter(|s| matches!(s, SweepStatus::Skipped { .. })).count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|s| matches!(s, SweepStatus::Failed { .. })).count()
    }
}

/// Compute every row independently; failures are collected, never fatal.
pub fn run_sweep<P>(config: &SweepConfig, provider: &P, rows: &[ConditionRow]) -> Result<SweepSummary, AppError>
where
    P: SpectrumProvider + Sync,
{
    if let Some(bad) = rows.iter().find(|r| !is_plain_file_stem(&r.name)) {
        return Err(AppError::new(
            2,
            format!("Item name '{}' must not contain path separators or '..'.", bad.name),
        ));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = rows.iter().find(|r| !seen.insert(r.name.as_str())) {
        return Err(AppError::new(2, format!("Duplicate item name '{}' in conditions table.", dup.name)));
    }
    std::fs::create_dir_all(&config.out_dir).map_err(|e| {
        AppError::new(4, format!("Failed to create output directory '{}': {e}", config.out_dir.display()))
    })?;

    let items: Vec<SweepStatus> = rows
        .par_iter()
        .map(|row| {
            let path = config.out_dir.join(format!("{}.csv", row.name));
            if path.exists() && !config.overwrite {
                warn!("{}: {} exists, skipping", row.name, path.display());
                return SweepStatus::Skipped { name: row.name.clone(), path };
            }
            match sweep_item(config, provider, row, path) {
                Ok(item) => {
                    info!("{}: computed in {:.3}s", item.name, item.calculation_time);
                    SweepStatus::Written(item)
                }
                Err(error) => {
                    warn!("{}: {error}", row.name);
                    SweepStatus::Failed { name: row.name.clone(), error }
                }
            }
        })
        .collect();

    Ok(SweepSummary { items })
}

/// `name` maps to a single file directly inside the output directory.
fn is_plain_file_stem(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    ) && !name.contains(['/', '\\']) && !name.contains("..")
}

fn sweep_item<P: SpectrumProvider>(
    config: &SweepConfig,
    provider: &P,
    row: &ConditionRow,
    path: PathBuf,
) -> Result<SweepItem, String> {
    let spectrum = provider
        .compute(&row.conditions(config.distribution))
        .map_err(|e: EvalError| e.to_string())?
        .with_name(row.name.clone());
    let integral = spectrum
        .integral(config.quantity)
        .ok_or_else(|| format!("provider did not produce {}", config.quantity))?;
    write_spectrum_csv(&path, &spectrum).map_err(|e| e.to_string())?;
    Ok(SweepItem {
        name: row.name.clone(),
        path,
        calculation_time: spectrum.condition(CALCULATION_TIME).unwrap_or(0.0),
        integral,
    })
}

/// Combined line-of-sight spectrum.
#[derive(Debug, Clone)]
pub struct LosRun {
    pub spectrum: Spectrum,
    pub quantity: Quantity,
    pub integral: f64,
    /// `(name, calculation time in s)` per layer, far to near.
    pub layers: Vec<(String, f64)>,
}

impl LosRun {
    /// Unit of [`Self::integral`]: the quantity unit times the axis unit.
    pub fn integral_unit(&self) -> String {
        let axis = self.spectrum.waveunit().as_str();
        let unit = self.spectrum.unit(self.quantity).unwrap_or("");
        if unit.is_empty() {
            return axis.to_string();
        }
        match unit.strip_suffix(&format!("/{axis}")) {
            Some(stripped) if self.spectrum.waveunit() == WaveUnit::Cm1 => stripped.to_string(),
            _ => format!("{unit}*{axis}"),
        }
    }
}

/// Compute every layer and combine them far to near.
pub fn run_los(config: &LosConfig, provider: &dyn SpectrumProvider, rows: &[ConditionRow]) -> Result<LosRun, AppError> {
    let mut spectra = Vec::with_capacity(rows.len());
    let mut layers = Vec::with_capacity(rows.len());
    for row in rows {
        let spectrum = provider
            .compute(&row.conditions(config.distribution))
            .map_err(|e| AppError::new(4, format!("Layer '{}': {e}", row.name)))?
            .with_name(row.name.clone());
        layers.push((row.name.clone(), spectrum.condition(CALCULATION_TIME).unwrap_or(0.0)));
        spectra.push(spectrum);
    }

    let spectrum = serial_slabs(&spectra).map_err(|e| AppError::new(4, format!("Cannot combine layers: {e}")))?;
    let integral = spectrum.integral(config.quantity).ok_or_else(|| {
        AppError::new(4, format!("Combined spectrum has no {}.", config.quantity))
    })?;
    Ok(LosRun {
        spectrum,
        quantity: config.quantity,
        integral,
        layers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SpectralWindow, VibDistribution};
    use crate::io::parse_condition_rows;

    fn provider_config() -> ProviderConfig {
        ProviderConfig {
            line_list: None,
            window: SpectralWindow { wavenum_min: 2284.2, wavenum_max: 2284.6, wstep: 0.001 },
            molar_mass: 44.01,
            cutoff: 0.0,
        }
    }

    fn rows() -> Vec<ConditionRow> {
        let csv = "name,t12,t3,trot,pressure_bar,path_length_cm,mole_fraction\n\
                   warm,600,1500,500,0.02,10,0.06\n\
                   broken,600,1500,-5,0.02,10,0.06\n\
                   cold,300,300,300,0.02,10,0.06\n";
        parse_condition_rows(csv.as_bytes()).unwrap()
    }

    fn sweep_config(out_dir: PathBuf, overwrite: bool) -> SweepConfig {
        SweepConfig {
            conditions_path: PathBuf::from("conditions.csv"),
            out_dir,
            overwrite,
            distribution: VibDistribution::Boltzmann,
            quantity: Quantity::RadianceNoslit,
            provider: provider_config(),
        }
    }

    #[test]
    fn sweep_collects_failures_and_skips_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let provider = load_provider(&provider_config()).unwrap();
        let config = sweep_config(dir.path().to_path_buf(), false);

        let first = run_sweep(&config, &provider, &rows()).unwrap();
        assert_eq!((first.written(), first.skipped(), first.failed()), (2, 0, 1));
        assert!(dir.path().join("warm.csv").exists());
        assert!(!dir.path().join("broken.csv").exists());
        assert!(matches!(&first.items[1], SweepStatus::Failed { name, .. } if name == "broken"));

        let second = run_sweep(&config, &provider, &rows()).unwrap();
        assert_eq!((second.written(), second.skipped(), second.failed()), (0, 2, 1));

        let forced = run_sweep(&sweep_config(dir.path().to_path_buf(), true), &provider, &rows()).unwrap();
        assert_eq!(forced.written(), 2);
    }

    #[test]
    fn sweep_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let provider = load_provider(&provider_config()).unwrap();
        let mut table = rows();
        table[2].name = "warm".to_string();
        let err = run_sweep(&sweep_config(dir.path().to_path_buf(), false), &provider, &table).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn sweep_rejects_names_that_escape_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("spectra");
        let provider = load_provider(&provider_config()).unwrap();
        for name in ["../escaped", "a/b", "..", "a\\b", "/abs"] {
            let mut table = rows();
            table[0].name = name.to_string();
            let err = run_sweep(&sweep_config(out.clone(), false), &provider, &table).unwrap_err();
            assert_eq!(err.exit_code(), 2, "{name}");
        }
        assert!(!out.exists());
        assert!(!dir.path().join("escaped.csv").exists());
    }

    #[test]
    fn plain_names_are_accepted() {
        assert!(is_plain_file_stem("warm"));
        assert!(is_plain_file_stem("co2.layer-1"));
        assert!(!is_plain_file_stem("."));
        assert!(!is_plain_file_stem("a..b"));
    }

    #[test]
    fn line_of_sight_combines_layers_far_to_near() {
        let provider = load_provider(&provider_config()).unwrap();
        let mut table = rows();
        table.remove(1);
        let config = LosConfig {
            layers_path: PathBuf::from("layers.csv"),
            distribution: VibDistribution::Boltzmann,
            quantity: Quantity::RadianceNoslit,
            provider: provider_config(),
            export: None,
            plot: false,
            plot_width: 80,
            plot_height: 20,
        };
        let run = run_los(&config, &provider, &table).unwrap();
        assert_eq!(run.layers.len(), 2);
        assert_eq!(run.layers[0].0, "warm");
        assert!(run.integral > 0.0);
        assert_eq!(run.integral_unit(), "W/cm2/sr");

        // The near cold layer absorbs part of the warm layer's emission.
        let warm_only = run_los(&config, &provider, &table[..1]).unwrap();
        let t = run.spectrum.get(Quantity::TransmittanceNoslit).unwrap();
        let t_warm = warm_only.spectrum.get(Quantity::TransmittanceNoslit).unwrap();
        assert!(t.iter().zip(t_warm).all(|(a, b)| *a <= *b + 1e-12));
    }

    #[test]
    fn failing_layer_aborts_line_of_sight() {
        let provider = load_provider(&provider_config()).unwrap();
        let config = LosConfig {
            layers_path: PathBuf::from("layers.csv"),
            distribution: VibDistribution::Boltzmann,
            quantity: Quantity::RadianceNoslit,
            provider: provider_config(),
            export: None,
            plot: false,
            plot_width: 80,
            plot_height: 20,
        };
        let err = run_los(&config, &provider, &rows()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().starts_with("Layer 'broken':"));
    }
}
