//! Command-line parsing for the spectral multi-temperature fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code. Flags are grouped into reusable `Args` structs that several
//! subcommands flatten.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{
    Bounds, FitParameter, FreeParam, Method, ProbeAccounting, Quantity, VibDistribution, WaveUnit,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sfit", version, about = "Multi-temperature spectral fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit temperatures so the computed spectrum matches a reference file.
    Fit(FitArgs),
    /// Fit a synthetic reference with known temperatures (offline validation case).
    Demo(DemoArgs),
    /// Compute one spectrum per row of a conditions table, skipping failures.
    Sweep(SweepArgs),
    /// Combine a table of layers along a line of sight.
    Los(LosArgs),
    /// Plot one or two spectrum files in the terminal.
    Plot(PlotArgs),
}

/// How to read a spectrum file.
#[derive(Debug, Args, Clone)]
pub struct ReferenceArgs {
    /// Field delimiter.
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Column of the spectral axis (0-based).
    #[arg(long, default_value_t = 0)]
    pub x_col: usize,

    /// Column of the values (0-based).
    #[arg(long, default_value_t = 1)]
    pub y_col: usize,

    /// The first non-comment row is a header.
    #[arg(long)]
    pub header: bool,

    /// Unit of the spectral axis.
    #[arg(long, value_enum, default_value_t = WaveUnit::Cm1)]
    pub waveunit: WaveUnit,

    /// Quantity held by the file (and fitted).
    #[arg(short = 'q', long, value_enum, default_value_t = Quantity::TransmittanceNoslit)]
    pub quantity: Quantity,
}

/// Built-in line-list provider.
#[derive(Debug, Args, Clone)]
pub struct ProviderArgs {
    /// Line list CSV (`wavenumber,intensity,ev12,ev3,erot,v12,v3`); defaults to the bundled CO2 list.
    #[arg(long, env = "SFIT_LINE_LIST", value_name = "CSV")]
    pub line_list: Option<PathBuf>,

    /// Window start (cm-1).
    #[arg(long, default_value_t = 2284.2)]
    pub wmin: f64,

    /// Window end (cm-1).
    #[arg(long, default_value_t = 2284.6)]
    pub wmax: f64,

    /// Window step (cm-1).
    #[arg(long, default_value_t = 0.001)]
    pub wstep: f64,

    /// Molar mass of the absorber (g/mol).
    #[arg(long, default_value_t = crate::provider::linelist::CO2_MOLAR_MASS)]
    pub molar_mass: f64,

    /// Skip lines weaker than this after temperature scaling (cm/molecule).
    #[arg(long, default_value_t = 0.0)]
    pub cutoff: f64,

    /// Vibrational population model.
    #[arg(long, value_enum, default_value_t = VibDistribution::Treanor)]
    pub distribution: VibDistribution,
}

/// Fixed physical conditions of the fitted slab.
#[derive(Debug, Args, Clone)]
pub struct ConditionArgs {
    /// Total pressure (bar).
    #[arg(long, default_value_t = 20e-3)]
    pub pressure: f64,

    /// Path length (cm).
    #[arg(long, default_value_t = 10.0)]
    pub path_length: f64,

    /// Mole fraction of the absorber.
    #[arg(long, default_value_t = 0.1 * 28.97 / 44.07)]
    pub mole_fraction: f64,

    /// T12 (K) when it is not fitted.
    #[arg(long, default_value_t = 300.0)]
    pub t12: f64,

    /// T3 (K) when it is not fitted.
    #[arg(long, default_value_t = 300.0)]
    pub t3: f64,

    /// Trot (K) when it is not fitted.
    #[arg(long, default_value_t = 300.0)]
    pub trot: f64,
}

/// Fit loop and solver settings.
#[derive(Debug, Args, Clone)]
pub struct SolverArgs {
    /// Fitted parameter with bounds, e.g. `T3=300:5000` (repeatable).
    ///
    /// Defaults to T12=300:2000, T3=300:5000, Trot=300:2000.
    #[arg(long = "fit", value_name = "NAME=MIN:MAX", value_parser = parse_fit_parameter)]
    pub fit: Vec<FitParameter>,

    /// Bounded minimizer.
    #[arg(long, value_enum, env = "SFIT_METHOD", default_value_t = Method::NelderMead)]
    pub method: Method,

    /// Solver iteration budget.
    #[arg(long, env = "SFIT_MAX_ITERATIONS", default_value_t = 300)]
    pub max_iterations: usize,

    /// Finite-difference step for `lbfgs` gradients (K).
    #[arg(long, default_value_t = 20.0)]
    pub fd_eps: f64,

    /// Show the spectrum comparison every N solver evaluations (0 disables).
    #[arg(long, env = "SFIT_PLOT_EVERY", default_value_t = 1)]
    pub plot_every: usize,

    /// Maximum relative energy loss when resampling.
    #[arg(long, default_value_t = 2e-2)]
    pub energy_threshold: f64,

    /// Skip the resampling energy check.
    #[arg(long)]
    pub no_energy_check: bool,

    /// Whether the two boundary probes count toward reported evaluations.
    #[arg(long, value_enum, default_value_t = ProbeAccounting::Counted)]
    pub probe_accounting: ProbeAccounting,
}

/// Progress display and exports of a fit.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Live terminal dashboard instead of progress lines.
    #[arg(long)]
    pub tui: bool,

    /// ASCII spectrum plots in the progress output.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// No progress output, summary only.
    #[arg(long)]
    pub quiet: bool,

    /// Exit with code 3 when the solver does not converge.
    #[arg(long)]
    pub strict: bool,

    /// Write every evaluation to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_history: Option<PathBuf>,

    /// Write the spectrum at the best point to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_best: Option<PathBuf>,

    /// Write the fit report to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_result: Option<PathBuf>,

    /// Write the final comparison and residual trajectory to SVG.
    #[arg(long, value_name = "SVG")]
    pub save_plot: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Reference spectrum file.
    #[arg(value_name = "REFERENCE")]
    pub reference: PathBuf,

    #[command(flatten)]
    pub format: ReferenceArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(flatten)]
    pub conditions: ConditionArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Standard deviation of the Gaussian noise added to the synthetic reference.
    #[arg(long, default_value_t = 2e-3)]
    pub noise: f64,

    /// Noise seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fitted quantity.
    #[arg(short = 'q', long, value_enum, default_value_t = Quantity::TransmittanceNoslit)]
    pub quantity: Quantity,

    /// Also write the synthetic reference to CSV.
    #[arg(long, value_name = "CSV")]
    pub write_reference: Option<PathBuf>,

    #[command(flatten)]
    pub solver: SolverArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SweepArgs {
    /// Conditions CSV (`name,t12,t3,trot,pressure_bar,path_length_cm,mole_fraction`).
    #[arg(value_name = "CONDITIONS")]
    pub conditions: PathBuf,

    /// Output directory (one `<name>.csv` per row).
    #[arg(short = 'o', long, default_value = "spectra")]
    pub out_dir: PathBuf,

    /// Recompute rows whose output file already exists.
    #[arg(long)]
    pub overwrite: bool,

    /// Quantity whose integral is reported.
    #[arg(short = 'q', long, value_enum, default_value_t = Quantity::RadianceNoslit)]
    pub quantity: Quantity,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Args, Clone)]
pub struct LosArgs {
    /// Layer table CSV, ordered from the far side to the observer.
    #[arg(value_name = "LAYERS")]
    pub layers: PathBuf,

    /// Quantity whose integral is reported.
    #[arg(short = 'q', long, value_enum, default_value_t = Quantity::RadianceNoslit)]
    pub quantity: Quantity,

    /// Write the combined spectrum to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// ASCII plot of the combined spectrum.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Reference spectrum file (dots).
    #[arg(value_name = "REFERENCE")]
    pub reference: PathBuf,

    /// Computed spectrum file (line), read with the same format.
    #[arg(long, value_name = "FILE")]
    pub computed: Option<PathBuf>,

    #[command(flatten)]
    pub format: ReferenceArgs,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Parse `NAME=MIN:MAX` into a fitted parameter.
pub fn parse_fit_parameter(raw: &str) -> Result<FitParameter, String> {
    let (name, range) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=MIN:MAX, got '{raw}'"))?;
    let param = FreeParam::ALL
        .into_iter()
        .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| format!("unknown parameter '{name}' (expected T12, T3 or Trot)"))?;
    let (min, max) = range
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX bounds, got '{range}'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| format!("cannot parse bound '{s}'"))
    };
    let bounds = Bounds::new(parse(min)?, parse(max)?)?;
    Ok(FitParameter { param, bounds })
}

/// Bounds of the validation case.
pub fn default_fit_parameters() -> Vec<FitParameter> {
    let bounds = |min, max| Bounds { min, max };
    vec![
        FitParameter { param: FreeParam::T12, bounds: bounds(300.0, 2000.0) },
        FitParameter { param: FreeParam::T3, bounds: bounds(300.0, 5000.0) },
        FitParameter { param: FreeParam::Trot, bounds: bounds(300.0, 2000.0) },
    ]
}
