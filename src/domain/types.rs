//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A free-parameter slot of the spectral model.
///
/// Slots are addressed by a fixed index into [`ModelConditions::temperatures`], so
/// merging fitted values into the model input never goes through string lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum FreeParam {
    /// Vibrational temperature of the bending/symmetric-stretch group (ν1, ν2).
    #[serde(rename = "T12")]
    #[value(name = "T12")]
    T12,
    /// Vibrational temperature of the asymmetric stretch (ν3).
    #[serde(rename = "T3")]
    #[value(name = "T3")]
    T3,
    /// Rotational (and translational) temperature.
    #[serde(rename = "Trot")]
    #[value(name = "Trot")]
    Trot,
}

impl FreeParam {
    pub const COUNT: usize = 3;
    pub const ALL: [FreeParam; FreeParam::COUNT] = [FreeParam::T12, FreeParam::T3, FreeParam::Trot];

    pub fn index(self) -> usize {
        match self {
            FreeParam::T12 => 0,
            FreeParam::T3 => 1,
            FreeParam::Trot => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FreeParam::T12 => "T12",
            FreeParam::T3 => "T3",
            FreeParam::Trot => "Trot",
        }
    }

    pub fn unit(self) -> &'static str {
        "K"
    }
}

impl fmt::Display for FreeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    /// Build validated bounds (finite, `min <= max`).
    pub fn new(min: f64, max: f64) -> Result<Self, String> {
        if !(min.is_finite() && max.is_finite()) {
            return Err(format!("bounds must be finite (got [{min}, {max}])"));
        }
        if min > max {
            return Err(format!("bounds are reversed: [{min}, {max}]"));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// A fitted parameter: which slot, and where it may move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    pub param: FreeParam,
    pub bounds: Bounds,
}

/// Values of the fitted parameters, in the order of the declared [`FitParameter`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterVector(Vec<f64>);

impl ParameterVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Component-wise lower bounds.
    pub fn lower(params: &[FitParameter]) -> Self {
        Self(params.iter().map(|p| p.bounds.min).collect())
    }

    /// Component-wise upper bounds.
    pub fn upper(params: &[FitParameter]) -> Self {
        Self(params.iter().map(|p| p.bounds.max).collect())
    }

    /// Component-wise midpoint of the bounds.
    pub fn midpoint(params: &[FitParameter]) -> Self {
        Self(params.iter().map(|p| p.bounds.midpoint()).collect())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `T12=517.0K,T3=2641.0K,Trot=491.0K` (values rounded to integers).
    pub fn display_with(&self, params: &[FitParameter]) -> String {
        params
            .iter()
            .zip(self.0.iter())
            .map(|(p, v)| format!("{}={:.1}{}", p.param.name(), v.round(), p.param.unit()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Vibrational population model used by the spectrum provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VibDistribution {
    Boltzmann,
    Treanor,
}

/// Physical conditions of one slab, as consumed by a spectrum provider.
///
/// Fixed fields are named; the three temperatures live in slots indexed by
/// [`FreeParam`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConditions {
    /// Total pressure (bar).
    pub pressure_bar: f64,
    /// Path length (cm).
    pub path_length_cm: f64,
    /// Mole fraction of the absorbing species (0, 1].
    pub mole_fraction: f64,
    pub distribution: VibDistribution,
    /// `[T12, T3, Trot]` in K.
    pub temperatures: [f64; FreeParam::COUNT],
}

impl ModelConditions {
    pub fn get(&self, param: FreeParam) -> f64 {
        self.temperatures[param.index()]
    }

    pub fn set(&mut self, param: FreeParam, value: f64) {
        self.temperatures[param.index()] = value;
    }

    /// Overlay fitted values onto a copy of these conditions.
    pub fn merged(&self, params: &[FitParameter], values: &ParameterVector) -> Self {
        let mut out = *self;
        for (p, &v) in params.iter().zip(values.as_slice()) {
            out.set(p.param, v);
        }
        out
    }

    /// Equilibrium-like conditions where all temperatures are equal.
    pub fn isothermal(t: f64, pressure_bar: f64, path_length_cm: f64, mole_fraction: f64) -> Self {
        Self {
            pressure_bar,
            path_length_cm,
            mole_fraction,
            distribution: VibDistribution::Boltzmann,
            temperatures: [t; FreeParam::COUNT],
        }
    }
}

/// Named spectral quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    #[value(name = "abscoeff")]
    Abscoeff,
    #[value(name = "absorbance")]
    Absorbance,
    #[value(name = "transmittance_noslit")]
    TransmittanceNoslit,
    #[value(name = "emissivity_noslit")]
    EmissivityNoslit,
    #[value(name = "radiance_noslit")]
    RadianceNoslit,
}

impl Quantity {
    pub fn as_str(self) -> &'static str {
        match self {
            Quantity::Abscoeff => "abscoeff",
            Quantity::Absorbance => "absorbance",
            Quantity::TransmittanceNoslit => "transmittance_noslit",
            Quantity::EmissivityNoslit => "emissivity_noslit",
            Quantity::RadianceNoslit => "radiance_noslit",
        }
    }

    /// Default unit label.
    pub fn default_unit(self) -> &'static str {
        match self {
            Quantity::Abscoeff => "cm-1",
            Quantity::Absorbance | Quantity::TransmittanceNoslit | Quantity::EmissivityNoslit => "",
            Quantity::RadianceNoslit => "W/cm2/sr/cm-1",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of the spectral axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum WaveUnit {
    /// Wavenumber.
    #[serde(rename = "cm-1")]
    #[value(name = "cm-1")]
    Cm1,
    /// Vacuum wavelength.
    #[serde(rename = "nm")]
    #[value(name = "nm")]
    Nm,
}

impl WaveUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            WaveUnit::Cm1 => "cm-1",
            WaveUnit::Nm => "nm",
        }
    }

    /// Convert a single coordinate from `self` to `to` (vacuum: `nm = 1e7 / cm-1`).
    pub fn convert(self, value: f64, to: WaveUnit) -> f64 {
        if self == to { value } else { 1e7 / value }
    }
}

/// Spectral window of a computation (cm-1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralWindow {
    pub wavenum_min: f64,
    pub wavenum_max: f64,
    pub wstep: f64,
}

impl SpectralWindow {
    /// Equidistant axis from `wavenum_min` to `wavenum_max` (inclusive when it lands on a step).
    pub fn axis(&self) -> Result<Vec<f64>, String> {
        if !(self.wavenum_min.is_finite() && self.wavenum_max.is_finite() && self.wstep.is_finite()) {
            return Err("spectral window must be finite".to_string());
        }
        if self.wstep <= 0.0 {
            return Err("wstep must be > 0".to_string());
        }
        if self.wavenum_max <= self.wavenum_min {
            return Err(format!(
                "empty spectral window [{}, {}]",
                self.wavenum_min, self.wavenum_max
            ));
        }
        let n = ((self.wavenum_max - self.wavenum_min) / self.wstep + 1e-9).floor() as usize + 1;
        Ok((0..n).map(|i| self.wavenum_min + i as f64 * self.wstep).collect())
    }
}

/// Bounded minimizer used by the fit driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Nelder-Mead simplex search.
    NelderMead,
    /// L-BFGS on projected finite-difference gradients.
    Lbfgs,
}

/// Whether the two boundary probes count toward reported evaluations.
///
/// The history always contains them; this only affects [`FitResult::evaluations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeAccounting {
    Counted,
    Excluded,
}

/// Fit driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitState {
    Uninitialized,
    BoundaryProbe,
    Optimizing,
    Converged,
    Failed,
}

/// Best point of a fit, taken from the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPoint {
    pub values: ParameterVector,
    pub residual: f64,
    /// Index into the fit history (0 and 1 are the boundary probes).
    pub history_index: usize,
}

/// Terminal snapshot of a fit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// `None` when no evaluation succeeded.
    pub best: Option<BestPoint>,
    pub success: bool,
    pub state: FitState,
    /// Evaluations requested by the solver.
    pub optimizer_evaluations: usize,
    /// Evaluations reported for statistics (see [`ProbeAccounting`]).
    pub evaluations: usize,
    /// Solver iterations.
    pub iterations: usize,
    /// Where the solver itself ended (may be worse than `best`).
    pub solver_point: Option<ParameterVector>,
    pub message: String,
}

/// Built-in provider settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Line list CSV; `None` uses the bundled CO2 demo list.
    pub line_list: Option<PathBuf>,
    pub window: SpectralWindow,
    pub molar_mass: f64,
    pub cutoff: f64,
}

/// How a reference file is read.
#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub path: PathBuf,
    pub delimiter: u8,
    pub x_column: usize,
    pub y_column: usize,
    pub has_headers: bool,
    pub waveunit: WaveUnit,
    pub quantity: Quantity,
}

/// A full fit run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub reference: ReferenceConfig,
    pub provider: ProviderConfig,

    pub conditions: ModelConditions,
    pub parameters: Vec<FitParameter>,

    pub method: Method,
    pub max_iterations: usize,
    pub fd_eps: f64,
    pub plot_every: usize,
    pub energy_threshold: Option<f64>,
    pub probe_accounting: ProbeAccounting,

    pub tui: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub quiet: bool,
    pub strict: bool,

    pub export_history: Option<PathBuf>,
    pub export_best: Option<PathBuf>,
    pub export_result: Option<PathBuf>,
    pub save_plot: Option<PathBuf>,
}

/// Batch computation over a table of conditions.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub conditions_path: PathBuf,
    pub out_dir: PathBuf,
    pub overwrite: bool,
    pub distribution: VibDistribution,
    /// Quantity whose integral is reported per item.
    pub quantity: Quantity,
    pub provider: ProviderConfig,
}

/// Line-of-sight combination of a layer table.
#[derive(Debug, Clone)]
pub struct LosConfig {
    pub layers_path: PathBuf,
    pub distribution: VibDistribution,
    pub quantity: Quantity,
    pub provider: ProviderConfig,
    pub export: Option<PathBuf>,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}
