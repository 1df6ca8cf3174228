//! Synthetic reference spectra for the offline demo.
//!
//! The demo reference is computed by the built-in provider at known conditions
//! and perturbed with seeded Gaussian noise, so a fit against it has a known
//! answer.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ModelConditions, Quantity, VibDistribution};
use crate::error::AppError;
use crate::provider::SpectrumProvider;
use crate::spectrum::Spectrum;

/// `[T12, T3, Trot]` of the demo case (K).
pub const DEMO_TEMPERATURES: [f64; 3] = [517.0, 2641.0, 491.0];

/// Air/CO2 molar mass ratio used to express the demo mole fraction.
const AIR_TO_CO2: f64 = 28.97 / 44.07;

/// Conditions of the demo case: 20 mbar, 10 cm, Treanor populations.
pub fn demo_conditions() -> ModelConditions {
    ModelConditions {
        pressure_bar: 20e-3,
        path_length_cm: 10.0,
        mole_fraction: 0.1 * AIR_TO_CO2,
        distribution: VibDistribution::Treanor,
        temperatures: DEMO_TEMPERATURES,
    }
}

/// Compute `quantity` at `conditions` and add `N(0, noise_sigma)` to every point.
///
/// The result holds only `quantity` and is named `synthetic`.
pub fn synthesize_reference(
    provider: &dyn SpectrumProvider,
    conditions: &ModelConditions,
    quantity: Quantity,
    noise_sigma: f64,
    seed: u64,
) -> Result<Spectrum, AppError> {
    if !(noise_sigma.is_finite() && noise_sigma >= 0.0) {
        return Err(AppError::new(2, format!("Noise level must be >= 0 (got {noise_sigma}).")));
    }
    let mut spectrum = provider.compute(conditions)?;
    let clean = spectrum
        .get(quantity)
        .map(<[f64]>::to_vec)
        .ok_or_else(|| AppError::new(4, format!("Provider did not produce {quantity}.")))?;
    spectrum.retain_only(quantity);

    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, noise_sigma)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let noisy: Vec<f64> = clean.iter().map(|v| v + normal.sample(&mut rng)).collect();

    let unit = spectrum.unit(quantity).unwrap_or("").to_string();
    let spectrum = spectrum
        .with_quantity(quantity, noisy, unit)
        .map_err(|e| AppError::new(4, e))?
        .with_name("synthetic");
    Ok(spectrum)
}
