//! Line-by-line band model on a fixed spectral window.
//!
//! Each line carries its intensity at `T_REF` and the lower-level energy split
//! into two vibrational groups (bending/symmetric stretch "12", asymmetric stretch
//! "3") and rotation. Intensities are rescaled to the three temperatures of the
//! conditions, broadened with a Gaussian Doppler profile at `Trot`, and summed
//! into an absorption coefficient.

use std::time::Instant;

use log::debug;
use serde::Deserialize;

use crate::domain::{FreeParam, ModelConditions, Quantity, SpectralWindow, VibDistribution, WaveUnit};
use crate::error::EvalError;
use crate::math::{AMU, C2, C_LIGHT, K_B, T_REF, planck_wavenumber};
use crate::spectrum::{CALCULATION_TIME, Spectrum};

use super::{SpectrumProvider, validate_conditions};

/// Bundled CO2 line list covering 2284.2-2284.6 cm-1.
pub const BUNDLED_CO2_LINES: &str = include_str!("../../data/co2_demo_lines.csv");

/// CO2 molar mass (g/mol).
pub const CO2_MOLAR_MASS: f64 = 44.01;

/// First-quantum energies of the two CO2 vibrational groups (cm-1).
pub const CO2_FIRST_QUANTA: (f64, f64) = (667.38, 2349.14);

/// Profiles are truncated this many half-widths away from line centre.
const WING_HWHM: f64 = 25.0;

/// One spectral line.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Line {
    /// Line centre (cm-1).
    pub wavenumber: f64,
    /// Intensity at `T_REF` (cm/molecule).
    pub intensity: f64,
    /// Lower-level energy of the "12" vibrational group (cm-1).
    pub ev12: f64,
    /// Lower-level energy of the "3" vibrational group (cm-1).
    pub ev3: f64,
    /// Lower-level rotational energy (cm-1).
    pub erot: f64,
    pub v12: u32,
    pub v3: u32,
}

#[derive(Debug, Clone)]
pub struct LineListProvider {
    lines: Vec<Line>,
    window: SpectralWindow,
    axis: Vec<f64>,
    molar_mass: f64,
    first_quanta: (f64, f64),
    cutoff: f64,
}

impl LineListProvider {
    /// Build a provider for `lines` on `window`. Fails on an invalid window.
    pub fn new(lines: Vec<Line>, window: SpectralWindow, molar_mass: f64) -> Result<Self, String> {
        let axis = window.axis()?;
        if !(molar_mass.is_finite() && molar_mass > 0.0) {
            return Err(format!("molar mass must be > 0 (got {molar_mass})"));
        }
        Ok(Self {
            lines,
            window,
            axis,
            molar_mass,
            first_quanta: CO2_FIRST_QUANTA,
            cutoff: 0.0,
        })
    }

    /// Lines whose rescaled intensity falls below `cutoff` (cm/molecule) are skipped.
    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff.max(0.0);
        self
    }

    pub fn with_first_quanta(mut self, e12: f64, e3: f64) -> Self {
        self.first_quanta = (e12, e3);
        self
    }

    pub fn window(&self) -> SpectralWindow {
        self.window
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Line intensity (cm/molecule) at the conditions' temperatures.
    pub fn line_intensity(&self, line: &Line, conditions: &ModelConditions) -> f64 {
        let t12 = conditions.get(FreeParam::T12);
        let t3 = conditions.get(FreeParam::T3);
        let trot = conditions.get(FreeParam::Trot);
        let (e12, e3) = self.first_quanta;

        let vib = match conditions.distribution {
            VibDistribution::Boltzmann => line.ev12 / t12 + line.ev3 / t3,
            VibDistribution::Treanor => {
                // Harmonic part at the vibrational temperature, anharmonic
                // remainder at the rotational one.
                let h12 = f64::from(line.v12) * e12;
                let h3 = f64::from(line.v3) * e3;
                h12 / t12 + (line.ev12 - h12) / trot + h3 / t3 + (line.ev3 - h3) / trot
            }
        };
        let boltzmann = (-C2 * (vib + line.erot / trot)).exp();
        let boltzmann_ref = (-C2 * (line.ev12 + line.ev3 + line.erot) / T_REF).exp();

        let q_ref = vib_partition(T_REF, T_REF, e12, e3) * T_REF;
        let q = vib_partition(t12, t3, e12, e3) * trot;

        // Stimulated emission: (1 - exp(-c2 nu / T)) relative to T_REF.
        let stim = (-(-C2 * line.wavenumber / trot).exp_m1()) / (-(-C2 * line.wavenumber / T_REF).exp_m1());

        line.intensity * (q_ref / q) * (boltzmann / boltzmann_ref) * stim
    }

    /// Doppler half width at half maximum (cm-1).
    fn doppler_hwhm(&self, wavenumber: f64, trot: f64) -> f64 {
        let mass = self.molar_mass * AMU;
        wavenumber / C_LIGHT * (2.0 * std::f64::consts::LN_2 * K_B * trot / mass).sqrt()
    }

    fn absorption_coefficient(&self, conditions: &ModelConditions) -> Result<Vec<f64>, EvalError> {
        let trot = conditions.get(FreeParam::Trot);
        // molecules / cm3
        let density =
            conditions.mole_fraction * conditions.pressure_bar * 1e5 / (K_B * trot) * 1e-6;

        let lo = self.axis.first().copied().unwrap_or(f64::NAN);
        let hi = self.axis.last().copied().unwrap_or(f64::NAN);
        let ln2 = std::f64::consts::LN_2;

        let mut k = vec![0.0; self.axis.len()];
        let mut used = 0usize;
        for line in &self.lines {
            let s = self.line_intensity(line, conditions);
            if !s.is_finite() || s < self.cutoff || s <= 0.0 {
                continue;
            }
            let hwhm = self.doppler_hwhm(line.wavenumber, trot);
            let wing = WING_HWHM * hwhm;
            if line.wavenumber + wing < lo || line.wavenumber - wing > hi {
                continue;
            }
            used += 1;

            let norm = (ln2 / std::f64::consts::PI).sqrt() / hwhm;
            let start = self.axis.partition_point(|&w| w < line.wavenumber - wing);
            let end = self.axis.partition_point(|&w| w <= line.wavenumber + wing);
            for (ki, &w) in k[start..end].iter_mut().zip(&self.axis[start..end]) {
                let d = (w - line.wavenumber) / hwhm;
                *ki += density * s * norm * (-ln2 * d * d).exp();
            }
        }

        if used == 0 {
            return Err(EvalError::ProviderComputation(format!(
                "no line above cutoff {:.1e} in [{}, {}] cm-1",
                self.cutoff, self.window.wavenum_min, self.window.wavenum_max
            )));
        }
        debug!("{used} of {} lines contribute", self.lines.len());
        Ok(k)
    }
}

/// Harmonic-oscillator vibrational partition function (doubly degenerate "12" group).
fn vib_partition(t12: f64, t3: f64, e12: f64, e3: f64) -> f64 {
    let q12 = 1.0 / (-(-C2 * e12 / t12).exp_m1()).powi(2);
    let q3 = 1.0 / (-(-C2 * e3 / t3).exp_m1());
    q12 * q3
}

impl SpectrumProvider for LineListProvider {
    fn compute(&self, conditions: &ModelConditions) -> Result<Spectrum, EvalError> {
        validate_conditions(conditions)?;
        let started = Instant::now();

        let abscoeff = self.absorption_coefficient(conditions)?;
        let absorbance: Vec<f64> = abscoeff.iter().map(|k| k * conditions.path_length_cm).collect();
        let transmittance: Vec<f64> = absorbance.iter().map(|a| (-a).exp()).collect();
        let emissivity: Vec<f64> = transmittance.iter().map(|t| 1.0 - t).collect();
        let trot = conditions.get(FreeParam::Trot);
        let radiance: Vec<f64> = emissivity
            .iter()
            .zip(&self.axis)
            .map(|(e, &w)| e * planck_wavenumber(w, trot))
            .collect();

        let build = || -> Result<Spectrum, String> {
            Ok(Spectrum::new(self.axis.clone(), WaveUnit::Cm1)?
                .with_quantity(Quantity::Abscoeff, abscoeff, Quantity::Abscoeff.default_unit())?
                .with_quantity(Quantity::Absorbance, absorbance, "")?
                .with_quantity(Quantity::TransmittanceNoslit, transmittance, "")?
                .with_quantity(Quantity::EmissivityNoslit, emissivity, "")?
                .with_quantity(
                    Quantity::RadianceNoslit,
                    radiance,
                    Quantity::RadianceNoslit.default_unit(),
                )?)
        };
        let spectrum = build().map_err(EvalError::ProviderComputation)?;

        Ok(spectrum.with_condition(CALCULATION_TIME, started.elapsed().as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::linelist::parse_line_list;
    use approx::assert_relative_eq;

    fn provider() -> LineListProvider {
        let lines = parse_line_list(BUNDLED_CO2_LINES.as_bytes()).unwrap();
        let window = SpectralWindow { wavenum_min: 2284.2, wavenum_max: 2284.6, wstep: 0.001 };
        LineListProvider::new(lines, window, CO2_MOLAR_MASS).unwrap()
    }

    fn conditions(t12: f64, t3: f64, trot: f64, distribution: VibDistribution) -> ModelConditions {
        ModelConditions {
            pressure_bar: 20e-3,
            path_length_cm: 10.0,
            mole_fraction: 0.1 * 28.97 / 44.07,
            distribution,
            temperatures: [t12, t3, trot],
        }
    }

    #[test]
    fn intensity_is_unchanged_at_reference_temperature() {
        let p = provider();
        let c = conditions(T_REF, T_REF, T_REF, VibDistribution::Boltzmann);
        for line in p.lines() {
            assert_relative_eq!(p.line_intensity(line, &c), line.intensity, max_relative = 1e-12);
        }
    }

    #[test]
    fn intensity_scales_with_partition_and_stimulated_emission() {
        let p = provider();
        let line = Line { wavenumber: 2284.4, intensity: 1e-21, ev12: 0.0, ev3: 0.0, erot: 0.0, v12: 0, v3: 0 };
        let t = 491.0;
        let c = conditions(t, t, t, VibDistribution::Boltzmann);

        let (e12, e3) = CO2_FIRST_QUANTA;
        let q_ref = vib_partition(T_REF, T_REF, e12, e3) * T_REF;
        let q = vib_partition(t, t, e12, e3) * t;
        let stim = (1.0 - (-C2 * line.wavenumber / t).exp()) / (1.0 - (-C2 * line.wavenumber / T_REF).exp());
        let expected = line.intensity * q_ref / q * stim;

        assert_relative_eq!(p.line_intensity(&line, &c), expected, max_relative = 1e-12);
        // Emission correction stays close to 1 in the 4.3 µm band.
        assert!((stim - 1.0).abs() < 1e-3);
    }

    #[test]
    fn treanor_equals_boltzmann_at_equal_temperatures() {
        let p = provider();
        let b = p.compute(&conditions(800.0, 800.0, 800.0, VibDistribution::Boltzmann)).unwrap();
        let t = p.compute(&conditions(800.0, 800.0, 800.0, VibDistribution::Treanor)).unwrap();
        let (kb, kt) = (b.get(Quantity::Abscoeff).unwrap(), t.get(Quantity::Abscoeff).unwrap());
        for (x, y) in kb.iter().zip(kt) {
            assert_relative_eq!(*x, *y, max_relative = 1e-10);
        }
    }

    #[test]
    fn treanor_differs_out_of_equilibrium() {
        let p = provider();
        let b = p.compute(&conditions(517.0, 2641.0, 491.0, VibDistribution::Boltzmann)).unwrap();
        let t = p.compute(&conditions(517.0, 2641.0, 491.0, VibDistribution::Treanor)).unwrap();
        assert_ne!(b.get(Quantity::Abscoeff), t.get(Quantity::Abscoeff));
    }

    #[test]
    fn outputs_are_consistent() {
        let p = provider();
        let s = p.compute(&conditions(517.0, 2641.0, 491.0, VibDistribution::Treanor)).unwrap();
        assert_eq!(s.len(), 401);
        assert!(s.condition(CALCULATION_TIME).is_some());

        let k = s.get(Quantity::Abscoeff).unwrap();
        let a = s.get(Quantity::Absorbance).unwrap();
        let t = s.get(Quantity::TransmittanceNoslit).unwrap();
        let e = s.get(Quantity::EmissivityNoslit).unwrap();
        for i in 0..s.len() {
            assert_relative_eq!(a[i], k[i] * 10.0, max_relative = 1e-12);
            assert_relative_eq!(t[i], (-a[i]).exp(), max_relative = 1e-12);
            assert_relative_eq!(e[i] + t[i], 1.0, epsilon = 1e-12);
            assert!((0.0..=1.0).contains(&t[i]));
        }
        // Lines are resolved: some absorption, not saturated everywhere.
        let tmin = t.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(tmin < 0.95);
        assert!(t.iter().any(|v| *v > 0.99));
    }

    #[test]
    fn invalid_or_empty_input_fails() {
        let p = provider();
        let mut bad = conditions(517.0, 2641.0, 491.0, VibDistribution::Treanor);
        bad.temperatures[0] = -1.0;
        assert!(matches!(p.compute(&bad), Err(EvalError::InvalidParameter(_))));

        let far = SpectralWindow { wavenum_min: 2300.0, wavenum_max: 2300.1, wstep: 0.001 };
        let empty = LineListProvider::new(p.lines().to_vec(), far, CO2_MOLAR_MASS).unwrap();
        let c = conditions(517.0, 2641.0, 491.0, VibDistribution::Treanor);
        assert!(matches!(empty.compute(&c), Err(EvalError::ProviderComputation(_))));
    }
}
