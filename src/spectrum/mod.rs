//! Sampled spectra.
//!
//! A [`Spectrum`] is a strictly monotonic wavespace axis plus one or more named
//! quantities sampled on it. Spectra are treated as values: operations return new
//! spectra, except [`Spectrum::retain_only`] which drops quantities a caller no
//! longer needs.

use std::collections::BTreeMap;

use crate::domain::{Quantity, WaveUnit};
use crate::math::{ascending, is_strictly_monotonic, trapz};

pub mod resample;
pub mod residual;
pub mod slabs;

pub use residual::{NanPolicy, Norm, get_residual};
pub use slabs::serial_slabs;

/// Condition key for the wall-clock computation time (s).
pub const CALCULATION_TIME: &str = "calculation_time";

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    name: Option<String>,
    wavespace: Vec<f64>,
    waveunit: WaveUnit,
    quantities: BTreeMap<Quantity, Vec<f64>>,
    units: BTreeMap<Quantity, String>,
    conditions: BTreeMap<String, f64>,
}

impl Spectrum {
    /// Create an empty spectrum on a validated axis.
    pub fn new(wavespace: Vec<f64>, waveunit: WaveUnit) -> Result<Self, String> {
        if wavespace.is_empty() {
            return Err("spectrum axis is empty".to_string());
        }
        if !is_strictly_monotonic(&wavespace) {
            return Err("spectrum axis must be finite and strictly monotonic".to_string());
        }
        Ok(Self {
            name: None,
            wavespace,
            waveunit,
            quantities: BTreeMap::new(),
            units: BTreeMap::new(),
            conditions: BTreeMap::new(),
        })
    }

    /// Attach a quantity sampled on the axis.
    pub fn with_quantity(
        mut self,
        quantity: Quantity,
        values: Vec<f64>,
        unit: impl Into<String>,
    ) -> Result<Self, String> {
        if values.len() != self.wavespace.len() {
            return Err(format!(
                "{quantity} has {} values but the axis has {}",
                values.len(),
                self.wavespace.len()
            ));
        }
        self.quantities.insert(quantity, values);
        self.units.insert(quantity, unit.into());
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: f64) -> Self {
        self.conditions.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn wavespace(&self) -> &[f64] {
        &self.wavespace
    }

    pub fn waveunit(&self) -> WaveUnit {
        self.waveunit
    }

    pub fn len(&self) -> usize {
        self.wavespace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavespace.is_empty()
    }

    pub fn get(&self, quantity: Quantity) -> Option<&[f64]> {
        self.quantities.get(&quantity).map(Vec::as_slice)
    }

    pub fn unit(&self, quantity: Quantity) -> Option<&str> {
        self.units.get(&quantity).map(String::as_str)
    }

    pub fn has(&self, quantity: Quantity) -> bool {
        self.quantities.contains_key(&quantity)
    }

    pub fn quantities(&self) -> impl Iterator<Item = Quantity> + '_ {
        self.quantities.keys().copied()
    }

    pub fn condition(&self, key: &str) -> Option<f64> {
        self.conditions.get(key).copied()
    }

    /// `(x, y)` pairs of one quantity, in axis order.
    pub fn points(&self, quantity: Quantity) -> Vec<(f64, f64)> {
        self.get(quantity)
            .map(|values| self.wavespace.iter().copied().zip(values.iter().copied()).collect())
            .unwrap_or_default()
    }

    /// Drop every quantity except `quantity`. Returns whether it was present.
    pub fn retain_only(&mut self, quantity: Quantity) -> bool {
        self.quantities.retain(|q, _| *q == quantity);
        self.units.retain(|q, _| *q == quantity);
        self.quantities.contains_key(&quantity)
    }

    /// Keep axis points inside `[min, max]` (in the spectrum's own unit).
    pub fn crop(&self, min: f64, max: f64) -> Result<Spectrum, String> {
        let keep: Vec<usize> = self
            .wavespace
            .iter()
            .enumerate()
            .filter(|(_, w)| **w >= min && **w <= max)
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(format!("crop [{min}, {max}] leaves no points"));
        }

        let mut out = self.clone();
        out.wavespace = keep.iter().map(|&i| self.wavespace[i]).collect();
        for (q, values) in out.quantities.iter_mut() {
            let src = &self.quantities[q];
            *values = keep.iter().map(|&i| src[i]).collect();
        }
        Ok(out)
    }

    /// Absolute trapezoidal integral of a quantity over the axis.
    pub fn integral(&self, quantity: Quantity) -> Option<f64> {
        let values = self.get(quantity)?;
        let (x, y) = ascending(&self.wavespace, values);
        Some(trapz(&x, &y).abs())
    }

    /// Same samples, axis expressed in another unit.
    ///
    /// Values are not rescaled, which is exact for dimensionless quantities
    /// (transmittance, absorbance, emissivity) only.
    pub fn to_waveunit(&self, unit: WaveUnit) -> Spectrum {
        let mut out = self.clone();
        out.wavespace = self
            .wavespace
            .iter()
            .map(|&w| self.waveunit.convert(w, unit))
            .collect();
        out.waveunit = unit;
        out
    }
}

/// Whether two axes hold the same coordinates (relative tolerance 1e-9).
pub fn same_grid(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Spectrum {
        Spectrum::new(vec![1.0, 2.0, 3.0, 4.0], WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Quantity::TransmittanceNoslit, vec![1.0, 0.5, 0.5, 1.0], "")
            .unwrap()
            .with_quantity(Quantity::Absorbance, vec![0.0, 0.7, 0.7, 0.0], "")
            .unwrap()
    }

    #[test]
    fn new_rejects_non_monotonic_axis() {
        assert!(Spectrum::new(vec![1.0, 3.0, 2.0], WaveUnit::Cm1).is_err());
        assert!(Spectrum::new(vec![], WaveUnit::Cm1).is_err());
    }

    #[test]
    fn with_quantity_checks_length() {
        let s = Spectrum::new(vec![1.0, 2.0], WaveUnit::Cm1).unwrap();
        assert!(s.with_quantity(Quantity::Absorbance, vec![1.0], "").is_err());
    }

    #[test]
    fn retain_only_discards_other_quantities() {
        let mut s = sample();
        assert!(s.retain_only(Quantity::TransmittanceNoslit));
        assert_eq!(s.quantities().collect::<Vec<_>>(), vec![Quantity::TransmittanceNoslit]);
        assert!(!s.retain_only(Quantity::Abscoeff));
        assert_eq!(s.quantities().count(), 0);
    }

    #[test]
    fn crop_keeps_inclusive_range() {
        let s = sample().crop(2.0, 3.0).unwrap();
        assert_eq!(s.wavespace(), &[2.0, 3.0]);
        assert_eq!(s.get(Quantity::Absorbance).unwrap(), &[0.7, 0.7]);
        assert!(sample().crop(10.0, 20.0).is_err());
    }

    #[test]
    fn integral_is_direction_independent() {
        let fwd = sample();
        let rev = Spectrum::new(vec![4.0, 3.0, 2.0, 1.0], WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Quantity::TransmittanceNoslit, vec![1.0, 0.5, 0.5, 1.0], "")
            .unwrap();
        assert_eq!(
            fwd.integral(Quantity::TransmittanceNoslit),
            rev.integral(Quantity::TransmittanceNoslit)
        );
    }
}
