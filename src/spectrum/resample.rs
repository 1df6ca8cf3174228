//! Resampling onto a target axis, with an energy-conservation check.

use crate::domain::{Quantity, WaveUnit};
use crate::error::EvalError;
use crate::math::{ascending, integrate_between, interp_linear, is_strictly_monotonic, trapz};

use super::Spectrum;

impl Spectrum {
    /// Resample every quantity onto `target` (expressed in `target_unit`).
    ///
    /// Target points outside the source axis become NaN. When `energy_threshold`
    /// is set, each quantity's integral over the covered range must survive the
    /// resampling within that relative tolerance.
    pub fn resample(
        &self,
        target: &[f64],
        target_unit: WaveUnit,
        energy_threshold: Option<f64>,
    ) -> Result<Spectrum, EvalError> {
        if target.is_empty() || !is_strictly_monotonic(target) {
            return Err(EvalError::ProviderComputation(
                "resample target axis must be non-empty and strictly monotonic".to_string(),
            ));
        }

        // Target coordinates in the source unit.
        let mapped: Vec<f64> = target
            .iter()
            .map(|&w| target_unit.convert(w, self.waveunit()))
            .collect();

        let mut out = Spectrum::new(target.to_vec(), target_unit)
            .map_err(EvalError::ProviderComputation)?;
        if let Some(name) = self.name() {
            out = out.with_name(name);
        }
        for (key, value) in &self.conditions {
            out = out.with_condition(key.clone(), *value);
        }

        for quantity in self.quantities().collect::<Vec<_>>() {
            let Some(values) = self.get(quantity) else {
                continue;
            };
            let (sx, sy) = ascending(self.wavespace(), values);
            let resampled: Vec<f64> = mapped.iter().map(|&w| interp_linear(&sx, &sy, w)).collect();

            if let Some(threshold) = energy_threshold {
                check_energy(quantity, &sx, &sy, &mapped, &resampled, threshold)?;
            }

            let unit = self.unit(quantity).unwrap_or_default().to_string();
            out = out
                .with_quantity(quantity, resampled, unit)
                .map_err(EvalError::ProviderComputation)?;
        }
        Ok(out)
    }
}

/// Relative difference between the source integral and the resampled integral,
/// both taken over the span of in-range target points.
pub fn energy_loss(sx: &[f64], sy: &[f64], mapped: &[f64], resampled: &[f64]) -> Option<f64> {
    let (tx, ty) = ascending(mapped, resampled);
    let covered: Vec<f64> = tx
        .iter()
        .zip(&ty)
        .filter(|(_, y)| y.is_finite())
        .map(|(x, _)| *x)
        .collect();
    let (first, last) = match (covered.first(), covered.last()) {
        (Some(a), Some(b)) => (*a, *b),
        _ => return Some(1.0),
    };

    let source = integrate_between(sx, sy, first, last);
    if source.abs() <= f64::MIN_POSITIVE {
        return None;
    }
    let target = trapz(&tx, &ty);
    Some(((target - source) / source).abs())
}

fn check_energy(
    quantity: Quantity,
    sx: &[f64],
    sy: &[f64],
    mapped: &[f64],
    resampled: &[f64],
    threshold: f64,
) -> Result<(), EvalError> {
    match energy_loss(sx, sy, mapped, resampled) {
        Some(loss) if loss > threshold => Err(EvalError::ResampleEnergyLoss {
            quantity: quantity.to_string(),
            loss,
            threshold,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> Spectrum {
        let x: Vec<f64> = (0..=40).map(|i| 2284.2 + i as f64 * 0.01).collect();
        let y: Vec<f64> = x.iter().map(|w| 1.0 - (w - 2284.4).abs() * 2.0).collect();
        Spectrum::new(x, WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Quantity::TransmittanceNoslit, y, "")
            .unwrap()
    }

    #[test]
    fn identical_grid_is_lossless() {
        let s = triangle();
        let grid = s.wavespace().to_vec();
        let r = s.resample(&grid, WaveUnit::Cm1, Some(1e-12)).unwrap();
        assert_eq!(r.get(Quantity::TransmittanceNoslit), s.get(Quantity::TransmittanceNoslit));
    }

    #[test]
    fn out_of_range_points_are_nan() {
        let s = triangle();
        let target = [2284.1, 2284.3, 2284.7];
        let r = s.resample(&target, WaveUnit::Cm1, None).unwrap();
        let y = r.get(Quantity::TransmittanceNoslit).unwrap();
        assert!(y[0].is_nan());
        assert_relative_eq!(y[1], 0.8, epsilon = 1e-9);
        assert!(y[2].is_nan());
    }

    #[test]
    fn coarse_grid_over_peak_trips_energy_check() {
        // A narrow spike sampled by two points either side of it vanishes.
        let x: Vec<f64> = (0..=40).map(|i| i as f64 * 0.01).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|w| if (w - 0.2f64).abs() < 0.005 { 100.0 } else { 0.0 })
            .collect();
        let s = Spectrum::new(x, WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Quantity::Absorbance, y, "")
            .unwrap();
        let err = s.resample(&[0.0, 0.15, 0.4], WaveUnit::Cm1, Some(2e-2)).unwrap_err();
        assert!(matches!(err, EvalError::ResampleEnergyLoss { .. }));
        // Without a threshold the same call succeeds.
        assert!(s.resample(&[0.0, 0.15, 0.4], WaveUnit::Cm1, None).is_ok());
    }

    #[test]
    fn target_in_other_unit_is_converted() {
        let s = triangle();
        let nm: Vec<f64> = [2284.3, 2284.4].iter().map(|w| 1e7 / w).collect();
        let r = s.resample(&nm, WaveUnit::Nm, None).unwrap();
        assert_eq!(r.waveunit(), WaveUnit::Nm);
        let y = r.get(Quantity::TransmittanceNoslit).unwrap();
        assert_relative_eq!(y[0], 0.8, epsilon = 1e-6);
        assert_relative_eq!(y[1], 1.0, epsilon = 1e-6);
    }
}
