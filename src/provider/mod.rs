//! Spectrum providers.
//!
//! A provider turns one set of [`ModelConditions`] into a computed [`Spectrum`].
//! The fit driver only depends on the [`SpectrumProvider`] trait; the built-in
//! implementation is a small line-by-line band model (see [`linelist`]).

use crate::domain::ModelConditions;
use crate::error::EvalError;
use crate::spectrum::Spectrum;

pub mod linelist;

pub use linelist::{Line, LineListProvider};

/// Computes a spectrum for the given conditions.
pub trait SpectrumProvider {
    fn compute(&self, conditions: &ModelConditions) -> Result<Spectrum, EvalError>;
}

impl<F> SpectrumProvider for F
where
    F: Fn(&ModelConditions) -> Result<Spectrum, EvalError>,
{
    fn compute(&self, conditions: &ModelConditions) -> Result<Spectrum, EvalError> {
        self(conditions)
    }
}

/// Reject conditions no provider can work with.
pub fn validate_conditions(conditions: &ModelConditions) -> Result<(), EvalError> {
    for (i, t) in conditions.temperatures.iter().enumerate() {
        if !(t.is_finite() && *t > 0.0) {
            let name = crate::domain::FreeParam::ALL[i].name();
            return Err(EvalError::InvalidParameter(format!("{name} must be > 0 K (got {t})")));
        }
    }
    if !(conditions.pressure_bar.is_finite() && conditions.pressure_bar > 0.0) {
        return Err(EvalError::InvalidParameter(format!(
            "pressure must be > 0 bar (got {})",
            conditions.pressure_bar
        )));
    }
    if !(conditions.path_length_cm.is_finite() && conditions.path_length_cm > 0.0) {
        return Err(EvalError::InvalidParameter(format!(
            "path length must be > 0 cm (got {})",
            conditions.path_length_cm
        )));
    }
    if !(conditions.mole_fraction > 0.0 && conditions.mole_fraction <= 1.0) {
        return Err(EvalError::InvalidParameter(format!(
            "mole fraction must be in (0, 1] (got {})",
            conditions.mole_fraction
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_non_physical_inputs() {
        let ok = ModelConditions::isothermal(300.0, 0.02, 10.0, 0.1);
        assert!(validate_conditions(&ok).is_ok());

        let mut cold = ok;
        cold.temperatures[2] = 0.0;
        let err = validate_conditions(&cold).unwrap_err();
        assert_eq!(err.to_string(), "invalid parameter: Trot must be > 0 K (got 0)");

        let mut rich = ok;
        rich.mole_fraction = 1.5;
        assert!(matches!(validate_conditions(&rich), Err(EvalError::InvalidParameter(_))));
    }
}
