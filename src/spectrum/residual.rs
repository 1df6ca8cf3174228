//! Residual between two spectra sampled on the same axis.

use serde::{Deserialize, Serialize};

use crate::domain::Quantity;
use crate::error::EvalError;

use super::{Spectrum, same_grid};

/// How NaN samples are handled when comparing spectra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NanPolicy {
    /// Skip points where either spectrum is NaN.
    #[default]
    Ignore,
    /// Any NaN makes the residual fail.
    Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Norm {
    /// `sqrt(Σ d²) / n`
    #[default]
    L2,
    /// `Σ |d| / n`
    L1,
}

/// Scalar misfit of `model` against `reference` for one quantity.
///
/// Both spectra must share the same axis; `n` counts the points that took part
/// in the comparison.
pub fn get_residual(
    model: &Spectrum,
    reference: &Spectrum,
    quantity: Quantity,
    nan_policy: NanPolicy,
    norm: Norm,
) -> Result<f64, EvalError> {
    let a = model
        .get(quantity)
        .ok_or_else(|| EvalError::Residual(format!("model spectrum has no {quantity}")))?;
    let b = reference
        .get(quantity)
        .ok_or_else(|| EvalError::Residual(format!("reference spectrum has no {quantity}")))?;

    if model.waveunit() != reference.waveunit()
        || !same_grid(model.wavespace(), reference.wavespace())
    {
        return Err(EvalError::Residual(
            "model and reference are not on the same axis".to_string(),
        ));
    }

    let mut n = 0usize;
    let mut acc = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        if x.is_nan() || y.is_nan() {
            match nan_policy {
                NanPolicy::Ignore => continue,
                NanPolicy::Propagate => {
                    return Err(EvalError::Residual("NaN sample in comparison".to_string()));
                }
            }
        }
        let d = x - y;
        acc += match norm {
            Norm::L2 => d * d,
            Norm::L1 => d.abs(),
        };
        n += 1;
    }

    if n == 0 {
        return Err(EvalError::Residual("no comparable points".to_string()));
    }
    let value = match norm {
        Norm::L2 => acc.sqrt() / n as f64,
        Norm::L1 => acc / n as f64,
    };
    if !value.is_finite() {
        return Err(EvalError::Residual(format!("non-finite residual {value}")));
    }
    Ok(value)
}
