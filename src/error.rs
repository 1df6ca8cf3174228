//! Error types.
//!
//! Two layers:
//!
//! - [`EvalError`]: failures local to a single cost-function evaluation. They are
//!   recorded in the fit history and never abort a fit on their own.
//! - [`AppError`]: application-level failures carrying a process exit code.
//!
//! Exit codes:
//! - `2`: invalid input or configuration (CLI values, unreadable/malformed files)
//! - `3`: fit finished without converging (only with `--strict`)
//! - `4`: fatal runtime failure (no successful evaluation, terminal/IO errors)

use thiserror::Error;

/// Why a single evaluation did not produce a residual.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A parameter lies outside its declared bounds or outside the provider's
    /// physically valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Resampling lost more signal than allowed.
    #[error("resampling {quantity} lost a fraction {loss:.4} of its energy (threshold {threshold:.4})")]
    ResampleEnergyLoss {
        quantity: String,
        loss: f64,
        threshold: f64,
    },

    /// The provider could not produce a spectrum for these inputs.
    #[error("spectrum computation failed: {0}")]
    ProviderComputation(String),

    /// The residual could not be computed (grid mismatch, no comparable points, ...).
    #[error("residual failed: {0}")]
    Residual(String),
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<EvalError> for AppError {
    fn from(err: EvalError) -> Self {
        AppError::new(4, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
