//! Bounded minimizers on top of `argmin`.
//!
//! Solvers only see an [`Objective`]; they never know about spectra. Every trial
//! point is clamped into the bounds before it is evaluated, and a failed
//! evaluation is handed to argmin as `+inf`, so the solver moves away from it
//! without retrying it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use argmin::core::{CostFunction, Gradient, TerminationReason, TerminationStatus};

use crate::domain::{Bounds, Method};
use crate::error::EvalError;

pub mod lbfgs;
pub mod nelder_mead;

pub use lbfgs::Lbfgs;
pub use nelder_mead::NelderMead;

/// Message used when the iteration budget runs out.
pub const MAX_ITERATIONS_MESSAGE: &str = "Max iterations reached";

/// Something a solver can evaluate.
pub trait Objective {
    fn evaluate(&mut self, x: &[f64]) -> Result<f64, EvalError>;
}

impl<F> Objective for F
where
    F: FnMut(&[f64]) -> Result<f64, EvalError>,
{
    fn evaluate(&mut self, x: &[f64]) -> Result<f64, EvalError> {
        self(x)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverResult {
    pub success: bool,
    /// Final point of the solver (not necessarily the best evaluation seen).
    pub x: Vec<f64>,
    pub fun: f64,
    pub nfev: usize,
    pub nit: usize,
    pub message: String,
}

pub trait Solver {
    fn name(&self) -> &'static str;

    fn minimize(&mut self, objective: &mut dyn Objective, x0: &[f64], bounds: &[Bounds]) -> SolverResult;
}

/// Tuning shared by the built-in solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Objective value at which any solver stops successfully.
    pub target_cost: f64,
    /// Nelder-Mead: stop once the standard deviation of the simplex costs is below this.
    pub sd_tolerance: f64,
    /// Nelder-Mead: initial simplex edge, as a fraction of bound width.
    pub initial_step: f64,
    /// L-BFGS: gradient norm tolerance.
    pub gtol: f64,
    /// L-BFGS: cost change tolerance.
    pub ftol: f64,
    /// L-BFGS: stored correction pairs.
    pub memory: usize,
    /// Finite-difference step in parameter units (L-BFGS gradients).
    pub fd_eps: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            target_cost: 0.0,
            sd_tolerance: 1e-8,
            initial_step: 0.25,
            gtol: 1e-8,
            ftol: 1e-12,
            memory: 7,
            fd_eps: 20.0,
        }
    }
}

pub fn build_solver(method: Method, options: SolverOptions) -> Box<dyn Solver> {
    match method {
        Method::NelderMead => Box::new(NelderMead::new(options)),
        Method::Lbfgs => Box::new(Lbfgs::new(options)),
    }
}

pub(crate) fn clamp_to_bounds(x: &[f64], bounds: &[Bounds]) -> Vec<f64> {
    x.iter().zip(bounds).map(|(v, b)| b.clamp(*v)).collect()
}

/// Evaluation count and best point, readable after argmin has consumed the problem.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    nfev: Cell<usize>,
    best: RefCell<Option<(Vec<f64>, f64)>>,
}

impl Tally {
    pub(crate) fn nfev(&self) -> usize {
        self.nfev.get()
    }

    pub(crate) fn best(&self) -> Option<(Vec<f64>, f64)> {
        self.best.borrow().clone()
    }
}

/// argmin problem around an [`Objective`]: clamps, counts, and maps failures to `+inf`.
pub(crate) struct Counted<'a> {
    objective: RefCell<&'a mut dyn Objective>,
    bounds: &'a [Bounds],
    fd_eps: f64,
    tally: Rc<Tally>,
}

impl<'a> Counted<'a> {
    pub(crate) fn new(objective: &'a mut dyn Objective, bounds: &'a [Bounds], fd_eps: f64) -> Self {
        Self {
            objective: RefCell::new(objective),
            bounds,
            fd_eps,
            tally: Rc::new(Tally::default()),
        }
    }

    pub(crate) fn tally(&self) -> Rc<Tally> {
        Rc::clone(&self.tally)
    }

    pub(crate) fn eval(&self, x: &[f64]) -> f64 {
        let x = clamp_to_bounds(x, self.bounds);
        self.tally.nfev.set(self.tally.nfev.get() + 1);
        let value = match self.objective.borrow_mut().evaluate(&x) {
            Ok(v) if v.is_finite() => v,
            _ => f64::INFINITY,
        };
        let mut best = self.tally.best.borrow_mut();
        if best.as_ref().is_none_or(|(_, b)| value < *b) {
            *best = Some((x, value));
        }
        value
    }
}

impl CostFunction for Counted<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.eval(param))
    }
}

impl Gradient for Counted<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// Central differences at the clamped point, one-sided at a bound.
    ///
    /// Components pushing out of the box are zeroed; a component whose samples
    /// failed is zero as well.
    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let x = clamp_to_bounds(param, self.bounds);
        let mut g = vec![0.0; x.len()];
        for (i, b) in self.bounds.iter().enumerate() {
            let h = self.fd_eps.min(b.width() / 4.0);
            if h <= 0.0 {
                continue;
            }
            let hi = (x[i] + h).min(b.max);
            let lo = (x[i] - h).max(b.min);
            let mut plus = x.clone();
            plus[i] = hi;
            let mut minus = x.clone();
            minus[i] = lo;
            let d = (self.eval(&plus) - self.eval(&minus)) / (hi - lo);
            g[i] = if d.is_finite() { d } else { 0.0 };

            if (x[i] <= b.min && g[i] > 0.0) || (x[i] >= b.max && g[i] < 0.0) {
                g[i] = 0.0;
            }
        }
        Ok(g)
    }
}

/// Translate argmin's termination into `(success, message)`.
pub(crate) fn termination(status: &TerminationStatus, converged: &str) -> (bool, String) {
    match status {
        TerminationStatus::Terminated(TerminationReason::SolverConverged) => (true, converged.to_string()),
        TerminationStatus::Terminated(TerminationReason::TargetCostReached) => {
            (true, "Objective reached target cost".to_string())
        }
        TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
            (false, MAX_ITERATIONS_MESSAGE.to_string())
        }
        other => (false, other.to_string()),
    }
}

/// Result when argmin itself returned an error.
pub(crate) fn aborted(tally: &Tally, x0: &[f64], bounds: &[Bounds], error: argmin::core::Error) -> SolverResult {
    let (x, fun) = tally
        .best()
        .unwrap_or_else(|| (clamp_to_bounds(x0, bounds), f64::INFINITY));
    SolverResult {
        success: false,
        x,
        fun,
        nfev: tally.nfev(),
        nit: 0,
        message: format!("Solver error: {error}"),
    }
}
