//! L-BFGS with a More-Thuente line search (argmin) on projected finite-difference
//! gradients.
//!
//! Each gradient costs `2n` evaluations with step `min(fd_eps, width / 4)`.
//! Bounds are handled by clamping inside the problem and zeroing gradient
//! components that point out of the box.

use argmin::core::{Executor, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use log::trace;

use crate::domain::Bounds;

use super::{Counted, Objective, Solver, SolverOptions, SolverResult, aborted, clamp_to_bounds, termination};

pub struct Lbfgs {
    options: SolverOptions,
}

impl Lbfgs {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }
}

impl Solver for Lbfgs {
    fn name(&self) -> &'static str {
        "lbfgs"
    }

    fn minimize(&mut self, objective: &mut dyn Objective, x0: &[f64], bounds: &[Bounds]) -> SolverResult {
        let opts = self.options;
        let problem = Counted::new(objective, bounds, opts.fd_eps);
        let tally = problem.tally();

        let linesearch: MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64> = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, opts.memory.max(1))
            .with_tolerance_grad(opts.gtol)
            .and_then(|s| s.with_tolerance_cost(opts.ftol));
        let solver = match solver {
            Ok(solver) => solver,
            Err(e) => return aborted(&tally, x0, bounds, e),
        };

        let start = clamp_to_bounds(x0, bounds);
        let run = Executor::new(problem, solver)
            .configure(|state| {
                state
                    .param(start)
                    .max_iters(opts.max_iterations as u64)
                    .target_cost(opts.target_cost)
            })
            .run();

        let res = match run {
            Ok(res) => res,
            Err(e) => return aborted(&tally, x0, bounds, e),
        };
        let state = res.state();
        let (success, message) = termination(state.get_termination_status(), "Gradient or cost change below tolerance");
        let x = state
            .get_best_param()
            .map(|p| clamp_to_bounds(p, bounds))
            .unwrap_or_else(|| clamp_to_bounds(x0, bounds));
        trace!("lbfgs: {message} after {} iterations", state.get_iter());

        SolverResult {
            success,
            x,
            fun: state.get_best_cost(),
            nfev: tally.nfev(),
            nit: state.get_iter() as usize,
            message,
        }
    }
}
