//! Nelder-Mead simplex search (argmin), clamped into the bounds.
//!
//! The initial simplex is `x0` plus one vertex per coordinate, offset by
//! `initial_step * width` (towards the interior when the upper side has no room).

use argmin::core::{Executor, State};
use argmin::solver::neldermead::NelderMead as ArgminNelderMead;
use log::trace;

use crate::domain::Bounds;

use super::{Counted, Objective, Solver, SolverOptions, SolverResult, aborted, clamp_to_bounds, termination};

pub struct NelderMead {
    options: SolverOptions,
}

impl NelderMead {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    fn simplex(&self, x0: &[f64], bounds: &[Bounds]) -> Vec<Vec<f64>> {
        let start = clamp_to_bounds(x0, bounds);
        let mut vertices = vec![start.clone()];
        for (i, b) in bounds.iter().enumerate() {
            let step = self.options.initial_step * b.width();
            let mut v = start.clone();
            v[i] = if v[i] + step <= b.max { v[i] + step } else { v[i] - step };
            vertices.push(v);
        }
        vertices
    }
}

impl Solver for NelderMead {
    fn name(&self) -> &'static str {
        "nelder-mead"
    }

    fn minimize(&mut self, objective: &mut dyn Objective, x0: &[f64], bounds: &[Bounds]) -> SolverResult {
        let opts = self.options;
        let problem = Counted::new(objective, bounds, opts.fd_eps);
        let tally = problem.tally();

        let solver = match ArgminNelderMead::new(self.simplex(x0, bounds)).with_sd_tolerance(opts.sd_tolerance) {
            Ok(solver) => solver,
            Err(e) => return aborted(&tally, x0, bounds, e),
        };
        let run = Executor::new(problem, solver)
            .configure(|state| state.max_iters(opts.max_iterations as u64).target_cost(opts.target_cost))
            .run();

        let res = match run {
            Ok(res) => res,
            Err(e) => return aborted(&tally, x0, bounds, e),
        };
        let state = res.state();
        let (success, message) = termination(state.get_termination_status(), "Simplex cost spread below sd_tolerance");
        let x = state
            .get_best_param()
            .map(|p| clamp_to_bounds(p, bounds))
            .unwrap_or_else(|| clamp_to_bounds(x0, bounds));
        trace!("nelder-mead: {message} after {} iterations", state.get_iter());

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
