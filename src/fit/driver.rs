//! The fit loop: boundary probes, then a bounded solver run.
//!
//! Every cost evaluation goes through [`FitDriver::evaluate`], which appends to
//! the history before returning. The reported best point is always taken from
//! that history, never from the solver's final point.

use log::{debug, info, warn};

use crate::domain::{
    Bounds, FitParameter, FitResult, FitState, Method, ModelConditions, ParameterVector,
    ProbeAccounting, Quantity,
};
use crate::error::EvalError;
use crate::provider::SpectrumProvider;
use crate::report::ProgressReporter;
use crate::spectrum::{NanPolicy, Norm, Spectrum, get_residual};

use super::history::FitHistory;
use super::solver::{Objective, SolverOptions, build_solver};

/// Iteration number of the second boundary probe; solver evaluations follow it.
pub const PROBE_ITERATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub method: Method,
    pub solver: SolverOptions,
    /// Request a comparison plot every N solver evaluations (0 disables).
    pub plot_every: usize,
    /// Maximum relative energy loss allowed when resampling (`None` skips the check).
    pub energy_threshold: Option<f64>,
    pub probe_accounting: ProbeAccounting,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: Method::NelderMead,
            solver: SolverOptions::default(),
            plot_every: 1,
            energy_threshold: Some(2e-2),
            probe_accounting: ProbeAccounting::Counted,
        }
    }
}

pub struct FitDriver<'a> {
    provider: &'a dyn SpectrumProvider,
    reference: &'a Spectrum,
    quantity: Quantity,
    parameters: Vec<FitParameter>,
    base: ModelConditions,
    options: FitOptions,
    state: FitState,
    history: FitHistory,
    iteration: usize,
}

impl<'a> FitDriver<'a> {
    pub fn new(
        provider: &'a dyn SpectrumProvider,
        reference: &'a Spectrum,
        quantity: Quantity,
        parameters: Vec<FitParameter>,
        base: ModelConditions,
        options: FitOptions,
    ) -> Self {
        Self {
            provider,
            reference,
            quantity,
            parameters,
            base,
            options,
            state: FitState::Uninitialized,
            history: FitHistory::new(),
            iteration: 0,
        }
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn history(&self) -> &FitHistory {
        &self.history
    }

    pub fn parameters(&self) -> &[FitParameter] {
        &self.parameters
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Model conditions for a parameter vector (bounds are not checked here).
    pub fn conditions_for(&self, values: &ParameterVector) -> ModelConditions {
        self.base.merged(&self.parameters, values)
    }

    /// Residual of the model at `values` against the reference.
    ///
    /// When `plot` is given, the computed spectrum is handed to it before
    /// resampling; this never changes the returned value.
    pub fn cost(
        &self,
        values: &ParameterVector,
        plot: Option<&mut dyn ProgressReporter>,
    ) -> Result<f64, EvalError> {
        self.check_bounds(values)?;
        let conditions = self.conditions_for(values);

        let mut spectrum = self.provider.compute(&conditions)?;
        if !spectrum.retain_only(self.quantity) {
            return Err(EvalError::ProviderComputation(format!(
                "provider did not produce {}",
                self.quantity
            )));
        }

        if let Some(reporter) = plot {
            let title = values.display_with(&self.parameters);
            reporter.on_spectrum(&spectrum, self.reference, self.quantity, &title);
        }

        let resampled = spectrum.resample(
            self.reference.wavespace(),
            self.reference.waveunit(),
            self.options.energy_threshold,
        )?;
        get_residual(&resampled, self.reference, self.quantity, NanPolicy::Ignore, Norm::L2)
    }

    /// [`Self::cost`], recorded in the history whatever the outcome.
    pub fn evaluate(
        &mut self,
        values: ParameterVector,
        plot: Option<&mut dyn ProgressReporter>,
    ) -> Result<f64, EvalError> {
        let outcome = self.cost(&values, plot);
        if let Err(err) = &outcome {
            warn!("evaluation at {} failed: {err}", values.display_with(&self.parameters));
        }
        self.history.record(values, outcome).outcome.clone()
    }

    fn check_bounds(&self, values: &ParameterVector) -> Result<(), EvalError> {
        if values.len() != self.parameters.len() {
            return Err(EvalError::InvalidParameter(format!(
                "expected {} values, got {}",
                self.parameters.len(),
                values.len()
            )));
        }
        for (p, &v) in self.parameters.iter().zip(values.as_slice()) {
            if !v.is_finite() || !p.bounds.contains(v) {
                return Err(EvalError::InvalidParameter(format!(
                    "{}={v} outside [{}, {}]",
                    p.param, p.bounds.min, p.bounds.max
                )));
            }
        }
        Ok(())
    }

    /// One solver evaluation: advance the counter, evaluate, report.
    fn step(&mut self, x: &[f64], reporter: &mut dyn ProgressReporter) -> Result<f64, EvalError> {
        self.iteration += 1;
        let plot_every = self.options.plot_every;
        let wants_plot = plot_every > 0 && self.iteration % plot_every == 0;

        let values = ParameterVector::new(x.to_vec());
        let outcome = if wants_plot {
            self.evaluate(values, Some(&mut *reporter))
        } else {
            self.evaluate(values, None)
        };

        if let Some(entry) = self.history.last() {
            debug!("iteration {}: {:?}", self.iteration, entry.outcome);
            reporter.on_evaluation(self.iteration, &self.parameters, entry);
        }
        outcome
    }

    /// Run the whole fit and return its terminal snapshot.
    pub fn run(&mut self, reporter: &mut dyn ProgressReporter) -> FitResult {
        reporter.on_start(&self.parameters, self.reference);

        self.state = FitState::BoundaryProbe;
        info!("probing bounds of {} parameters", self.parameters.len());
        let lower = ParameterVector::lower(&self.parameters);
        let upper = ParameterVector::upper(&self.parameters);
        let _ = self.evaluate(lower, None);
        let _ = self.evaluate(upper, Some(&mut *reporter));
        self.iteration = PROBE_ITERATIONS;
        reporter.on_probes(&self.parameters, self.history.entries());

        if self.history.successes() == 0 {
            self.state = FitState::Failed;
            warn!("both boundary probes failed; not starting the optimizer");
            let result = self.finish(None, false, 0, 0, "Both boundary probes failed".to_string());
            reporter.on_finish(&self.parameters, &result, &self.history);
            return result;
        }

        self.state = FitState::Optimizing;
        let x0 = ParameterVector::midpoint(&self.parameters);
        let bounds: Vec<Bounds> = self.parameters.iter().map(|p| p.bounds).collect();
        let mut solver = build_solver(self.options.method, self.options.solver);
        info!(
            "optimizing with {} from {}",
            solver.name(),
            x0.display_with(&self.parameters)
        );

        let solved = {
            let mut objective = Tracked { driver: self, reporter: &mut *reporter };
            solver.minimize(&mut objective, x0.as_slice(), &bounds)
        };

        let success = solved.success && self.history.best().is_some();
        self.state = if success { FitState::Converged } else { FitState::Failed };
        info!("{} finished: {} ({} evaluations)", solver.name(), solved.message, solved.nfev);

        let result = self.finish(
            Some(ParameterVector::new(solved.x)),
            success,
            solved.nfev,
            solved.nit,
            solved.message,
        );
        reporter.on_finish(&self.parameters, &result, &self.history);
        result
    }

    fn finish(
        &self,
        solver_point: Option<ParameterVector>,
        success: bool,
        optimizer_evaluations: usize,
        iterations: usize,
        message: String,
    ) -> FitResult {
        let evaluations = match self.options.probe_accounting {
            ProbeAccounting::Counted => optimizer_evaluations + PROBE_ITERATIONS,
            ProbeAccounting::Excluded => optimizer_evaluations,
        };
        FitResult {
            best: self.history.best(),
            success,
            state: self.state,
            optimizer_evaluations,
            evaluations,
            iterations,
            solver_point,
            message,
        }
    }
}

/// Solver-facing view of the driver for one run.
struct Tracked<'d, 'a> {
    driver: &'d mut FitDriver<'a>,
    reporter: &'d mut dyn ProgressReporter,
}

impl Objective for Tracked<'_, '_> {
    fn evaluate(&mut self, x: &[f64]) -> Result<f64, EvalError> {
        self.driver.step(x, self.reporter)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::domain::{FreeParam, VibDistribution, WaveUnit};
    use crate::fit::solver::MAX_ITERATIONS_MESSAGE;
    use crate::report::NullReporter;

    const GRID: [f64; 2] = [2284.2, 2284.6];
    const Q: Quantity = Quantity::TransmittanceNoslit;

    fn parameters() -> Vec<FitParameter> {
        vec![
            FitParameter { param: FreeParam::T12, bounds: Bounds::new(300.0, 2000.0).unwrap() },
            FitParameter { param: FreeParam::T3, bounds: Bounds::new(300.0, 5000.0).unwrap() },
            FitParameter { param: FreeParam::Trot, bounds: Bounds::new(300.0, 2000.0).unwrap() },
        ]
    }

    fn base() -> ModelConditions {
        ModelConditions {
            pressure_bar: 20e-3,
            path_length_cm: 10.0,
            mole_fraction: 0.1 * 28.97 / 44.07,
            distribution: VibDistribution::Treanor,
            temperatures: [300.0; 3],
        }
    }

    fn flat(value: f64) -> Spectrum {
        Spectrum::new(GRID.to_vec(), WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Q, vec![value; GRID.len()], "")
            .unwrap()
    }

    /// Spectrum whose value is the L1 distance to (517, 2641, 491); against a zero
    /// reference the residual is that distance over sqrt(2).
    fn l1_stub(c: &ModelConditions) -> Result<Spectrum, EvalError> {
        let d = (c.get(FreeParam::T12) - 517.0).abs()
            + (c.get(FreeParam::T3) - 2641.0).abs()
            + (c.get(FreeParam::Trot) - 491.0).abs();
        Ok(flat(d))
    }

    /// Reporter that records what the driver told it.
    #[derive(Default)]
    struct Recorder {
        probes: usize,
        evaluations: Vec<usize>,
        spectra: Vec<String>,
        finished: bool,
    }

    impl ProgressReporter for Recorder {
        fn on_probes(&mut self, _: &[FitParameter], probes: &[crate::fit::HistoryEntry]) {
            self.probes = probes.len();
        }
        fn on_evaluation(&mut self, iteration: usize, _: &[FitParameter], _: &crate::fit::HistoryEntry) {
            self.evaluations.push(iteration);
        }
        fn on_spectrum(&mut self, _: &Spectrum, _: &Spectrum, _: Quantity, title: &str) {
            self.spectra.push(title.to_string());
        }
        fn on_finish(&mut self, _: &[FitParameter], _: &FitResult, _: &FitHistory) {
            self.finished = true;
        }
    }

    #[test]
    fn l1_scenario_converges_to_target() {
        let reference = flat(0.0);
        let provider = l1_stub;
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let result = driver.run(&mut NullReporter);

        assert!(result.success, "{}", result.message);
        assert_eq!(result.state, FitState::Converged);
        let best = result.best.unwrap();
        assert!(best.residual < 1e-2, "residual {}", best.residual);
        let v = best.values.as_slice();
        assert!((v[0] - 517.0).abs() < 0.01);
        assert!((v[1] - 2641.0).abs() < 0.01);
        assert!((v[2] - 491.0).abs() < 0.01);
        assert_eq!(best.values.display_with(driver.parameters()), "T12=517.0K,T3=2641.0K,Trot=491.0K");
    }

    #[test]
    fn history_has_probes_plus_solver_evaluations() {
        let reference = flat(0.0);
        let provider = l1_stub;
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let result = driver.run(&mut NullReporter);

        let history = driver.history();
        assert_eq!(history.len(), 2 + result.optimizer_evaluations);
        assert_eq!(result.evaluations, history.len());
        for (i, entry) in history.entries().iter().enumerate() {
            assert_eq!(entry.index, i);
        }
        assert_eq!(history.entries()[0].values, ParameterVector::lower(&parameters()));
        assert_eq!(history.entries()[1].values, ParameterVector::upper(&parameters()));
        assert_eq!(driver.iteration(), 2 + result.optimizer_evaluations);
    }

    #[test]
    fn best_is_history_minimum_with_earliest_tie() {
        let reference = flat(0.0);
        let provider = l1_stub;
        let opts = FitOptions {
            solver: SolverOptions { max_iterations: 5, ..SolverOptions::default() },
            ..FitOptions::default()
        };
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), opts);
        let result = driver.run(&mut NullReporter);
        let best = result.best.unwrap();

        let entries = driver.history().entries();
        let min = entries.iter().filter_map(|e| e.residual()).fold(f64::INFINITY, f64::min);
        let first = entries.iter().position(|e| e.residual() == Some(min)).unwrap();
        assert_eq!(best.residual, min);
        assert_eq!(best.history_index, first);
        assert!(!result.success);
        assert_eq!(result.message, MAX_ITERATIONS_MESSAGE);
        assert_eq!(result.state, FitState::Failed);
    }

    #[test]
    fn provider_only_sees_points_within_bounds() {
        let reference = flat(0.0);
        let seen = RefCell::new(Vec::new());
        let provider = |c: &ModelConditions| {
            seen.borrow_mut().push(c.temperatures);
            l1_stub(c)
        };
        let params = parameters();
        let mut driver = FitDriver::new(&provider, &reference, Q, params.clone(), base(), FitOptions::default());
        driver.run(&mut NullReporter);

        let seen = seen.borrow();
        assert!(!seen.is_empty());
        for temps in seen.iter() {
            for p in &params {
                assert!(p.bounds.contains(temps[p.param.index()]), "{temps:?}");
            }
        }
    }

    #[test]
    fn out_of_bounds_cost_never_reaches_provider() {
        let reference = flat(0.0);
        let calls = RefCell::new(0usize);
        let provider = |c: &ModelConditions| {
            *calls.borrow_mut() += 1;
            l1_stub(c)
        };
        let driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let err = driver
            .cost(&ParameterVector::new(vec![100.0, 1000.0, 1000.0]), None)
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidParameter(_)));
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn successful_residuals_are_finite_and_non_negative() {
        let reference = flat(0.0);
        let provider = l1_stub;
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        driver.run(&mut NullReporter);
        for r in driver.history().entries().iter().filter_map(|e| e.residual()) {
            assert!(r.is_finite() && r >= 0.0);
        }
    }

    #[test]
    fn own_grid_gives_zero_residual() {
        let reference = flat(0.25);
        let provider = |_: &ModelConditions| -> Result<Spectrum, EvalError> { Ok(flat(0.25)) };
        let driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let r = driver.cost(&ParameterVector::midpoint(&parameters()), None).unwrap();
        assert_eq!(r, 0.0);
    }

    #[test]
    fn failing_provider_fails_after_probes() {
        let reference = flat(0.0);
        let provider =
            |_: &ModelConditions| -> Result<Spectrum, EvalError> { Err(EvalError::ProviderComputation("down".into())) };
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let mut recorder = Recorder::default();
        let result = driver.run(&mut recorder);

        assert!(!result.success);
        assert!(result.best.is_none());
        assert_eq!(result.state, FitState::Failed);
        assert_eq!(driver.history().len(), 2);
        assert_eq!(result.optimizer_evaluations, 0);
        assert_eq!(recorder.probes, 2);
        assert!(recorder.evaluations.is_empty());
        assert!(recorder.finished);
    }

    #[test]
    fn missing_quantity_is_a_provider_error() {
        let reference = flat(0.0);
        let provider = |_: &ModelConditions| {
            Spectrum::new(GRID.to_vec(), WaveUnit::Cm1)
                .unwrap()
                .with_quantity(Quantity::Absorbance, vec![0.0; 2], "")
                .map_err(EvalError::ProviderComputation)
        };
        let driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let err = driver.cost(&ParameterVector::midpoint(&parameters()), None).unwrap_err();
        assert!(matches!(err, EvalError::ProviderComputation(_)));
    }

    #[test]
    fn reporter_sees_iterations_and_plots() {
        let reference = flat(0.0);
        let provider = l1_stub;
        let opts = FitOptions {
            plot_every: 2,
            solver: SolverOptions { max_iterations: 4, ..SolverOptions::default() },
            ..FitOptions::default()
        };
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), opts);
        let mut recorder = Recorder::default();
        let result = driver.run(&mut recorder);

        // Solver iterations are numbered from 3, right after the two probes.
        let expected: Vec<usize> = (3..3 + result.optimizer_evaluations).collect();
        assert_eq!(recorder.evaluations, expected);
        // One plot for the upper probe, then one per even iteration.
        let even = expected.iter().filter(|i| *i % 2 == 0).count();
        assert_eq!(recorder.spectra.len(), 1 + even);
        assert_eq!(recorder.spectra[0], "T12=2000.0K,T3=5000.0K,Trot=2000.0K");
    }

    /// Fine-grid spectrum with a level tracking Trot; hot conditions add a narrow
    /// spike at 2284.4 that a coarse reference grid cannot follow.
    fn spiky(c: &ModelConditions) -> Result<Spectrum, EvalError> {
        let trot = c.get(FreeParam::Trot);
        let x: Vec<f64> = (0..=60).map(|i| 2284.1 + f64::from(i) * 0.01).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|w| {
                let level = 0.5 + (trot - 491.0).abs() / 1000.0;
                if trot > 1500.0 && (w - 2284.4).abs() < 0.005 { level + 100.0 } else { level }
            })
            .collect();
        Spectrum::new(x, WaveUnit::Cm1)
            .and_then(|s| s.with_quantity(Q, y, ""))
            .map_err(EvalError::ProviderComputation)
    }

    fn coarse_reference() -> Spectrum {
        Spectrum::new(vec![2284.2, 2284.35, 2284.5], WaveUnit::Cm1)
            .unwrap()
            .with_quantity(Q, vec![0.5; 3], "")
            .unwrap()
    }

    #[test]
    fn energy_loss_fails_only_that_evaluation() {
        let reference = coarse_reference();
        let provider = spiky;
        let hot = ParameterVector::upper(&parameters());
        let cool = ParameterVector::lower(&parameters());

        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let err = driver.cost(&hot, None).unwrap_err();
        assert!(matches!(err, EvalError::ResampleEnergyLoss { .. }), "{err}");
        assert!(driver.cost(&cool, None).is_ok());

        assert!(driver.evaluate(hot, None).is_err());
        let entry = driver.history().last().unwrap();
        assert!(matches!(entry.outcome, Err(EvalError::ResampleEnergyLoss { .. })));
        assert!(driver.evaluate(cool, None).is_ok());
        assert_eq!(driver.history().len(), 2);
    }

    #[test]
    fn run_continues_past_energy_loss() {
        let reference = coarse_reference();
        let provider = spiky;
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), FitOptions::default());
        let result = driver.run(&mut NullReporter);

        let entries = driver.history().entries();
        assert!(matches!(entries[1].outcome, Err(EvalError::ResampleEnergyLoss { .. })));
        assert!(entries.len() > 2);
        assert!(matches!(result.state, FitState::Converged | FitState::Failed));
        assert!(result.best.unwrap().residual.is_finite());

        // Without the check the same upper point succeeds.
        let opts = FitOptions { energy_threshold: None, ..FitOptions::default() };
        let unchecked = FitDriver::new(&provider, &reference, Q, parameters(), base(), opts);
        assert!(unchecked.cost(&ParameterVector::upper(&parameters()), None).is_ok());
    }

    #[test]
    fn excluded_probe_accounting_reports_solver_evaluations_only() {
        let reference = flat(0.0);
        let provider = l1_stub;
        let opts = FitOptions { probe_accounting: ProbeAccounting::Excluded, ..FitOptions::default() };
        let mut driver = FitDriver::new(&provider, &reference, Q, parameters(), base(), opts);
        let result = driver.run(&mut NullReporter);
        assert_eq!(result.evaluations, result.optimizer_evaluations);
        assert_eq!(driver.history().len(), result.evaluations + 2);
    }
}
