//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and initializes logging
//! - parses CLI arguments
//! - builds the provider and loads the reference
//! - runs the fit with the selected progress reporter
//! - prints summaries/plots and writes optional exports

use clap::Parser;
use log::info;

use crate::cli::{
    Command, ConditionArgs, DemoArgs, FitArgs, LosArgs, OutputArgs, PlotArgs, ProviderArgs, ReferenceArgs,
    SolverArgs, SweepArgs,
};
use crate::domain::{
    FitConfig, LosConfig, ModelConditions, ProviderConfig, ReferenceConfig, SpectralWindow, SweepConfig,
};
use crate::error::AppError;
use crate::io::{FitReport, ReferenceFormat};
use crate::provider::SpectrumProvider;
use crate::report::{ConsoleReporter, NullReporter, PlotSize, Trajectory};
use crate::spectrum::Spectrum;

pub mod pipeline;

/// Entry point for the `sfit` binary.
pub fn run() -> Result<(), AppError> {
    // A missing `.env` is fine; only a malformed one is worth reporting.
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => return Err(AppError::new(2, format!("Failed to load .env: {e}"))),
        _ => {}
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
        Command::Sweep(args) => handle_sweep(args),
        Command::Los(args) => handle_los(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let provider = pipeline::load_provider(&config.provider)?;
    let reference = pipeline::load_fit_reference(&config)?;
    execute_fit(&config, &provider, &reference)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let truth = crate::data::demo_conditions();
    let provider_config = ProviderConfig {
        line_list: None,
        window: SpectralWindow { wavenum_min: 2284.2, wavenum_max: 2284.6, wstep: 0.001 },
        molar_mass: crate::provider::linelist::CO2_MOLAR_MASS,
        cutoff: 0.0,
    };
    let provider = pipeline::load_provider(&provider_config)?;
    let reference = crate::data::synthesize_reference(&provider, &truth, args.quantity, args.noise, args.seed)?;
    info!(
        "synthetic reference at T12={}K, T3={}K, Trot={}K (noise {})",
        truth.temperatures[0], truth.temperatures[1], truth.temperatures[2], args.noise
    );
    if let Some(path) = &args.write_reference {
        crate::io::write_spectrum_csv(path, &reference)?;
        info!("wrote synthetic reference to {}", path.display());
    }

    // Fitted slots start from ambient temperature; the probes and solver overwrite them.
    let conditions = ModelConditions { temperatures: [300.0; 3], ..truth };
    let reference_config = ReferenceConfig {
        path: args.write_reference.clone().unwrap_or_default(),
        delimiter: b',',
        x_column: 0,
        y_column: 1,
        has_headers: true,
        waveunit: reference.waveunit(),
        quantity: args.quantity,
    };
    let config = build_fit_config(reference_config, provider_config, conditions, &args.solver, &args.output)?;
    execute_fit(&config, &provider, &reference)
}

fn execute_fit(config: &FitConfig, provider: &dyn SpectrumProvider, reference: &Spectrum) -> Result<(), AppError> {
    let run = if config.tui {
        let mut reporter = crate::tui::TuiReporter::new()?;
        pipeline::run_fit(config, provider, reference, &mut reporter)
    } else if config.quiet {
        pipeline::run_fit(config, provider, reference, &mut NullReporter)
    } else {
        let plot = config.plot.then_some(PlotSize { width: config.plot_width, height: config.plot_height });
        let mut reporter = ConsoleReporter::stdout(plot);
        pipeline::run_fit(config, provider, reference, &mut reporter)
    };

    println!(
        "{}",
        crate::report::format_fit_summary(&config.parameters, &run.result, run.history.len())
    );

    // Optional exports.
    if let Some(path) = &config.export_history {
        crate::io::write_history_csv(path, &config.parameters, &run.history)?;
        info!("wrote history to {}", path.display());
    }
    if let Some(path) = &config.export_result {
        let report = FitReport::new(
            reference.name().unwrap_or("reference"),
            config.reference.quantity,
            config.method,
            &config.parameters,
            &run.result,
            run.history.len(),
        );
        crate::io::write_result_json(path, &report)?;
        info!("wrote fit report to {}", path.display());
    }
    if config.export_best.is_some() || config.save_plot.is_some() {
        if let Some(best) = pipeline::best_spectrum(config, provider, &run.result)? {
            if let Some(path) = &config.export_best {
                crate::io::write_spectrum_csv(path, &best)?;
                info!("wrote best spectrum to {}", path.display());
            }
            if let Some(path) = &config.save_plot {
                let trajectory = Trajectory::from_history(config.parameters.len(), &run.history);
                crate::plot::save_fit_svg(path, reference, &best, config.reference.quantity, &trajectory)?;
                info!("wrote plot to {}", path.display());
            }
        }
    }

    if run.result.best.is_none() {
        return Err(AppError::new(
            4,
            format!("No evaluation succeeded: {}", run.result.message),
        ));
    }
    if config.strict && !run.result.success {
        return Err(AppError::new(3, format!("Fit did not converge: {}", run.result.message)));
    }
    Ok(())
}

fn handle_sweep(args: SweepArgs) -> Result<(), AppError> {
    let config = SweepConfig {
        conditions_path: args.conditions.clone(),
        out_dir: args.out_dir.clone(),
        overwrite: args.overwrite,
        distribution: args.provider.distribution,
        quantity: args.quantity,
        provider: provider_config_from_args(&args.provider),
    };
    let provider = pipeline::load_provider(&config.provider)?;
    let rows = crate::io::read_condition_rows(&config.conditions_path)?;
    let summary = pipeline::run_sweep(&config, &provider, &rows)?;
    println!("{}", crate::report::format_sweep_summary(&summary));
    Ok(())
}

fn handle_los(args: LosArgs) -> Result<(), AppError> {
    let config = LosConfig {
        layers_path: args.layers.clone(),
        distribution: args.provider.distribution,
        quantity: args.quantity,
        provider: provider_config_from_args(&args.provider),
        export: args.export.clone(),
        plot: args.plot,
        plot_width: args.width,
        plot_height: args.height,
    };
    let provider = pipeline::load_provider(&config.provider)?;
    let rows = crate::io::read_condition_rows(&config.layers_path)?;
    let run = pipeline::run_los(&config, &provider, &rows)?;

    println!("{}", crate::report::format_los_summary(&run));
    if config.plot {
        let plot = crate::plot::render_series(
            &format!(
                "{} | {} vs {}",
                run.spectrum.name().unwrap_or("line of sight"),
                run.quantity,
                run.spectrum.waveunit().as_str()
            ),
            &[crate::plot::Series { points: &run.spectrum.points(run.quantity), marker: '-', line: true }],
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }
    if let Some(path) = &config.export {
        crate::io::write_spectrum_csv(path, &run.spectrum)?;
        info!("wrote combined spectrum to {}", path.display());
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let format = reference_format(&args.format)?;
    let reference = crate::io::load_reference(&args.reference, &format)?;
    let computed = match &args.computed {
        Some(path) => crate::io::load_reference(path, &format)?,
        None => reference.clone(),
    };
    let title = reference.name().unwrap_or("reference").to_string();
    let plot = crate::plot::render_spectrum_comparison(
        &reference,
        &computed,
        args.format.quantity,
        &title,
        args.width,
        args.height,
    );
    println!("{plot}");
    Ok(())
}

/// Typed fit configuration from `sfit fit` flags.
pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let reference = ReferenceConfig {
        path: args.reference.clone(),
        delimiter: delimiter_byte(args.format.delimiter)?,
        x_column: args.format.x_col,
        y_column: args.format.y_col,
        has_headers: args.format.header,
        waveunit: args.format.waveunit,
        quantity: args.format.quantity,
    };
    build_fit_config(
        reference,
        provider_config_from_args(&args.provider),
        conditions_from_args(&args.conditions, &args.provider),
        &args.solver,
        &args.output,
    )
}

/// Validate solver and output flags and assemble the fit configuration.
fn build_fit_config(
    reference: ReferenceConfig,
    provider: ProviderConfig,
    conditions: ModelConditions,
    solver: &SolverArgs,
    output: &OutputArgs,
) -> Result<FitConfig, AppError> {
    let parameters = if solver.fit.is_empty() {
        crate::cli::default_fit_parameters()
    } else {
        solver.fit.clone()
    };
    if let Some(dup) = parameters
        .iter()
        .enumerate()
        .find(|(i, p)| parameters[..*i].iter().any(|q| q.param == p.param))
    {
        return Err(AppError::new(2, format!("Parameter {} is fitted twice.", dup.1.param)));
    }
    if !(solver.energy_threshold.is_finite() && solver.energy_threshold >= 0.0) {
        return Err(AppError::new(2, "Energy threshold must be >= 0."));
    }
    if !(solver.fd_eps.is_finite() && solver.fd_eps > 0.0) {
        return Err(AppError::new(2, "Finite-difference step must be > 0."));
    }
    if solver.max_iterations == 0 {
        return Err(AppError::new(2, "Max iterations must be > 0."));
    }
    if output.tui && output.quiet {
        return Err(AppError::new(2, "--tui and --quiet cannot be combined."));
    }

    Ok(FitConfig {
        reference,
        provider,
        conditions,
        parameters,
        method: solver.method,
        max_iterations: solver.max_iterations,
        fd_eps: solver.fd_eps,
        plot_every: solver.plot_every,
        energy_threshold: (!solver.no_energy_check).then_some(solver.energy_threshold),
        probe_accounting: solver.probe_accounting,
        tui: output.tui,
        plot: output.plot,
        plot_width: output.width,
        plot_height: output.height,
        quiet: output.quiet,
        strict: output.strict,
        export_history: output.export_history.clone(),
        export_best: output.export_best.clone(),
        export_result: output.export_result.clone(),
        save_plot: output.save_plot.clone(),
    })
}

fn provider_config_from_args(args: &ProviderArgs) -> ProviderConfig {
    ProviderConfig {
        line_list: args.line_list.clone(),
        window: SpectralWindow { wavenum_min: args.wmin, wavenum_max: args.wmax, wstep: args.wstep },
        molar_mass: args.molar_mass,
        cutoff: args.cutoff,
    }
}

fn conditions_from_args(args: &ConditionArgs, provider: &ProviderArgs) -> ModelConditions {
    ModelConditions {
        pressure_bar: args.pressure,
        path_length_cm: args.path_length,
        mole_fraction: args.mole_fraction,
        distribution: provider.distribution,
        temperatures: [args.t12, args.t3, args.trot],
    }
}

fn reference_format(args: &ReferenceArgs) -> Result<ReferenceFormat, AppError> {
    Ok(ReferenceFormat {
        delimiter: delimiter_byte(args.delimiter)?,
        x_column: args.x_col,
        y_column: args.y_col,
        has_headers: args.header,
        ..ReferenceFormat::new(args.quantity, args.waveunit)
    })
}

fn delimiter_byte(c: char) -> Result<u8, AppError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| AppError::new(2, format!("Delimiter must be a single ASCII character (got '{c}').")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::{FreeParam, Method, Quantity};

    fn fit_args(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["sfit", "fit", "exp.csv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Fit(args) => args,
            _ => panic!("expected fit"),
        }
    }

    #[test]
    fn defaults_fit_three_temperatures() {
        let config = fit_config_from_args(&fit_args(&[])).unwrap();
        let names: Vec<FreeParam> = config.parameters.iter().map(|p| p.param).collect();
        assert_eq!(names, vec![FreeParam::T12, FreeParam::T3, FreeParam::Trot]);
        assert_eq!(config.energy_threshold, Some(2e-2));
        assert_eq!(config.method, Method::NelderMead);
        assert_eq!(config.reference.quantity, Quantity::TransmittanceNoslit);
        assert_eq!(config.reference.delimiter, b',');
    }

    #[test]
    fn flags_map_onto_config() {
        let config = fit_config_from_args(&fit_args(&[
            "--fit",
            "Trot=300:900",
            "--no-energy-check",
            "--delimiter",
            ";",
            "--trot",
            "450",
            "--t3",
            "1800",
        ]))
        .unwrap();
        assert_eq!(config.parameters.len(), 1);
        assert_eq!(config.energy_threshold, None);
        assert_eq!(config.reference.delimiter, b';');
        assert_eq!(config.conditions.temperatures, [300.0, 1800.0, 450.0]);
    }

    #[test]
    fn invalid_settings_are_input_errors() {
        let dup = fit_config_from_args(&fit_args(&["--fit", "T3=300:900", "--fit", "T3=300:500"]));
        assert_eq!(dup.unwrap_err().exit_code(), 2);

        let delim = fit_config_from_args(&fit_args(&["--delimiter", "é"]));
        assert_eq!(delim.unwrap_err().exit_code(), 2);

        let both = fit_config_from_args(&fit_args(&["--tui", "--quiet"]));
        assert_eq!(both.unwrap_err().exit_code(), 2);
    }
}
