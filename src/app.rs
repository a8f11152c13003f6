//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - turns CLI flags (plus `.env` defaults) into run configs
//! - runs the biomass, sampling, allocation, or simulation pipeline
//! - prints reports/plots
//! - writes optional exports

use crate::cli::{AllocateArgs, BiomassArgs, Cli, Command, SamplingArgs, SimulateArgs};
use crate::data::{TableClient, TableSource, write_dataset};
use crate::domain::{
    AllocationConfig, BiomassConfig, PlotInput, PowerLaw, SamplePlanTarget, SamplingConfig, SimulateConfig,
    TreeColumns,
};
use crate::error::AppError;

pub mod pipeline;

/// Environment keys consulted when an input flag is omitted.
pub const TREES_ENV: &str = "FOREST_TREES_URL";
pub const PLOTS_ENV: &str = "FOREST_PLOTS_URL";
pub const STRATA_ENV: &str = "FOREST_STRATA_URL";

/// Entry point for the `fst` binary.
pub fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Biomass(args) => handle_biomass(&args),
        Command::Sampling(args) => handle_sampling(&args),
        Command::Allocate(args) => handle_allocate(&args),
        Command::Simulate(args) => handle_simulate(&args),
    }
}

/// Initialise `env_logger`: `RUST_LOG` wins, otherwise `warn` raised by `-v`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn handle_biomass(args: &BiomassArgs) -> Result<(), AppError> {
    let config = biomass_config_from_args(args)?;
    let client = TableClient::new();
    let run = pipeline::run_biomass(&config, &client)?;

    println!(
        "{}",
        crate::report::format_biomass_summary(&run.table.stats, &run.fits, &config)
    );
    if !run.predictions.is_empty() {
        println!("{}", crate::report::format_predictions(&run.predictions));
    }
    if config.top_n > 0 {
        println!("{}", crate::report::format_rankings(&run.rankings));
    }

    if config.plot {
        let plot = crate::plot::render_biomass_plot(
            &run.residuals,
            &run.fits.global,
            config.plot_width,
            config.plot_height,
            Some(&run.rankings),
        );
        println!("{plot}");
        println!(
            "{}",
            crate::plot::render_residual_plot(&run.residuals, config.plot_width, config.plot_height / 2)
        );
    }

    // Optional exports.
    if let Some(dir) = &config.svg_dir {
        crate::plot::write_svg_charts(dir, &run.residuals, &run.fits)?;
    }
    if let Some(path) = &config.export_residuals {
        crate::io::write_residuals_csv(path, &run.residuals)?;
    }
    if let Some(path) = &config.export_json {
        crate::io::write_report_json(path, &pipeline::biomass_report(&run, &config))?;
    }

    Ok(())
}

fn handle_sampling(args: &SamplingArgs) -> Result<(), AppError> {
    let config = sampling_config_from_args(args)?;
    let client = TableClient::new();
    let run = pipeline::run_sampling(&config, &client)?;

    println!(
        "{}",
        crate::report::format_sampling_summary(&run.srs, &run.stratified, run.relative_efficiency)
    );
    for alloc in &run.allocations {
        println!("{}", crate::report::format_allocation(alloc));
    }
    if !run.sample_sizes.is_empty() {
        println!("{}", crate::report::format_sample_sizes(&run.sample_sizes));
    }

    if let Some(path) = &config.export_json {
        crate::io::write_report_json(path, &pipeline::sampling_report(&run, &config))?;
    }
    Ok(())
}

fn handle_allocate(args: &AllocateArgs) -> Result<(), AppError> {
    let config = allocation_config_from_args(args);
    let run = pipeline::run_allocation(&config)?;

    for alloc in &run.allocations {
        println!("{}", crate::report::format_allocation(alloc));
    }
    if !run.sample_sizes.is_empty() {
        println!("{}", crate::report::format_sample_sizes(&run.sample_sizes));
    }
    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let files = write_dataset(&simulate_config_from_args(args))?;
    println!("trees:  {}", files.trees.display());
    println!("plots:  {}", files.plots.display());
    println!("strata: {}", files.strata.display());
    Ok(())
}

pub fn biomass_config_from_args(args: &BiomassArgs) -> Result<BiomassConfig, AppError> {
    Ok(BiomassConfig {
        trees: TableSource::from_flag_or_env(args.trees.as_deref(), TREES_ENV)?,
        columns: TreeColumns {
            species: args.species_col.clone(),
            dbh: args.dbh_col.clone(),
            biomass: args.biomass_col.clone(),
            id: args.id_col.clone(),
        },
        species_filter: args.species.clone(),
        space: args.space,
        start: PowerLaw {
            a: args.start_a,
            b: args.start_b,
        },
        max_iter: args.max_iter,
        tolerance: args.tol,
        confidence: args.confidence,
        per_species: !args.no_species,
        bias_correction: !args.no_bias_correction,
        predict_dbh: args.predict.clone(),
        top_n: args.top,
        plot: !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        svg_dir: args.svg_dir.clone(),
        export_residuals: args.export.clone(),
        export_json: args.export_json.clone(),
    })
}

pub fn sampling_config_from_args(args: &SamplingArgs) -> Result<SamplingConfig, AppError> {
    let strata = match args.strata.as_deref() {
        Some(raw) => Some(TableSource::parse(raw)),
        // The strata table is optional, so a missing env var is not an error.
        None => TableSource::from_flag_or_env(None, STRATA_ENV).ok(),
    };

    Ok(SamplingConfig {
        plots: TableSource::from_flag_or_env(args.plots.as_deref(), PLOTS_ENV)?,
        strata,
        plot_input: if args.tally {
            PlotInput::TreeTally {
                unit: args.unit,
                expansion: args.expansion,
            }
        } else {
            PlotInput::PlotLevel
        },
        confidence: args.confidence,
        df_method: args.df_method,
        plot_area: args.plot_area,
        target_error_pct: args.target_error,
        allocate_total: args.allocate,
        min_per_stratum: args.min_per_stratum,
        export_json: args.export_json.clone(),
    })
}

pub fn allocation_config_from_args(args: &AllocateArgs) -> AllocationConfig {
    AllocationConfig {
        total_plots: args.total,
        strata: args.strata.clone(),
        methods: args.method.clone(),
        min_per_stratum: args.min_per_stratum,
        plan: match (args.target_error, args.mean) {
            (Some(target_error_pct), Some(mean)) => Some(SamplePlanTarget {
                mean,
                target_error_pct,
                confidence: args.confidence,
            }),
            _ => None,
        },
    }
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        out_dir: args.out_dir.clone(),
        seed: args.seed,
        trees_per_species: args.trees_per_species,
        plots_per_stratum: args.plots_per_stratum,
        log_sigma: args.log_sigma,
    }
}
