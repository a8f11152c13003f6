//! Shared run logic behind the CLI handlers.
//!
//! Keeping this in one place keeps the workflow linear and testable:
//! fetch table -> clean/join -> fit or estimate -> residuals/allocations.
//!
//! The handlers in `app.rs` then only deal with presentation.

use chrono::Local;

use crate::data::TableClient;
use crate::domain::{
    AllocationConfig, AllocationMethod, BiomassConfig, BiomassReportFile, PlotObs, Prediction, SamplingConfig,
    Stratum, StratumSpec, TreeResidual,
};
use crate::error::AppError;
use crate::fit::{BiomassFits, DiagnosticOptions, FitOptions, fit_groups};
use crate::io::{RowError, TOOL_NAME, TreeTable, join_strata, parse_plots, parse_strata, parse_trees};
use crate::report::{Rankings, compute_residuals, predict_at, rank_residuals};
use crate::sampling::{
    Allocation, SampleSizePlan, SamplingReportFile, SrsEstimate, StratifiedEstimate, allocate,
    relative_efficiency, srs_estimate, srs_sample_size, stratified_estimate, stratified_sample_size,
};

/// Row errors echoed individually before summarizing.
const ROW_ERROR_LOG_LIMIT: usize = 10;

/// All computed outputs of a single `fst biomass` run.
#[derive(Debug, Clone)]
pub struct BiomassRun {
    pub table: TreeTable,
    pub fits: BiomassFits,
    pub residuals: Vec<TreeResidual>,
    pub rankings: Rankings,
    pub predictions: Vec<Prediction>,
}

/// All computed outputs of a single `fst sampling` run.
#[derive(Debug, Clone)]
pub struct SamplingRun {
    pub plots: Vec<PlotObs>,
    pub strata: Vec<Stratum>,
    pub srs: SrsEstimate,
    pub stratified: StratifiedEstimate,
    pub relative_efficiency: f64,
    pub allocations: Vec<Allocation>,
    pub sample_sizes: Vec<SampleSizePlan>,
}

/// Outputs of `fst allocate`.
#[derive(Debug, Clone)]
pub struct AllocationRun {
    pub allocations: Vec<Allocation>,
    pub sample_sizes: Vec<SampleSizePlan>,
}

/// Fetch, clean, and fit the tree table.
pub fn run_biomass(config: &BiomassConfig, client: &TableClient) -> Result<BiomassRun, AppError> {
    let text = client.read(&config.trees)?;
    let table = parse_trees(&text, &config.columns, &config.species_filter)?;
    log_row_errors("tree", &table.row_errors);
    log::info!("trees: {} usable of {} rows", table.trees.len(), table.rows_read);

    run_biomass_on(config, table)
}

/// Fit an already ingested tree table.
pub fn run_biomass_on(config: &BiomassConfig, table: TreeTable) -> Result<BiomassRun, AppError> {
    if table.trees.is_empty() {
        return Err(AppError::insufficient("No usable trees after cleaning."));
    }

    let opts = FitOptions {
        space: config.space,
        start: config.start,
        max_iter: config.max_iter,
        tolerance: config.tolerance,
    };
    let diag = DiagnosticOptions {
        confidence: config.confidence,
        bias_correction: config.bias_correction,
    };
    let fits = fit_groups(&table.trees, &opts, diag, config.per_species)?;

    let residuals = compute_residuals(&table.trees, &fits)?;
    let rankings = rank_residuals(&residuals, config.top_n);
    let predictions = predict_at(&fits, &config.predict_dbh)?;

    Ok(BiomassRun {
        table,
        fits,
        residuals,
        rankings,
        predictions,
    })
}

/// JSON report for a biomass run.
pub fn biomass_report(run: &BiomassRun, config: &BiomassConfig) -> BiomassReportFile {
    BiomassReportFile {
        tool: TOOL_NAME.to_string(),
        generated: Local::now(),
        space: config.space,
        dataset: run.table.stats.clone(),
        global: run.fits.global.clone(),
        species: run.fits.species.clone(),
        skipped: run.fits.skipped.clone(),
        predictions: run.predictions.clone(),
    }
}

/// Fetch plot (and strata) tables, then estimate.
pub fn run_sampling(config: &SamplingConfig, client: &TableClient) -> Result<SamplingRun, AppError> {
    let text = client.read(&config.plots)?;
    let plot_table = parse_plots(&text, config.plot_input)?;
    log_row_errors("plot", &plot_table.row_errors);
    log::info!("plots: {} usable of {} rows", plot_table.plots.len(), plot_table.rows_read);

    let strata_table = match &config.strata {
        Some(source) => Some(parse_strata(&client.read(source)?)?),
        None => None,
    };
    let strata = join_strata(&plot_table.plots, &plot_table.inline_areas, strata_table.as_deref())?;

    run_sampling_on(config, plot_table.plots, strata)
}

/// Estimate from cleaned plots and resolved strata.
pub fn run_sampling_on(config: &SamplingConfig, plots: Vec<PlotObs>, strata: Vec<Stratum>) -> Result<SamplingRun, AppError> {
    if plots.is_empty() {
        return Err(AppError::insufficient("No usable plots after cleaning."));
    }

    let total_area: f64 = strata.iter().map(|s| s.area).sum();
    let values: Vec<f64> = plots.iter().map(|p| p.bapa).collect();
    let srs = srs_estimate(&values, config.confidence, config.plot_area.map(|a| total_area / a))?;
    let stratified = stratified_estimate(&plots, &strata, config.confidence, config.df_method, config.plot_area)?;
    let efficiency = relative_efficiency(&srs, &stratified);

    // Pilot SDs drive allocation and planning for the next inventory.
    let pilot: Vec<StratumSpec> = stratified
        .strata
        .iter()
        .map(|s| StratumSpec {
            id: s.id.clone(),
            area: s.area,
            sd: s.sd,
        })
        .collect();

    let allocations = match config.allocate_total {
        Some(total) => [AllocationMethod::Proportional, AllocationMethod::Optimal]
            .into_iter()
            .map(|m| allocate(total, &pilot, m, config.min_per_stratum))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let sample_sizes = match config.target_error_pct {
        Some(target) => vec![
            srs_sample_size(srs.mean, srs.sd, target, config.confidence)?,
            stratified_sample_size(stratified.mean, &pilot, AllocationMethod::Proportional, target, config.confidence)?,
            stratified_sample_size(stratified.mean, &pilot, AllocationMethod::Optimal, target, config.confidence)?,
        ],
        None => Vec::new(),
    };

    Ok(SamplingRun {
        plots,
        strata,
        srs,
        stratified,
        relative_efficiency: efficiency,
        allocations,
        sample_sizes,
    })
}

/// JSON report for a sampling run.
pub fn sampling_report(run: &SamplingRun, config: &SamplingConfig) -> SamplingReportFile {
    SamplingReportFile {
        tool: TOOL_NAME.to_string(),
        generated: Local::now(),
        confidence: config.confidence,
        srs: run.srs.clone(),
        stratified: run.stratified.clone(),
        relative_efficiency: run.relative_efficiency,
        allocations: run.allocations.clone(),
        sample_sizes: run.sample_sizes.clone(),
    }
}

/// Allocate (and optionally plan) from literal strata.
pub fn run_allocation(config: &AllocationConfig) -> Result<AllocationRun, AppError> {
    let methods = if config.methods.is_empty() {
        vec![AllocationMethod::Proportional, AllocationMethod::Optimal]
    } else {
        config.methods.clone()
    };

    let allocations = methods
        .iter()
        .map(|&m| allocate(config.total_plots, &config.strata, m, config.min_per_stratum))
        .collect::<Result<Vec<_>, _>>()?;

    let sample_sizes = match config.plan {
        Some(plan) => methods
            .iter()
            .map(|&m| stratified_sample_size(plan.mean, &config.strata, m, plan.target_error_pct, plan.confidence))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(AllocationRun {
        allocations,
        sample_sizes,
    })
}

fn log_row_errors(table: &str, errors: &[RowError]) {
    for e in errors.iter().take(ROW_ERROR_LOG_LIMIT) {
        match &e.id {
            Some(id) => log::warn!("{table} table line {} ({id}): {}", e.line, e.message),
            None => log::warn!("{table} table line {}: {}", e.line, e.message),
        }
    }
    if errors.len() > ROW_ERROR_LOG_LIMIT {
        log::warn!("{table} table: {} more rows dropped", errors.len() - ROW_ERROR_LOG_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TableSource;
    use crate::domain::{DfMethod, FitSpace, PlotInput, PowerLaw, SamplePlanTarget, TreeColumns};

    fn biomass_config() -> BiomassConfig {
        BiomassConfig {
            trees: TableSource::parse("trees.csv"),
            columns: TreeColumns::default(),
            species_filter: Vec::new(),
            space: FitSpace::Log,
            start: PowerLaw { a: 0.1, b: 2.4 },
            max_iter: 200,
            tolerance: 1e-10,
            confidence: 0.95,
            per_species: true,
            bias_correction: true,
            predict_dbh: vec![20.0, 40.0],
            top_n: 3,
            plot: false,
            plot_width: 60,
            plot_height: 15,
            svg_dir: None,
            export_residuals: None,
            export_json: None,
        }
    }

    fn sampling_config() -> SamplingConfig {
        SamplingConfig {
            plots: TableSource::parse("plots.csv"),
            strata: None,
            plot_input: PlotInput::PlotLevel,
            confidence: 0.95,
            df_method: DfMethod::Simple,
            plot_area: None,
            target_error_pct: Some(10.0),
            allocate_total: Some(20),
            min_per_stratum: 2,
            export_json: None,
        }
    }

    #[test]
    fn biomass_pipeline_on_csv_text() {
        let mut csv = String::from("tree_id,species,dbh,biomass\n");
        let noise = [1.04, 0.97, 1.02, 0.95, 1.05, 0.99];
        for i in 0..12 {
            let d = 10.0 + 4.0 * i as f64;
            let b = 0.1 * f64::powf(d, 2.4) * noise[i % noise.len()];
            csv.push_str(&format!("P{i},psme,{d},{b}\n"));
        }
        csv.push_str("bad,PSME,NA,10\n");

        let table = parse_trees(&csv, &TreeColumns::default(), &[]).unwrap();
        assert_eq!(table.row_errors.len(), 1);

        let config = biomass_config();
        let run = run_biomass_on(&config, table).unwrap();
        assert_eq!(run.fits.species.len(), 1);
        assert_eq!(run.residuals.len(), 12);
        assert_eq!(run.predictions.len(), 4);
        assert!(run.rankings.above.len() <= 3);

        let report = biomass_report(&run, &config);
        assert_eq!(report.tool, "fst");
        assert_eq!(report.dataset.n_trees, 12);
    }

    #[test]
    fn sampling_pipeline_estimates_allocates_and_plans() {
        let mut plots = Vec::new();
        for (stratum, values) in [("A", [100.0, 120.0, 140.0, 160.0]), ("B", [40.0, 50.0, 60.0, 70.0])] {
            for (i, v) in values.into_iter().enumerate() {
                plots.push(PlotObs {
                    stratum: stratum.to_string(),
                    plot: format!("{stratum}{i}"),
                    bapa: v,
                });
            }
        }
        let strata = vec![
            Stratum { id: "A".into(), area: 75.0 },
            Stratum { id: "B".into(), area: 25.0 },
        ];

        let run = run_sampling_on(&sampling_config(), plots, strata).unwrap();
        assert!(run.relative_efficiency > 1.0);
        assert_eq!(run.allocations.len(), 2);
        assert!(run.allocations.iter().all(|a| a.rows.iter().map(|r| r.plots).sum::<usize>() == 20));
        assert_eq!(run.sample_sizes.len(), 3);
        assert!(run.sample_sizes[0].plots >= run.sample_sizes[2].plots);
    }

    #[test]
    fn allocation_defaults_to_both_methods() {
        let config = AllocationConfig {
            total_plots: 30,
            strata: vec![
                StratumSpec { id: "MU1".into(), area: 120.0, sd: 30.0 },
                StratumSpec { id: "MU2".into(), area: 80.0, sd: 20.0 },
            ],
            methods: Vec::new(),
            min_per_stratum: 0,
            plan: Some(SamplePlanTarget {
                mean: 110.0,
                target_error_pct: 10.0,
                confidence: 0.95,
            }),
        };
        let run = run_allocation(&config).unwrap();
        assert_eq!(run.allocations.len(), 2);
        assert_eq!(run.allocations[0].method, AllocationMethod::Proportional);
        assert_eq!(run.sample_sizes.len(), 2);
    }
}
