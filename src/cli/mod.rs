//! Command-line parsing for the forest inventory toolkit.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! statistics code. Flags are turned into config structs in `app.rs`.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::{AllocationMethod, DfMethod, DiameterUnit, FitSpace, StratumSpec};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fst", version, about = "Forest inventory statistics: biomass allometry and stratified sampling")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` also works.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit biomass = a·DBH^b globally and per species; print diagnostics, predictions, plots.
    Biomass(BiomassArgs),
    /// Estimate mean basal area with SRS and stratified estimators from plot data.
    Sampling(SamplingArgs),
    /// Allocate plots across strata from literal area/SD values.
    Allocate(AllocateArgs),
    /// Write a synthetic tree/plot/strata dataset to CSV.
    Simulate(SimulateArgs),
}

/// Options for the biomass regression.
#[derive(Debug, Parser, Clone)]
pub struct BiomassArgs {
    /// Tree table: CSV path or URL (defaults to FOREST_TREES_URL).
    #[arg(long, value_name = "PATH|URL")]
    pub trees: Option<String>,

    /// Species column name.
    #[arg(long, default_value = "species")]
    pub species_col: String,

    /// DBH column name.
    #[arg(long, default_value = "dbh")]
    pub dbh_col: String,

    /// Aboveground biomass column name.
    #[arg(long, default_value = "biomass")]
    pub biomass_col: String,

    /// Optional tree id column name.
    #[arg(long, default_value = "tree_id")]
    pub id_col: String,

    /// Keep only this species code (repeatable).
    #[arg(long = "species", value_name = "CODE")]
    pub species: Vec<String>,

    /// Scale on which residuals are minimized.
    #[arg(long, value_enum, default_value_t = FitSpace::Log)]
    pub space: FitSpace,

    /// Starting value for `a`.
    #[arg(long, default_value_t = 0.1)]
    pub start_a: f64,

    /// Starting value for `b`.
    #[arg(long, default_value_t = 2.4)]
    pub start_b: f64,

    /// Maximum Gauss-Newton iterations.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,

    /// Convergence tolerance (relative SSE change).
    #[arg(long, default_value_t = 1e-10)]
    pub tol: f64,

    /// Confidence level for parameter intervals.
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    /// Fit the pooled model only.
    #[arg(long)]
    pub no_species: bool,

    /// Do not apply exp(σ²/2) to back-transformed log-space predictions.
    #[arg(long)]
    pub no_bias_correction: bool,

    /// Predict biomass at these diameters (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "DBH,...")]
    pub predict: Vec<f64>,

    /// Show top-N positive and negative residuals.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Disable the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Write SVG charts into this directory.
    #[arg(long, value_name = "DIR")]
    pub svg_dir: Option<PathBuf>,

    /// Export per-tree fitted values and residuals to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the fit report to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,
}

/// Options for basal area estimation.
#[derive(Debug, Parser, Clone)]
pub struct SamplingArgs {
    /// Plot table: CSV path or URL (defaults to FOREST_PLOTS_URL).
    #[arg(long, value_name = "PATH|URL")]
    pub plots: Option<String>,

    /// Strata table with `stratum,area` (defaults to FOREST_STRATA_URL, else an `area` column).
    #[arg(long, value_name = "PATH|URL")]
    pub strata: Option<String>,

    /// Plot table lists tallied trees (`dbh`) instead of plot basal area (`bapa`).
    #[arg(long)]
    pub tally: bool,

    /// Diameter unit of tallied trees.
    #[arg(long, value_enum, default_value_t = DiameterUnit::Inches)]
    pub unit: DiameterUnit,

    /// Trees per unit area represented by one tallied tree (e.g. 1 / plot acres).
    #[arg(long, default_value_t = 1.0)]
    pub expansion: f64,

    /// Confidence level for intervals.
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    /// Degrees of freedom for the stratified interval.
    #[arg(long = "df", value_enum, default_value_t = DfMethod::Simple)]
    pub df_method: DfMethod,

    /// Area of one plot in stratum-area units (enables the finite population correction).
    #[arg(long)]
    pub plot_area: Option<f64>,

    /// Plan plot counts for this allowable error (% of mean).
    #[arg(long, value_name = "PCT")]
    pub target_error: Option<f64>,

    /// Allocate this many plots across strata using the pilot SDs.
    #[arg(long, value_name = "N")]
    pub allocate: Option<usize>,

    /// Minimum plots per stratum for integer allocations.
    #[arg(long, default_value_t = 0)]
    pub min_per_stratum: usize,

    /// Export the sampling report to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,
}

/// Options for literal allocation.
#[derive(Debug, Parser, Clone)]
pub struct AllocateArgs {
    /// Total number of plots.
    #[arg(short = 'n', long)]
    pub total: usize,

    /// Stratum as `ID:AREA:SD` (repeatable).
    #[arg(long = "stratum", value_name = "ID:AREA:SD", value_parser = parse_stratum_spec, required = true)]
    pub strata: Vec<StratumSpec>,

    /// Allocation rule(s); both when omitted.
    #[arg(long, value_enum)]
    pub method: Vec<AllocationMethod>,

    /// Minimum plots per stratum.
    #[arg(long, default_value_t = 0)]
    pub min_per_stratum: usize,

    /// Also plan plot counts for this allowable error (% of mean); needs `--mean`.
    #[arg(long, value_name = "PCT", requires = "mean")]
    pub target_error: Option<f64>,

    /// Expected population mean, for sample size planning.
    #[arg(long)]
    pub mean: Option<f64>,

    /// Confidence level for sample size planning.
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,
}

/// Options for synthetic data.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output directory for trees.csv, plots.csv, strata.csv.
    #[arg(long, default_value = "data")]
    pub out_dir: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Trees generated per species.
    #[arg(long, default_value_t = 40)]
    pub trees_per_species: usize,

    /// Plots generated per stratum.
    #[arg(long, default_value_t = 12)]
    pub plots_per_stratum: usize,

    /// SD of the log-normal biomass error.
    #[arg(long, default_value_t = 0.15)]
    pub log_sigma: f64,
}

/// Parse `ID:AREA:SD`.
pub fn parse_stratum_spec(raw: &str) -> Result<StratumSpec, String> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    let [id, area, sd] = parts.as_slice() else {
        return Err(format!("expected ID:AREA:SD, got '{raw}'"));
    };
    if id.is_empty() {
        return Err("stratum id is empty".to_string());
    }
    let area: f64 = area.parse().map_err(|_| format!("invalid area '{area}'"))?;
    let sd: f64 = sd.parse().map_err(|_| format!("invalid SD '{sd}'"))?;
    Ok(StratumSpec {
        id: id.to_string(),
        area,
        sd,
    })
}
