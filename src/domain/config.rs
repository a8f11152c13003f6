//! Run configuration as understood by the pipeline.
//!
//! These structs are derived from CLI flags (plus `.env` defaults) in
//! `app.rs`; nothing below the app layer looks at clap types.

use std::path::PathBuf;

use crate::data::TableSource;
use crate::domain::{AllocationMethod, DfMethod, DiameterUnit, FitSpace, PowerLaw};

/// Column names used to read the tree table.
#[derive(Debug, Clone)]
pub struct TreeColumns {
    pub species: String,
    pub dbh: String,
    pub biomass: String,
    pub id: String,
}

impl Default for TreeColumns {
    fn default() -> Self {
        Self {
            species: "species".to_string(),
            dbh: "dbh".to_string(),
            biomass: "biomass".to_string(),
            id: "tree_id".to_string(),
        }
    }
}

/// Biomass regression run.
#[derive(Debug, Clone)]
pub struct BiomassConfig {
    pub trees: TableSource,
    pub columns: TreeColumns,
    /// Keep only these species codes (case-insensitive). Empty keeps all.
    pub species_filter: Vec<String>,
    pub space: FitSpace,
    pub start: PowerLaw,
    pub max_iter: usize,
    pub tolerance: f64,
    pub confidence: f64,
    pub per_species: bool,
    pub bias_correction: bool,
    pub predict_dbh: Vec<f64>,
    pub top_n: usize,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub svg_dir: Option<PathBuf>,

    pub export_residuals: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
}

/// Where plot-level basal area comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlotInput {
    /// One row per plot with a `bapa` column.
    PlotLevel,
    /// One row per tallied tree with a `dbh` column; aggregated per plot.
    TreeTally {
        unit: DiameterUnit,
        /// Per-area expansion factor of one tallied tree.
        expansion: f64,
    },
}

/// Basal area estimation run.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    pub plots: TableSource,
    pub strata: Option<TableSource>,
    pub plot_input: PlotInput,
    pub confidence: f64,
    pub df_method: DfMethod,
    /// Area of one plot, in the same unit as stratum areas (enables the fpc).
    pub plot_area: Option<f64>,
    /// Allowable error (% of mean) for sample size planning.
    pub target_error_pct: Option<f64>,
    /// Plot total for allocating a follow-up inventory from pilot SDs.
    pub allocate_total: Option<usize>,
    pub min_per_stratum: usize,
    pub export_json: Option<PathBuf>,
}

/// Literal stratum for allocation: id, area, SD.
#[derive(Debug, Clone, PartialEq)]
pub struct StratumSpec {
    pub id: String,
    pub area: f64,
    pub sd: f64,
}

/// Plot allocation run.
#[derive(Debug, Clone)]
pub struct AllocationConfig {
    pub total_plots: usize,
    pub strata: Vec<StratumSpec>,
    pub methods: Vec<AllocationMethod>,
    pub min_per_stratum: usize,
    /// Allowable error (% of mean) and expected mean, for sample size planning.
    pub plan: Option<SamplePlanTarget>,
}

/// Target for sample size planning.
#[derive(Debug, Clone, Copy)]
pub struct SamplePlanTarget {
    pub mean: f64,
    pub target_error_pct: f64,
    pub confidence: f64,
}

/// Synthetic dataset generation.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub out_dir: PathBuf,
    pub seed: u64,
    pub trees_per_species: usize,
    pub plots_per_stratum: usize,
    /// SD of the multiplicative log-normal biomass error.
    pub log_sigma: f64,
}
