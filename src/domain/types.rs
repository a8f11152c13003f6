//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and estimation
//! - exported to JSON/CSV
//! - reloaded later for comparisons

use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Scale on which the power-law biomass model is fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitSpace {
    /// `ln(biomass) = ln(a) + b·ln(dbh)`; residuals are on the log scale.
    Log,
    /// `biomass = a·dbh^b`; residuals are in biomass units.
    Raw,
}

impl FitSpace {
    pub fn display_name(self) -> &'static str {
        match self {
            FitSpace::Log => "log-log",
            FitSpace::Raw => "raw",
        }
    }
}

/// Unit of tallied tree diameters (tree-tally plot tables only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DiameterUnit {
    /// Inches; basal area in square feet.
    Inches,
    /// Centimeters; basal area in square meters.
    Cm,
}

impl DiameterUnit {
    /// Basal area of a stem with diameter `d`: `k·d²`.
    ///
    /// - inches -> ft²: `π / (4·144) ≈ 0.005454154`
    /// - cm -> m²: `π / 40000 ≈ 0.00007854`
    pub fn basal_area_constant(self) -> f64 {
        match self {
            DiameterUnit::Inches => std::f64::consts::PI / (4.0 * 144.0),
            DiameterUnit::Cm => std::f64::consts::PI / 40_000.0,
        }
    }

    pub fn area_label(self) -> &'static str {
        match self {
            DiameterUnit::Inches => "ft²",
            DiameterUnit::Cm => "m²",
        }
    }
}

/// Degrees of freedom for the stratified confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DfMethod {
    /// `n - L` (total plots minus number of strata).
    Simple,
    /// Satterthwaite effective degrees of freedom.
    Satterthwaite,
}

/// Plot allocation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMethod {
    /// Plots proportional to stratum area.
    Proportional,
    /// Plots proportional to area × within-stratum SD (Neyman).
    Optimal,
}

impl AllocationMethod {
    pub fn display_name(self) -> &'static str {
        match self {
            AllocationMethod::Proportional => "proportional",
            AllocationMethod::Optimal => "optimal (Neyman)",
        }
    }
}

/// One measured tree from the biomass table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeObs {
    pub id: String,
    pub species: String,
    pub dbh: f64,
    pub biomass: f64,
}

/// One sample plot with its per-area basal area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotObs {
    pub stratum: String,
    pub plot: String,
    pub bapa: f64,
}

/// A stratum (management unit) and its area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stratum {
    pub id: String,
    pub area: f64,
}

/// Summary stats about the trees actually used for fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub n_trees: usize,
    pub n_species: usize,
    pub dbh_min: f64,
    pub dbh_max: f64,
    pub biomass_min: f64,
    pub biomass_max: f64,
}

/// Power-law parameters: `biomass = a · dbh^b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLaw {
    pub a: f64,
    pub b: f64,
}

/// A parameter estimate with its standard error and confidence interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Fit quality diagnostics, measured in the fit space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitQuality {
    pub n: usize,
    pub iterations: usize,
    pub sse: f64,
    /// Residual standard error `sqrt(SSE / (n - 2))`.
    pub sigma: f64,
    pub rmse: f64,
    pub r_squared: f64,
    pub aic: f64,
    /// Multiplier applied to back-transformed predictions (1.0 for raw fits).
    pub bias_correction: f64,
}

/// The fitted model for one group of trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomassFit {
    /// `"all"` for the pooled fit, otherwise a species code.
    pub group: String,
    pub space: FitSpace,
    pub model: PowerLaw,
    pub params: Vec<ParamEstimate>,
    pub quality: FitQuality,
}

/// A per-tree fitted result (used for diagnostics and exports).
#[derive(Debug, Clone)]
pub struct TreeResidual {
    pub tree: TreeObs,
    /// Group whose model produced `fitted` (species when available, else `"all"`).
    pub group: String,
    /// Predicted biomass on the raw scale.
    pub fitted: f64,
    /// `biomass - fitted`.
    pub residual: f64,
    /// `ln(biomass) - ln(a·dbh^b)`, without the bias correction.
    pub log_residual: f64,
}

/// Predicted biomass at a requested diameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub group: String,
    pub dbh: f64,
    pub biomass: f64,
}

/// A saved biomass fit report (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomassReportFile {
    pub tool: String,
    pub generated: DateTime<Local>,
    pub space: FitSpace,
    pub dataset: DatasetStats,
    pub global: BiomassFit,
    pub species: Vec<BiomassFit>,
    pub skipped: Vec<SkippedGroup>,
    pub predictions: Vec<Prediction>,
}

/// A group that could not be fit, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedGroup {
    pub group: String,
    pub n: usize,
    pub reason: String,
}
