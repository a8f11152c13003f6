//! Basal area estimation and inventory design.
//!
//! - simple random sampling estimate over all plots (`srs`)
//! - stratified estimate weighted by stratum area (`stratified`)
//! - proportional and optimal (Neyman) plot allocation (`allocation`)
//! - plots needed for a target allowable error (`sample_size`)

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub mod allocation;
pub mod sample_size;
pub mod srs;
pub mod stratified;

pub use allocation::*;
pub use sample_size::*;
pub use srs::*;
pub use stratified::*;

/// A saved sampling report (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingReportFile {
    pub tool: String,
    pub generated: DateTime<Local>,
    pub confidence: f64,
    pub srs: SrsEstimate,
    pub stratified: StratifiedEstimate,
    /// `Var(SRS) / Var(stratified)`; above 1 means stratification paid off.
    pub relative_efficiency: f64,
    pub allocations: Vec<Allocation>,
    pub sample_sizes: Vec<SampleSizePlan>,
}

/// Efficiency of stratification: `Var(ȳ_srs) / Var(ȳ_st)`.
pub fn relative_efficiency(srs: &SrsEstimate, stratified: &StratifiedEstimate) -> f64 {
    if stratified.variance > 0.0 {
        srs.se * srs.se / stratified.variance
    } else {
        f64::INFINITY
    }
}
