//! Plots needed to reach a target allowable error.
//!
//! With allowable error `E` (absolute, `E% · ȳ / 100`):
//! - SRS: `n = t² s² / E²`
//! - stratified, proportional: `n = t² Σ W_h s_h² / E²`
//! - stratified, optimal: `n = t² (Σ W_h s_h)² / E²`
//!
//! `t` depends on `n` (df = n - 1), so we start from the normal quantile and
//! iterate until the plot count stops changing.

use serde::{Deserialize, Serialize};

use crate::domain::{AllocationMethod, StratumSpec};
use crate::error::AppError;
use crate::math::{inverse_normal_cdf, t_critical};
use crate::sampling::allocation::{Allocation, MAX_PLOTS, allocate};
use crate::sampling::srs::check_confidence;

/// Iterations of the `t`/`n` fixed point before settling.
const MAX_T_ITERATIONS: usize = 50;

/// Smallest sample that still yields a variance estimate.
const MIN_PLOTS: usize = 2;

/// Inventory design a plan is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleDesign {
    Srs,
    StratifiedProportional,
    StratifiedOptimal,
}

impl SampleDesign {
    pub fn display_name(self) -> &'static str {
        match self {
            SampleDesign::Srs => "SRS",
            SampleDesign::StratifiedProportional => "stratified, proportional",
            SampleDesign::StratifiedOptimal => "stratified, optimal",
        }
    }
}

/// Required plots for one design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSizePlan {
    pub design: SampleDesign,
    pub target_error_pct: f64,
    pub confidence: f64,
    pub plots: usize,
    pub df: f64,
    pub t: f64,
    /// How the planned plots split across strata (stratified designs only).
    pub allocation: Option<Allocation>,
}

/// Plots needed under simple random sampling.
pub fn srs_sample_size(mean: f64, sd: f64, target_error_pct: f64, confidence: f64) -> Result<SampleSizePlan, AppError> {
    let allowable = allowable_error(mean, target_error_pct, confidence)?;
    if !(sd.is_finite() && sd >= 0.0) {
        return Err(AppError::input("Standard deviation must be finite and >= 0."));
    }
    let (plots, t) = required_plots(sd * sd, allowable, confidence, MIN_PLOTS)?;
    Ok(SampleSizePlan {
        design: SampleDesign::Srs,
        target_error_pct,
        confidence,
        plots,
        df: (plots - 1) as f64,
        t,
        allocation: None,
    })
}

/// Plots needed under stratified sampling, split with `method`.
///
/// `mean` is the (stratified) population mean the error is relative to.
/// Every stratum keeps at least two plots.
pub fn stratified_sample_size(
    mean: f64,
    strata: &[StratumSpec],
    method: AllocationMethod,
    target_error_pct: f64,
    confidence: f64,
) -> Result<SampleSizePlan, AppError> {
    let allowable = allowable_error(mean, target_error_pct, confidence)?;
    if strata.is_empty() {
        return Err(AppError::input("Sample size planning needs at least one stratum."));
    }
    if strata.iter().any(|s| !(s.area.is_finite() && s.area > 0.0 && s.sd.is_finite() && s.sd >= 0.0)) {
        return Err(AppError::input("Stratum areas must be > 0 and SDs >= 0."));
    }

    let total_area: f64 = strata.iter().map(|s| s.area).sum();
    let (design, variance_term) = match method {
        AllocationMethod::Proportional => {
            let v: f64 = strata.iter().map(|s| s.area / total_area * s.sd * s.sd).sum();
            (SampleDesign::StratifiedProportional, v)
        }
        AllocationMethod::Optimal => {
            let ws: f64 = strata.iter().map(|s| s.area / total_area * s.sd).sum();
            (SampleDesign::StratifiedOptimal, ws * ws)
        }
    };

    let floor = MIN_PLOTS * strata.len();
    let (plots, t) = required_plots(variance_term, allowable, confidence, floor)?;
    let allocation = allocate(plots, strata, method, MIN_PLOTS)?;

    Ok(SampleSizePlan {
        design,
        target_error_pct,
        confidence,
        plots,
        df: (plots - 1) as f64,
        t,
        allocation: Some(allocation),
    })
}

fn allowable_error(mean: f64, target_error_pct: f64, confidence: f64) -> Result<f64, AppError> {
    check_confidence(confidence)?;
    if !(target_error_pct.is_finite() && target_error_pct > 0.0) {
        return Err(AppError::input("Target error (%) must be finite and > 0."));
    }
    if !(mean.is_finite() && mean > 0.0) {
        return Err(AppError::input("Sample size planning needs a positive mean."));
    }
    Ok(target_error_pct / 100.0 * mean)
}

/// Solve `n = ceil(t(n-1)² · V / E²)` by fixed-point iteration.
///
/// If the count flips between two values, the larger one is returned; it
/// satisfies the requirement at its own `t`.
fn required_plots(variance_term: f64, allowable: f64, confidence: f64, floor: usize) -> Result<(usize, f64), AppError> {
    let ratio = variance_term / (allowable * allowable);
    let z = inverse_normal_cdf(1.0 - (1.0 - confidence) / 2.0);

    let mut n = plot_count(z, ratio, floor)?;
    let mut previous = None;
    for _ in 0..MAX_T_ITERATIONS {
        let t = t_critical(confidence, (n - 1) as f64);
        let next = plot_count(t, ratio, floor)?;
        if next == n {
            return Ok((n, t));
        }
        if previous == Some(next) {
            let settled = n.max(next);
            return Ok((settled, t_critical(confidence, (settled - 1) as f64)));
        }
        previous = Some(n);
        n = next;
    }
    log::debug!("sample size iteration hit the cap at n={n}");
    Ok((n, t_critical(confidence, (n - 1) as f64)))
}

/// `ceil(t² · ratio)`, at least `floor`, rejected above [`MAX_PLOTS`].
fn plot_count(t: f64, ratio: f64, floor: usize) -> Result<usize, AppError> {
    let raw = (t * t * ratio).ceil();
    if !(raw.is_finite() && raw <= MAX_PLOTS as f64) {
        return Err(AppError::input(format!(
            "The target error needs more than {MAX_PLOTS} plots; relax the target error."
        )));
    }
    Ok((raw as usize).max(floor))
}
