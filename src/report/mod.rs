//! Reporting utilities: residuals, rankings, and predictions.

pub mod format;

pub use format::*;

use crate::domain::{Prediction, TreeObs, TreeResidual};
use crate::error::AppError;
use crate::fit::BiomassFits;
use crate::models::{predict, predict_corrected};

/// Largest residuals on each side (top-N each).
#[derive(Debug, Clone)]
pub struct Rankings {
    /// Trees heavier than their model predicts.
    pub above: Vec<TreeResidual>,
    /// Trees lighter than their model predicts.
    pub below: Vec<TreeResidual>,
}

/// Fitted values and residuals for each tree, using its species fit when one
/// exists and the pooled fit otherwise.
///
/// `fitted` and `residual` are on the corrected biomass scale. `log_residual`
/// is against the uncorrected curve `a·DBH^b`, so it centres on zero.
pub fn compute_residuals(trees: &[TreeObs], fits: &BiomassFits) -> Result<Vec<TreeResidual>, AppError> {
    let mut out = Vec::with_capacity(trees.len());
    for t in trees {
        let fit = fits.for_species(&t.species);
        let curve = predict(fit.model, t.dbh);
        let fitted = predict_corrected(fit.model, fit.quality.bias_correction, t.dbh);
        if !(curve.is_finite() && curve > 0.0 && fitted.is_finite() && fitted > 0.0) {
            return Err(AppError::compute(format!(
                "Non-finite prediction for tree '{}' (dbh={}).",
                t.id, t.dbh
            )));
        }
        out.push(TreeResidual {
            tree: t.clone(),
            group: fit.group.clone(),
            fitted,
            residual: t.biomass - fitted,
            log_residual: t.biomass.ln() - curve.ln(),
        });
    }
    Ok(out)
}

/// Rank residuals on the log scale so large and small trees compare fairly.
pub fn rank_residuals(residuals: &[TreeResidual], top_n: usize) -> Rankings {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.log_residual.total_cmp(&a.log_residual));

    let above = sorted
        .iter()
        .take_while(|r| r.log_residual > 0.0)
        .take(top_n)
        .cloned()
        .collect();
    let below = sorted
        .iter()
        .rev()
        .take_while(|r| r.log_residual < 0.0)
        .take(top_n)
        .cloned()
        .collect();

    Rankings { above, below }
}

/// Predict biomass at each requested DBH for the pooled fit and every species fit.
pub fn predict_at(fits: &BiomassFits, dbh: &[f64]) -> Result<Vec<Prediction>, AppError> {
    if let Some(bad) = dbh.iter().find(|d| !(d.is_finite() && **d > 0.0)) {
        return Err(AppError::input(format!("Prediction DBH must be finite and > 0 (got {bad}).")));
    }
    let mut out = Vec::new();
    for fit in std::iter::once(&fits.global).chain(&fits.species) {
        for &d in dbh {
            out.push(Prediction {
                group: fit.group.clone(),
                dbh: d,
                biomass: predict_corrected(fit.model, fit.quality.bias_correction, d),
            });
        }
    }
    Ok(out)
}
