//! Stratified estimate of mean basal area.
//!
//! With strata `h = 1..L`, areas `A_h`, weights `W_h = A_h / ΣA`, plot counts
//! `n_h`, means `ȳ_h`, and SDs `s_h`:
//!
//! ```text
//! ȳ_st      = Σ W_h ȳ_h
//! Var(ȳ_st) = Σ W_h² s_h² / n_h · (1 - n_h/N_h)
//! ```
//!
//! Degrees of freedom are `n - L` or the Satterthwaite approximation.

use serde::{Deserialize, Serialize};

use crate::domain::{DfMethod, PlotObs, Stratum};
use crate::error::AppError;
use crate::math::{mean, std_dev, t_critical};
use crate::sampling::srs::{check_confidence, finite_population_correction, sampling_error_pct};

/// Per-stratum sample summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumEstimate {
    pub id: String,
    pub area: f64,
    pub weight: f64,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    /// Standard error of the stratum mean (with fpc when known).
    pub se: f64,
    pub fpc: f64,
}

/// Stratified estimate of the population mean (and total).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratifiedEstimate {
    pub strata: Vec<StratumEstimate>,
    pub total_area: f64,
    pub n: usize,
    pub mean: f64,
    pub variance: f64,
    pub se: f64,
    pub df_method: DfMethod,
    pub df: f64,
    pub t: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub sampling_error_pct: f64,
    /// Population total `ȳ_st · ΣA` (e.g. ft² of basal area in the stand).
    pub total: f64,
    pub total_se: f64,
}

/// Compute the stratified estimate.
///
/// Every stratum in `strata` must have at least two plots. `plot_area`, in the
/// same unit as stratum areas, enables the per-stratum finite population correction.
pub fn stratified_estimate(
    plots: &[PlotObs],
    strata: &[Stratum],
    confidence: f64,
    df_method: DfMethod,
    plot_area: Option<f64>,
) -> Result<StratifiedEstimate, AppError> {
    check_confidence(confidence)?;
    if strata.is_empty() {
        return Err(AppError::insufficient("No strata to estimate."));
    }
    if strata.iter().any(|s| !(s.area.is_finite() && s.area > 0.0)) {
        return Err(AppError::input("Stratum areas must be finite and > 0."));
    }
    if let Some(a) = plot_area {
        if !(a.is_finite() && a > 0.0) {
            return Err(AppError::input("Plot area must be finite and > 0."));
        }
    }

    let total_area: f64 = strata.iter().map(|s| s.area).sum();

    let mut rows = Vec::with_capacity(strata.len());
    for s in strata {
        let values: Vec<f64> = plots.iter().filter(|p| p.stratum == s.id).map(|p| p.bapa).collect();
        let n = values.len();
        if n < 2 {
            return Err(AppError::insufficient(format!(
                "Stratum '{}' has {n} plot(s); at least 2 are needed for a variance.",
                s.id
            )));
        }
        let m = mean(&values).ok_or_else(|| AppError::input("Plot values must be finite."))?;
        let sd = std_dev(&values).ok_or_else(|| AppError::input("Plot values must be finite."))?;
        let fpc = finite_population_correction(n, plot_area.map(|a| s.area / a))?;
        rows.push(StratumEstimate {
            id: s.id.clone(),
            area: s.area,
            weight: s.area / total_area,
            n,
            mean: m,
            sd,
            se: sd / (n as f64).sqrt() * fpc.sqrt(),
            fpc,
        });
    }

    let n: usize = rows.iter().map(|r| r.n).sum();
    let mean_st: f64 = rows.iter().map(|r| r.weight * r.mean).sum();

    // Variance contribution of each stratum: W_h² · s_h²/n_h · fpc_h = (W_h · se_h)².
    let contributions: Vec<f64> = rows.iter().map(|r| (r.weight * r.se).powi(2)).collect();
    let variance: f64 = contributions.iter().sum();
    let se = variance.sqrt();

    let df = match df_method {
        DfMethod::Simple => (n - rows.len()) as f64,
        DfMethod::Satterthwaite => satterthwaite_df(&contributions, &rows).unwrap_or((n - rows.len()) as f64),
    };
    let t = t_critical(confidence, df);
    let half_width = t * se;

    Ok(StratifiedEstimate {
        total_area,
        n,
        mean: mean_st,
        variance,
        se,
        df_method,
        df,
        t,
        ci_low: mean_st - half_width,
        ci_high: mean_st + half_width,
        sampling_error_pct: sampling_error_pct(half_width, mean_st),
        total: mean_st * total_area,
        total_se: se * total_area,
        strata: rows,
    })
}

/// Satterthwaite effective df: `(Σ g_h)² / Σ g_h² / (n_h - 1)`.
fn satterthwaite_df(contributions: &[f64], rows: &[StratumEstimate]) -> Option<f64> {
    let numer = contributions.iter().sum::<f64>().powi(2);
    let denom: f64 = contributions
        .iter()
        .zip(rows)
        .map(|(g, r)| g * g / (r.n as f64 - 1.0))
        .sum();
    (denom > 0.0).then(|| numer / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plot(stratum: &str, i: usize, bapa: f64) -> PlotObs {
        PlotObs {
            stratum: stratum.to_string(),
            plot: format!("{stratum}{i}"),
            bapa,
        }
    }

    fn fixture() -> (Vec<PlotObs>, Vec<Stratum>) {
        let mut plots = Vec::new();
        for (i, v) in [100.0, 120.0, 140.0, 160.0].into_iter().enumerate() {
            plots.push(plot("A", i, v));
        }
        for (i, v) in [40.0, 50.0, 60.0].into_iter().enumerate() {
            plots.push(plot("B", i, v));
        }
        let strata = vec![
            Stratum { id: "A".to_string(), area: 75.0 },
            Stratum { id: "B".to_string(), area: 25.0 },
        ];
        (plots, strata)
    }

    #[test]
    fn stratified_matches_hand_computation() {
        let (plots, strata) = fixture();
        let est = stratified_estimate(&plots, &strata, 0.95, DfMethod::Simple, None).unwrap();

        // ȳ_A = 130, s_A² = 2000/3; ȳ_B = 50, s_B² = 100.
        assert!((est.mean - (0.75 * 130.0 + 0.25 * 50.0)).abs() < 1e-12);
        let var = 0.75_f64.powi(2) * (2000.0 / 3.0) / 4.0 + 0.25_f64.powi(2) * 100.0 / 3.0;
        assert!((est.variance - var).abs() < 1e-9);
        assert_eq!(est.n, 7);
        assert_eq!(est.df, 5.0);
        assert!((est.total - est.mean * 100.0).abs() < 1e-9);
        assert!((est.strata[0].weight - 0.75).abs() < 1e-12);
    }

    #[test]
    fn satterthwaite_df_matches_hand_computation() {
        let (plots, strata) = fixture();
        let est = stratified_estimate(&plots, &strata, 0.95, DfMethod::Satterthwaite, None).unwrap();
        // g_A = 0.5625 · (2000/3) / 4 = 93.75, g_B = 0.0625 · 100 / 3 = 2.0833
        // df = (g_A + g_B)² / (g_A²/3 + g_B²/2) = 9184.03 / 2931.86
        assert!((est.df - 3.132_494).abs() < 1e-5, "df={}", est.df);
        assert!(est.df >= 2.0 && est.df <= 5.0);
        assert!((est.t - t_critical(0.95, est.df)).abs() < 1e-12);
    }

    #[test]
    fn stratum_with_one_plot_is_insufficient() {
        let (mut plots, strata) = fixture();
        plots.retain(|p| p.stratum == "A" || p.plot == "B0");
        let err = stratified_estimate(&plots, &strata, 0.95, DfMethod::Simple, None).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INSUFFICIENT);
        assert!(err.message().contains("'B'"));
    }

    #[test]
    fn plot_area_applies_fpc_per_stratum() {
        let (plots, strata) = fixture();
        let est = stratified_estimate(&plots, &strata, 0.95, DfMethod::Simple, Some(2.5)).unwrap();
        // N_B = 25 / 2.5 = 10 plots, n_B = 3.
        assert!((est.strata[1].fpc - 0.7).abs() < 1e-12);
        let plain = stratified_estimate(&plots, &strata, 0.95, DfMethod::Simple, None).unwrap();
        assert!(est.se < plain.se);
    }
}
