//! Simple random sampling estimate of mean basal area.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{mean, std_dev, t_critical};

/// SRS estimate: mean, SE, and t-based confidence interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsEstimate {
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub se: f64,
    /// Finite population correction `1 - n/N` (1.0 when `N` is unknown).
    pub fpc: f64,
    pub df: f64,
    pub t: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Half-width of the CI as a percentage of the mean.
    pub sampling_error_pct: f64,
}

/// Estimate the mean from a simple random sample of plot values.
///
/// `population_plots` is the number of plots that fit in the population
/// (area / plot area); when given, the finite population correction applies.
pub fn srs_estimate(values: &[f64], confidence: f64, population_plots: Option<f64>) -> Result<SrsEstimate, AppError> {
    check_confidence(confidence)?;
    let n = values.len();
    if n < 2 {
        return Err(AppError::insufficient(format!(
            "SRS needs at least 2 plots to estimate variance (got {n})."
        )));
    }

    let mean = mean(values).ok_or_else(|| AppError::input("Plot values must be finite."))?;
    let sd = std_dev(values).ok_or_else(|| AppError::input("Plot values must be finite."))?;
    let fpc = finite_population_correction(n, population_plots)?;

    let se = sd / (n as f64).sqrt() * fpc.sqrt();
    let df = (n - 1) as f64;
    let t = t_critical(confidence, df);
    let half_width = t * se;

    Ok(SrsEstimate {
        n,
        mean,
        sd,
        se,
        fpc,
        df,
        t,
        ci_low: mean - half_width,
        ci_high: mean + half_width,
        sampling_error_pct: sampling_error_pct(half_width, mean),
    })
}

pub(crate) fn finite_population_correction(n: usize, population_plots: Option<f64>) -> Result<f64, AppError> {
    let Some(big_n) = population_plots else {
        return Ok(1.0);
    };
    if !(big_n.is_finite() && big_n > 0.0) {
        return Err(AppError::input("Population size (plots) must be finite and > 0."));
    }
    if n as f64 > big_n {
        return Err(AppError::input(format!(
            "Sampled {n} plots but the population only holds {big_n:.1}; check the plot area."
        )));
    }
    Ok(1.0 - n as f64 / big_n)
}

pub(crate) fn sampling_error_pct(half_width: f64, mean: f64) -> f64 {
    if mean != 0.0 {
        100.0 * half_width / mean.abs()
    } else {
        f64::NAN
    }
}

pub(crate) fn check_confidence(confidence: f64) -> Result<(), AppError> {
    if confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(AppError::input(format!("Confidence level must be in (0, 1), got {confidence}.")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srs_matches_hand_computation() {
        // mean 100, sd = sqrt(250) for [80, 90, 100, 110, 120]
        let v = [80.0, 90.0, 100.0, 110.0, 120.0];
        let est = srs_estimate(&v, 0.95, None).unwrap();
        assert_eq!(est.n, 5);
        assert!((est.mean - 100.0).abs() < 1e-12);
        assert!((est.sd - 250.0_f64.sqrt()).abs() < 1e-12);
        assert!((est.se - (250.0_f64 / 5.0).sqrt()).abs() < 1e-12);
        // t(0.975, 4) = 2.776445
        assert!((est.t - 2.776_445).abs() < 1e-4);
        assert!((est.ci_high - est.mean - est.t * est.se).abs() < 1e-12);
        assert!((est.sampling_error_pct - est.t * est.se).abs() < 1e-9);
    }

    #[test]
    fn fpc_shrinks_standard_error() {
        let v = [80.0, 90.0, 100.0, 110.0, 120.0];
        let plain = srs_estimate(&v, 0.95, None).unwrap();
        let fpc = srs_estimate(&v, 0.95, Some(10.0)).unwrap();
        assert!((fpc.fpc - 0.5).abs() < 1e-12);
        assert!((fpc.se - plain.se * 0.5_f64.sqrt()).abs() < 1e-12);
        assert!(srs_estimate(&v, 0.95, Some(3.0)).is_err());
    }

    #[test]
    fn single_plot_is_insufficient() {
        let err = srs_estimate(&[42.0], 0.95, None).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INSUFFICIENT);
        assert!(srs_estimate(&[1.0, 2.0], 1.5, None).is_err());
    }
}
