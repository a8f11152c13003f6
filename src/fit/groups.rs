//! Pooled and per-species biomass fits with diagnostics.
//!
//! The tool fits the pooled dataset first, then each species separately and
//! computes for every fit:
//! - SSE, residual SE `σ = sqrt(SSE/(n-2))`, RMSE, R² (fit space)
//! - AIC = n·ln(2π·SSE/n) + n + 2·(k+1), counting σ as a parameter
//! - parameter SEs from `σ²·(JᵀJ)⁻¹`, t values, and t-based CIs
//!
//! Guardrails:
//! 1. A species group needs `n >= k + MIN_N_BUFFER` trees, otherwise it is skipped
//! 2. A species whose fit fails is reported as skipped; the run continues
//! 3. The pooled fit failing is fatal

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::domain::{BiomassFit, FitQuality, FitSpace, ParamEstimate, SkippedGroup, TreeObs};
use crate::error::AppError;
use crate::fit::nls::{FitOptions, ModelFit, fit_power_law};
use crate::math::t_critical;

/// Number of model parameters (`a`, `b`).
pub const PARAM_COUNT: usize = 2;

/// Minimum number of extra observations beyond parameter count for a species fit.
pub const MIN_N_BUFFER: usize = 3;

/// Group label used for the pooled fit.
pub const POOLED_GROUP: &str = "all";

/// Output of pooled + per-species fitting.
#[derive(Debug, Clone)]
pub struct BiomassFits {
    pub global: BiomassFit,
    /// Species fits, sorted by species code.
    pub species: Vec<BiomassFit>,
    pub skipped: Vec<SkippedGroup>,
}

impl BiomassFits {
    /// The fit used to predict a given species: its own if available, else pooled.
    pub fn for_species(&self, species: &str) -> &BiomassFit {
        self.species
            .iter()
            .find(|f| f.group == species)
            .unwrap_or(&self.global)
    }
}

/// Diagnostic settings applied on top of the raw least-squares solution.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticOptions {
    pub confidence: f64,
    /// Apply `exp(σ²/2)` to back-transformed predictions of log-space fits.
    pub bias_correction: bool,
}

/// Fit the pooled model and, optionally, one model per species.
pub fn fit_groups(
    trees: &[TreeObs],
    opts: &FitOptions,
    diag: DiagnosticOptions,
    per_species: bool,
) -> Result<BiomassFits, AppError> {
    if !(diag.confidence > 0.0 && diag.confidence < 1.0) {
        return Err(AppError::input("Confidence level must be in (0, 1)."));
    }

    let pooled = fit_power_law(trees, opts)?;
    let global = to_biomass_fit(POOLED_GROUP, &pooled, opts.space, diag);
    log::info!(
        "pooled fit: n={} a={:.6} b={:.6} iterations={}",
        pooled.n,
        pooled.model.a,
        pooled.model.b,
        pooled.iterations
    );

    let mut species = Vec::new();
    let mut skipped = Vec::new();

    if per_species {
        let mut groups: BTreeMap<&str, Vec<TreeObs>> = BTreeMap::new();
        for t in trees {
            groups.entry(t.species.as_str()).or_default().push(t.clone());
        }

        let min_n = PARAM_COUNT + MIN_N_BUFFER;
        let mut eligible = Vec::new();
        for (code, group) in groups {
            if group.len() < min_n {
                skipped.push(SkippedGroup {
                    group: code.to_string(),
                    n: group.len(),
                    reason: format!("Underdetermined: n={} < k+{MIN_N_BUFFER}={min_n}", group.len()),
                });
            } else {
                eligible.push((code.to_string(), group));
            }
        }

        // Evaluate each species independently (parallel); collect keeps order.
        let outcomes: Vec<(String, usize, Result<ModelFit, AppError>)> = eligible
            .par_iter()
            .map(|(code, group)| (code.clone(), group.len(), fit_power_law(group, opts)))
            .collect();

        for (code, n, outcome) in outcomes {
            match outcome {
                Ok(fit) => species.push(to_biomass_fit(&code, &fit, opts.space, diag)),
                Err(e) => {
                    log::warn!("species {code}: fit failed: {e}");
                    skipped.push(SkippedGroup {
                        group: code,
                        n,
                        reason: e.message().to_string(),
                    });
                }
            }
        }
        skipped.sort_by(|a, b| a.group.cmp(&b.group));
    }

    for s in &skipped {
        log::warn!("skipped species {} (n={}): {}", s.group, s.n, s.reason);
    }

    Ok(BiomassFits {
        global,
        species,
        skipped,
    })
}

/// Turn a converged solution into a reportable fit with diagnostics.
pub fn to_biomass_fit(group: &str, fit: &ModelFit, space: FitSpace, diag: DiagnosticOptions) -> BiomassFit {
    let n = fit.n;
    let n_f = n as f64;
    let df = n.saturating_sub(PARAM_COUNT).max(1) as f64;

    let sigma = (fit.sse / df).sqrt();
    let rmse = (fit.sse / n_f).sqrt();
    let r_squared = if fit.tss > 0.0 { 1.0 - fit.sse / fit.tss } else { f64::NAN };
    let aic = aic(n, fit.sse, PARAM_COUNT);

    let bias_correction = match space {
        FitSpace::Log if diag.bias_correction => (sigma * sigma / 2.0).exp(),
        _ => 1.0,
    };

    let t = t_critical(diag.confidence, df);
    let se_a = sigma * fit.cov_unscaled[0].max(0.0).sqrt();
    let se_b = sigma * fit.cov_unscaled[3].max(0.0).sqrt();

    BiomassFit {
        group: group.to_string(),
        space,
        model: fit.model,
        params: vec![
            param_estimate("a", fit.model.a, se_a, t),
            param_estimate("b", fit.model.b, se_b, t),
        ],
        quality: FitQuality {
            n,
            iterations: fit.iterations,
            sse: fit.sse,
            sigma,
            rmse,
            r_squared,
            aic,
            bias_correction,
        },
    }
}

fn param_estimate(name: &str, estimate: f64, std_error: f64, t_crit: f64) -> ParamEstimate {
    let t_value = if std_error > 0.0 {
        estimate / std_error
    } else {
        f64::INFINITY.copysign(estimate)
    };
    ParamEstimate {
        name: name.to_string(),
        estimate,
        std_error,
        t_value,
        ci_low: estimate - t_crit * std_error,
        ci_high: estimate + t_crit * std_error,
    }
}

fn aic(n: usize, sse: f64, k: usize) -> f64 {
    let n_f = n as f64;
    let sse_per = (sse / n_f).max(1e-300);
    n_f * (2.0 * std::f64::consts::PI * sse_per).ln() + n_f + 2.0 * (k as f64 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PowerLaw;
    use crate::models::predict;

    fn opts() -> FitOptions {
        FitOptions {
            space: FitSpace::Log,
            start: PowerLaw { a: 0.1, b: 2.4 },
            max_iter: 200,
            tolerance: 1e-10,
        }
    }

    fn diag() -> DiagnosticOptions {
        DiagnosticOptions {
            confidence: 0.95,
            bias_correction: true,
        }
    }

    fn species_trees(code: &str, model: PowerLaw, n: usize) -> Vec<TreeObs> {
        let noise = [1.05, 0.96, 1.01, 0.98, 1.03, 0.97];
        (0..n)
            .map(|i| {
                let d = 8.0 + 3.0 * i as f64;
                TreeObs {
                    id: format!("{code}{i}"),
                    species: code.to_string(),
                    dbh: d,
                    biomass: predict(model, d) * noise[i % noise.len()],
                }
            })
            .collect()
    }

    #[test]
    fn per_species_fits_and_skips_small_groups() {
        let mut trees = species_trees("PSME", PowerLaw { a: 0.1, b: 2.4 }, 15);
        trees.extend(species_trees("ABGR", PowerLaw { a: 0.12, b: 2.3 }, 12));
        trees.extend(species_trees("TSHE", PowerLaw { a: 0.09, b: 2.5 }, 4));

        let fits = fit_groups(&trees, &opts(), diag(), true).unwrap();
        assert_eq!(fits.global.group, POOLED_GROUP);
        assert_eq!(fits.global.quality.n, 31);

        let codes: Vec<&str> = fits.species.iter().map(|f| f.group.as_str()).collect();
        assert_eq!(codes, vec!["ABGR", "PSME"]);
        assert_eq!(fits.skipped.len(), 1);
        assert_eq!(fits.skipped[0].group, "TSHE");

        let psme = fits.for_species("PSME");
        assert!((psme.model.b - 2.4).abs() < 0.05);
        assert_eq!(fits.for_species("TSHE").group, POOLED_GROUP);
    }

    #[test]
    fn diagnostics_are_consistent() {
        let trees = species_trees("PSME", PowerLaw { a: 0.1, b: 2.4 }, 20);
        let fits = fit_groups(&trees, &opts(), diag(), false).unwrap();
        let q = &fits.global.quality;
        assert!(fits.species.is_empty());
        assert!(q.r_squared > 0.99 && q.r_squared <= 1.0);
        assert!(q.sigma > q.rmse);
        assert!(q.bias_correction > 1.0);
        assert!((q.bias_correction - (q.sigma * q.sigma / 2.0).exp()).abs() < 1e-12);

        let b = &fits.global.params[1];
        assert!(b.ci_low < b.estimate && b.estimate < b.ci_high);
        assert!(b.std_error > 0.0);
        assert!((b.t_value - b.estimate / b.std_error).abs() < 1e-9);
    }

    #[test]
    fn raw_space_has_no_bias_correction() {
        let trees = species_trees("PSME", PowerLaw { a: 0.1, b: 2.4 }, 20);
        let mut o = opts();
        o.space = FitSpace::Raw;
        let fits = fit_groups(&trees, &o, diag(), false).unwrap();
        assert_eq!(fits.global.quality.bias_correction, 1.0);
    }

    #[test]
    fn aic_penalizes_worse_fit() {
        assert!(aic(30, 10.0, 2) < aic(30, 20.0, 2));
    }
}
