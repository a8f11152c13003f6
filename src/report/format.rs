//! Formatted terminal output.
//!
//! We keep formatting code in one place so the fitting and estimation code
//! stays clean and output changes stay localized.

use crate::domain::{BiomassConfig, BiomassFit, DatasetStats, Prediction, TreeResidual};
use crate::fit::BiomassFits;
use crate::report::Rankings;
use crate::sampling::{Allocation, SampleSizePlan, SrsEstimate, StratifiedEstimate};

/// Header, dataset stats, and the fit table for a biomass run.
pub fn format_biomass_summary(stats: &DatasetStats, fits: &BiomassFits, config: &BiomassConfig) -> String {
    let mut out = String::new();

    out.push_str("=== fst - Biomass Allometry (a·DBH^b) ===\n");
    out.push_str(&format!("Trees: {}\n", config.trees));
    out.push_str(&format!(
        "Fit space: {} | confidence: {:.0}%{}\n",
        config.space.display_name(),
        config.confidence * 100.0,
        if config.bias_correction && config.space == crate::domain::FitSpace::Log {
            " | bias correction: exp(σ²/2)"
        } else {
            ""
        }
    ));
    out.push_str(&format!(
        "Data: n={} | species={} | dbh=[{:.1}, {:.1}] | biomass=[{:.2}, {:.2}]\n",
        stats.n_trees, stats.n_species, stats.dbh_min, stats.dbh_max, stats.biomass_min, stats.biomass_max
    ));

    out.push_str("\nFits:\n");
    push_line(
        &mut out,
        format!(
            "{:<8} {:>5} {:>11} {:>9} {:>9} {:>9} {:>8} {:>10} {:>6}",
            "group", "n", "a", "b", "sigma", "rmse", "R²", "AIC", "iter"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<8} {:->5} {:->11} {:->9} {:->9} {:->9} {:->8} {:->10} {:->6}",
            "", "", "", "", "", "", "", "", ""
        ),
    );
    for fit in std::iter::once(&fits.global).chain(&fits.species) {
        push_line(&mut out, fit_row(fit));
    }

    if !fits.skipped.is_empty() {
        out.push_str("\nSkipped:\n");
        for s in &fits.skipped {
            out.push_str(&format!("  {} (n={}): {}\n", s.group, s.n, s.reason));
        }
    }

    out.push_str("\nParameters (pooled):\n");
    out.push_str(&format_params(&fits.global));
    out.push('\n');
    out
}

fn fit_row(fit: &BiomassFit) -> String {
    let q = &fit.quality;
    format!(
        "{:<8} {:>5} {:>11.6} {:>9.4} {:>9.4} {:>9.4} {:>8.4} {:>10.2} {:>6}",
        truncate(&fit.group, 8),
        q.n,
        fit.model.a,
        fit.model.b,
        q.sigma,
        q.rmse,
        q.r_squared,
        q.aic,
        q.iterations
    )
}

/// Parameter table: estimate, SE, t value, and CI.
pub fn format_params(fit: &BiomassFit) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<4} {:>12} {:>12} {:>9} {:>12} {:>12}",
            "", "estimate", "std.err", "t", "ci_low", "ci_high"
        ),
    );
    for p in &fit.params {
        push_line(
            &mut out,
            format!(
                "{:<4} {:>12.6} {:>12.6} {:>9.2} {:>12.6} {:>12.6}",
                p.name, p.estimate, p.std_error, p.t_value, p.ci_low, p.ci_high
            ),
        );
    }
    out
}

/// Largest residuals on each side.
pub fn format_rankings(rankings: &Rankings) -> String {
    let mut out = String::new();

    out.push_str("Largest positive residuals (heavier than predicted):\n");
    out.push_str(&format_residual_table(&rankings.above));
    out.push('\n');

    out.push_str("Largest negative residuals (lighter than predicted):\n");
    out.push_str(&format_residual_table(&rankings.below));

    out
}

fn format_residual_table(rows: &[TreeResidual]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<16} {:<8} {:>8} {:>12} {:>12} {:>12} {:>8} {:<8}",
            "id", "species", "dbh", "biomass", "fitted", "residual", "log_res", "model"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<16} {:-<8} {:->8} {:->12} {:->12} {:->12} {:->8} {:-<8}",
            "", "", "", "", "", "", "", ""
        ),
    );
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<16} {:<8} {:>8.1} {:>12.2} {:>12.2} {:>12.2} {:>8.3} {:<8}",
                truncate(&r.tree.id, 16),
                truncate(&r.tree.species, 8),
                r.tree.dbh,
                r.tree.biomass,
                r.fitted,
                r.residual,
                r.log_residual,
                truncate(&r.group, 8)
            ),
        );
    }
    out
}

/// Predicted biomass table.
pub fn format_predictions(predictions: &[Prediction]) -> String {
    let mut out = String::new();
    out.push_str("Predictions:\n");
    push_line(&mut out, format!("{:<8} {:>8} {:>14}", "group", "dbh", "biomass"));
    for p in predictions {
        push_line(
            &mut out,
            format!("{:<8} {:>8.1} {:>14.2}", truncate(&p.group, 8), p.dbh, p.biomass),
        );
    }
    out
}

/// SRS vs stratified comparison plus the per-stratum table.
pub fn format_sampling_summary(srs: &SrsEstimate, st: &StratifiedEstimate, relative_efficiency: f64) -> String {
    let mut out = String::new();
    out.push_str("=== fst - Basal Area per Acre: SRS vs Stratified ===\n");
    out.push_str(&format!(
        "Plots: n={} | strata={} | total area={:.1}\n\n",
        st.n,
        st.strata.len(),
        st.total_area
    ));

    push_line(
        &mut out,
        format!(
            "{:<12} {:>10} {:>9} {:>8} {:>7} {:>10} {:>10} {:>8}",
            "design", "mean", "se", "df", "t", "ci_low", "ci_high", "SE%"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<12} {:->10} {:->9} {:->8} {:->7} {:->10} {:->10} {:->8}",
            "", "", "", "", "", "", "", ""
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:<12} {:>10.3} {:>9.3} {:>8.1} {:>7.3} {:>10.3} {:>10.3} {:>8.2}",
            "SRS", srs.mean, srs.se, srs.df, srs.t, srs.ci_low, srs.ci_high, srs.sampling_error_pct
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:<12} {:>10.3} {:>9.3} {:>8.1} {:>7.3} {:>10.3} {:>10.3} {:>8.2}",
            "stratified", st.mean, st.se, st.df, st.t, st.ci_low, st.ci_high, st.sampling_error_pct
        ),
    );

    out.push_str(&format!(
        "\nRelative efficiency (Var SRS / Var stratified): {relative_efficiency:.3}\n"
    ));
    out.push_str(&format!("Stratified total: {:.1} ± {:.1} (SE)\n\n", st.total, st.total_se));

    out.push_str("Strata:\n");
    push_line(
        &mut out,
        format!(
            "{:<10} {:>10} {:>7} {:>4} {:>10} {:>9} {:>9}",
            "stratum", "area", "W_h", "n_h", "mean", "sd", "se"
        ),
    );
    for s in &st.strata {
        push_line(
            &mut out,
            format!(
                "{:<10} {:>10.1} {:>7.4} {:>4} {:>10.3} {:>9.3} {:>9.3}",
                truncate(&s.id, 10),
                s.area,
                s.weight,
                s.n,
                s.mean,
                s.sd,
                s.se
            ),
        );
    }
    out
}

/// One allocation as a table.
pub fn format_allocation(alloc: &Allocation) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Allocation: {} | n={}{}{}\n",
        alloc.method.display_name(),
        alloc.total,
        if alloc.min_per_stratum > 0 {
            format!(" | min/stratum={}", alloc.min_per_stratum)
        } else {
            String::new()
        },
        if alloc.fell_back_to_proportional {
            " | all SDs zero, used proportional"
        } else {
            ""
        }
    ));
    push_line(
        &mut out,
        format!(
            "{:<10} {:>10} {:>9} {:>7} {:>10} {:>6}",
            "stratum", "area", "sd", "share", "exact", "plots"
        ),
    );
    for r in &alloc.rows {
        push_line(
            &mut out,
            format!(
                "{:<10} {:>10.1} {:>9.3} {:>7.4} {:>10.3} {:>6}",
                truncate(&r.id, 10),
                r.area,
                r.sd,
                r.share,
                r.fractional,
                r.plots
            ),
        );
    }
    out
}

/// Plot counts needed for the target error, one line per design.
pub fn format_sample_sizes(plans: &[SampleSizePlan]) -> String {
    let mut out = String::new();
    if let Some(first) = plans.first() {
        out.push_str(&format!(
            "Plots for ±{:.1}% at {:.0}% confidence:\n",
            first.target_error_pct,
            first.confidence * 100.0
        ));
    }
    for p in plans {
        let split = p
            .allocation
            .as_ref()
            .map(|a| {
                let parts: Vec<String> = a.rows.iter().map(|r| format!("{}={}", r.id, r.plots)).collect();
                format!(" ({})", parts.join(", "))
            })
            .unwrap_or_default();
        push_line(
            &mut out,
            format!(
                "  {:<26} n={:<5} t={:.3}{split}",
                p.design.display_name(),
                p.plots,
                p.t
            ),
        );
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
