//! Plot allocation across strata.
//!
//! - proportional: `n_h = n · A_h / ΣA`
//! - optimal (Neyman): `n_h = n · A_h s_h / Σ A_k s_k`
//!
//! The fractional allocation is the formula value. Field crews need whole
//! plots, so we also return an integer allocation: every stratum first gets
//! `min_per_stratum`, then the remaining plots are split by the same shares
//! using largest-remainder rounding. Integer plot counts always sum to `n`.

use serde::{Deserialize, Serialize};

use crate::domain::{AllocationMethod, StratumSpec};
use crate::error::AppError;

/// Largest plot count an allocation or sample-size plan will produce.
pub const MAX_PLOTS: usize = 1_000_000;

/// One stratum's share of the plots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRow {
    pub id: String,
    pub area: f64,
    pub sd: f64,
    /// Allocation share in `[0, 1]`; shares sum to 1.
    pub share: f64,
    pub fractional: f64,
    pub plots: usize,
}

/// A complete allocation of `total` plots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub method: AllocationMethod,
    pub total: usize,
    pub min_per_stratum: usize,
    /// Set when optimal allocation had no variability to work with and
    /// fell back to proportional shares.
    pub fell_back_to_proportional: bool,
    pub rows: Vec<AllocationRow>,
}

/// Allocate `total` plots across `strata` with the given rule.
pub fn allocate(
    total: usize,
    strata: &[StratumSpec],
    method: AllocationMethod,
    min_per_stratum: usize,
) -> Result<Allocation, AppError> {
    let base = validate(total, strata, min_per_stratum)?;

    let (shares, fell_back) = match method {
        AllocationMethod::Proportional => (proportional_shares(strata), false),
        AllocationMethod::Optimal => match neyman_shares(strata) {
            Some(shares) => (shares, false),
            None => {
                log::warn!("all stratum SDs are zero; optimal allocation falls back to proportional");
                (proportional_shares(strata), true)
            }
        },
    };

    let mut plots = largest_remainder(&shares, total - base);
    for p in &mut plots {
        *p += min_per_stratum;
    }

    let rows = strata
        .iter()
        .zip(shares.iter().zip(plots))
        .map(|(s, (&share, plots))| AllocationRow {
            id: s.id.clone(),
            area: s.area,
            sd: s.sd,
            share,
            fractional: share * total as f64,
            plots,
        })
        .collect();

    Ok(Allocation {
        method,
        total,
        min_per_stratum,
        fell_back_to_proportional: fell_back,
        rows,
    })
}

/// Shares proportional to area.
pub fn proportional_shares(strata: &[StratumSpec]) -> Vec<f64> {
    let total_area: f64 = strata.iter().map(|s| s.area).sum();
    strata.iter().map(|s| s.area / total_area).collect()
}

/// Shares proportional to area × SD; `None` when every SD is zero.
pub fn neyman_shares(strata: &[StratumSpec]) -> Option<Vec<f64>> {
    let total: f64 = strata.iter().map(|s| s.area * s.sd).sum();
    if !(total > 0.0) {
        return None;
    }
    Some(strata.iter().map(|s| s.area * s.sd / total).collect())
}

/// Round `shares · total` to integers that sum exactly to `total`.
///
/// Floors first, then hands the leftover plots to the largest fractional
/// remainders (ties: larger share, then earlier stratum).
fn largest_remainder(shares: &[f64], total: usize) -> Vec<usize> {
    let exact: Vec<f64> = shares.iter().map(|s| s * total as f64).collect();
    let mut out: Vec<usize> = exact.iter().map(|v| (v.floor() as usize).min(total)).collect();
    let assigned = out.iter().fold(0_usize, |acc, &v| acc.saturating_add(v));
    let leftover = total.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&i, &j| {
        let ri = exact[i] - exact[i].floor();
        let rj = exact[j] - exact[j].floor();
        rj.total_cmp(&ri)
            .then(shares[j].total_cmp(&shares[i]))
            .then(i.cmp(&j))
    });
    for &i in order.iter().take(leftover) {
        out[i] += 1;
    }
    out
}

/// Check inputs and return the plots reserved by `min_per_stratum`.
fn validate(total: usize, strata: &[StratumSpec], min_per_stratum: usize) -> Result<usize, AppError> {
    if strata.is_empty() {
        return Err(AppError::input("Allocation needs at least one stratum."));
    }
    if total == 0 {
        return Err(AppError::input("Total plot count must be > 0."));
    }
    if total > MAX_PLOTS {
        return Err(AppError::input(format!(
            "Total plot count {total} exceeds the supported maximum of {MAX_PLOTS}."
        )));
    }
    for s in strata {
        if !(s.area.is_finite() && s.area > 0.0) {
            return Err(AppError::input(format!("Stratum '{}' area must be finite and > 0.", s.id)));
        }
        if !(s.sd.is_finite() && s.sd >= 0.0) {
            return Err(AppError::input(format!("Stratum '{}' SD must be finite and >= 0.", s.id)));
        }
    }
    for (i, s) in strata.iter().enumerate() {
        if strata[..i].iter().any(|o| o.id == s.id) {
            return Err(AppError::input(format!("Duplicate stratum id '{}'.", s.id)));
        }
    }
    match min_per_stratum.checked_mul(strata.len()) {
        Some(base) if base <= total => Ok(base),
        _ => Err(AppError::input(format!(
            "{total} plots cannot give {min_per_stratum} plot(s) to each of {} strata.",
            strata.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, area: f64, sd: f64) -> StratumSpec {
        StratumSpec {
            id: id.to_string(),
            area,
            sd,
        }
    }

    fn strata() -> Vec<StratumSpec> {
        vec![spec("MU1", 120.0, 30.0), spec("MU2", 80.0, 20.0), spec("MU3", 45.0, 35.0)]
    }

    #[test]
    fn proportional_allocation_sums_to_total() {
        let a = allocate(40, &strata(), AllocationMethod::Proportional, 0).unwrap();
        let frac: f64 = a.rows.iter().map(|r| r.fractional).sum();
        let whole: usize = a.rows.iter().map(|r| r.plots).sum();
        assert!((frac - 40.0).abs() < 1e-9);
        assert_eq!(whole, 40);
        // 40 · 120/245 = 19.59
        assert!((a.rows[0].fractional - 40.0 * 120.0 / 245.0).abs() < 1e-12);
        assert_eq!(a.rows[0].plots, 20);
    }

    #[test]
    fn optimal_allocation_follows_area_times_sd() {
        let a = allocate(40, &strata(), AllocationMethod::Optimal, 0).unwrap();
        let frac: f64 = a.rows.iter().map(|r| r.fractional).sum();
        assert!((frac - 40.0).abs() < 1e-9);
        assert_eq!(a.rows.iter().map(|r| r.plots).sum::<usize>(), 40);

        // A·s: 3600, 1600, 1575 -> MU1 gets the most, MU2 slightly more than MU3.
        let total_as = 3600.0 + 1600.0 + 1575.0;
        assert!((a.rows[0].fractional - 40.0 * 3600.0 / total_as).abs() < 1e-12);
        assert!(a.rows[0].plots > a.rows[1].plots);
        assert!(a.rows[1].fractional > a.rows[2].fractional);
        assert!(!a.fell_back_to_proportional);
    }

    #[test]
    fn optimal_with_zero_sd_falls_back() {
        let flat = vec![spec("A", 10.0, 0.0), spec("B", 30.0, 0.0)];
        let a = allocate(8, &flat, AllocationMethod::Optimal, 0).unwrap();
        assert!(a.fell_back_to_proportional);
        assert_eq!(a.rows[0].plots, 2);
        assert_eq!(a.rows[1].plots, 6);
    }

    #[test]
    fn minimum_per_stratum_is_respected() {
        let skewed = vec![spec("big", 1000.0, 50.0), spec("tiny", 1.0, 1.0)];
        let a = allocate(10, &skewed, AllocationMethod::Optimal, 2).unwrap();
        assert_eq!(a.rows[1].plots, 2);
        assert_eq!(a.rows.iter().map(|r| r.plots).sum::<usize>(), 10);
        assert!(allocate(3, &skewed, AllocationMethod::Optimal, 2).is_err());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(allocate(10, &[], AllocationMethod::Proportional, 0).is_err());
        assert!(allocate(0, &strata(), AllocationMethod::Proportional, 0).is_err());
        assert!(allocate(10, &[spec("A", -1.0, 1.0)], AllocationMethod::Proportional, 0).is_err());
        assert!(allocate(10, &[spec("A", 1.0, 1.0), spec("A", 2.0, 1.0)], AllocationMethod::Proportional, 0).is_err());
    }

    #[test]
    fn oversized_requests_are_input_errors() {
        let err = allocate(10, &strata(), AllocationMethod::Proportional, usize::MAX).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
        assert!(err.message().contains("cannot give"));

        let err = allocate(usize::MAX, &strata(), AllocationMethod::Optimal, 0).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
        assert!(err.message().contains("maximum"));

        let a = allocate(MAX_PLOTS, &strata(), AllocationMethod::Optimal, 1).unwrap();
        assert_eq!(a.rows.iter().map(|r| r.plots).sum::<usize>(), MAX_PLOTS);
    }

    #[test]
    fn largest_remainder_breaks_ties_deterministically() {
        let out = largest_remainder(&[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0], 10);
        assert_eq!(out, vec![4, 3, 3]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn strata_strategy() -> impl Strategy<Value = Vec<StratumSpec>> {
        proptest::collection::vec((0.1_f64..1e4, 0.0_f64..500.0), 1..8).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (area, sd))| StratumSpec {
                    id: format!("S{i}"),
                    area,
                    sd,
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn allocations_sum_to_total(
            strata in strata_strategy(),
            total in 1_usize..500,
            optimal in any::<bool>(),
        ) {
            let method = if optimal { AllocationMethod::Optimal } else { AllocationMethod::Proportional };
            let a = allocate(total, &strata, method, 0).unwrap();
            let frac: f64 = a.rows.iter().map(|r| r.fractional).sum();
            let whole: usize = a.rows.iter().map(|r| r.plots).sum();
            prop_assert!((frac - total as f64).abs() < 1e-6 * total as f64);
            prop_assert_eq!(whole, total);
            prop_assert!(a.rows.iter().all(|r| r.fractional >= 0.0));
        }

        #[test]
        fn integer_plots_stay_within_one_of_formula(
            strata in strata_strategy(),
            total in 1_usize..500,
        ) {
            let a = allocate(total, &strata, AllocationMethod::Proportional, 0).unwrap();
            for r in &a.rows {
                prop_assert!((r.plots as f64 - r.fractional).abs() < 1.0 + 1e-9);
            }
        }
    }
}
