//! Linear least squares solver used by each Gauss-Newton step.
//!
//! Every iteration of the biomass fit linearizes the model around the current
//! parameters and solves
//!
//! ```text
//! minimize ‖J δ - r‖²
//! ```
//!
//! for the update `δ`. `J` is tall (one row per tree, two columns), so we use
//! SVD rather than `QR::solve`, which nalgebra only supports for square systems.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails. Diameter
    // columns spanning a narrow range make `J` nearly rank deficient.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Relative singular-value cutoff below which `J` is treated as rank deficient.
const RANK_TOL: f64 = 1e-10;

/// Compute `(JᵀJ)⁻¹` from the SVD of `J` (`V Σ⁻² Vᵀ`).
///
/// Returns `None` when `J` is numerically rank deficient, e.g. every tree in a
/// group has the same diameter.
pub fn normal_matrix_inverse(j: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let svd = j.clone().svd(false, true);
    let v_t = svd.v_t.as_ref()?;
    let s = &svd.singular_values;

    let s_max = s.max();
    if !(s_max.is_finite() && s_max > 0.0) || s.iter().any(|&v| v <= s_max * RANK_TOL) {
        return None;
    }

    let p = v_t.ncols();
    let mut inv = DMatrix::<f64>::zeros(p, p);
    for k in 0..s.len() {
        let row = v_t.row(k);
        inv += row.transpose() * row * (1.0 / (s[k] * s[k]));
    }
    Some(inv)
}
