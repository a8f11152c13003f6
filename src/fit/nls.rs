//! Nonlinear least squares for the power-law biomass model.
//!
//! Given:
//! - diameters `d_i`
//! - observed biomass `y_i`
//! - a fit space (log or raw)
//! - starting values `(a₀, b₀)`
//!
//! we minimize `Σ (g(y_i) - f(d_i; a, b))²` with Gauss-Newton:
//! - linearize around the current `(a, b)` and solve `J δ ≈ r` by SVD
//! - halve the step until the SSE does not increase (and `a` stays positive)
//! - stop when the relative SSE change or relative step falls below tolerance
//!
//! The unscaled covariance `(JᵀJ)⁻¹` at the solution is returned for standard errors.

use nalgebra::{DMatrix, DVector};

use crate::domain::{FitSpace, PowerLaw, TreeObs};
use crate::error::AppError;
use crate::math::{normal_matrix_inverse, solve_least_squares};
use crate::models::{evaluate, fill_jacobian_row, response};

/// Step halvings attempted before declaring that no descent step exists.
const MAX_HALVINGS: usize = 30;

/// Options that affect how a single group is calibrated.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub space: FitSpace,
    pub start: PowerLaw,
    pub max_iter: usize,
    pub tolerance: f64,
}

/// Converged solution for a single group of trees.
#[derive(Debug, Clone)]
pub struct ModelFit {
    pub model: PowerLaw,
    pub sse: f64,
    /// Total sum of squares of the response around its mean (fit space).
    pub tss: f64,
    pub n: usize,
    pub iterations: usize,
    /// `(JᵀJ)⁻¹` at the solution, row-major `[aa, ab, ba, bb]`.
    pub cov_unscaled: [f64; 4],
}

/// Fit `biomass = a·dbh^b` to the given trees.
pub fn fit_power_law(trees: &[TreeObs], opts: &FitOptions) -> Result<ModelFit, AppError> {
    let n = trees.len();
    if n < 3 {
        return Err(AppError::insufficient(format!(
            "Need at least 3 trees to fit a two-parameter model (got {n})."
        )));
    }
    if !(opts.start.a.is_finite() && opts.start.a > 0.0 && opts.start.b.is_finite()) {
        return Err(AppError::input("Starting value `a` must be finite and > 0; `b` must be finite."));
    }
    if !(opts.tolerance.is_finite() && opts.tolerance > 0.0) || opts.max_iter == 0 {
        return Err(AppError::input("Invalid convergence settings (tolerance > 0, max_iter > 0)."));
    }
    if trees.iter().any(|t| !(t.dbh.is_finite() && t.dbh > 0.0 && t.biomass.is_finite() && t.biomass > 0.0)) {
        return Err(AppError::input("DBH and biomass must be finite and > 0 for every tree."));
    }

    let dbh: Vec<f64> = trees.iter().map(|t| t.dbh).collect();
    let y: Vec<f64> = trees.iter().map(|t| response(opts.space, t.biomass)).collect();

    let mut model = opts.start;
    let mut sse = sum_squares(opts.space, model, &dbh, &y);
    if !sse.is_finite() {
        return Err(AppError::compute("Starting values produce a non-finite SSE."));
    }

    let mut converged = false;
    let mut iterations = 0usize;

    for iter in 1..=opts.max_iter {
        iterations = iter;
        let (jac, resid) = linearize(opts.space, model, &dbh, &y);
        let delta = solve_least_squares(&jac, &resid)
            .ok_or_else(|| AppError::compute("Singular Jacobian during Gauss-Newton step."))?;

        let Some((candidate, candidate_sse, step)) = line_search(opts.space, model, sse, &delta, &dbh, &y) else {
            // No step along the Gauss-Newton direction lowers the SSE: we are at
            // the minimum to working precision.
            converged = true;
            break;
        };

        let rel_sse = (sse - candidate_sse) / sse.max(f64::MIN_POSITIVE);
        let rel_step = (step * delta[0] / model.a)
            .abs()
            .max((step * delta[1] / model.b.abs().max(1e-8)).abs());

        log::debug!(
            "gauss-newton iter={iter} a={:.6} b={:.6} sse={candidate_sse:.6e} step={step}",
            candidate.a,
            candidate.b
        );

        model = candidate;
        sse = candidate_sse;

        if rel_sse <= opts.tolerance || rel_step <= opts.tolerance.sqrt() {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(AppError::compute(format!(
            "Gauss-Newton did not converge in {} iterations (a={:.6}, b={:.6}).",
            opts.max_iter, model.a, model.b
        )));
    }

    let (jac, _) = linearize(opts.space, model, &dbh, &y);
    let cov = normal_matrix_inverse(&jac)
        .ok_or_else(|| AppError::compute("Singular gradient at the solution (all diameters equal?)."))?;

    let y_mean = y.iter().sum::<f64>() / n as f64;
    let tss = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();

    Ok(ModelFit {
        model,
        sse,
        tss,
        n,
        iterations,
        cov_unscaled: [cov[(0, 0)], cov[(0, 1)], cov[(1, 0)], cov[(1, 1)]],
    })
}

fn linearize(space: FitSpace, model: PowerLaw, dbh: &[f64], y: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
    let n = dbh.len();
    let mut jac = DMatrix::<f64>::zeros(n, 2);
    let mut resid = DVector::<f64>::zeros(n);
    let mut row = [0.0; 2];
    for i in 0..n {
        fill_jacobian_row(space, model, dbh[i], &mut row);
        jac[(i, 0)] = row[0];
        jac[(i, 1)] = row[1];
        resid[i] = y[i] - evaluate(space, model, dbh[i]);
    }
    (jac, resid)
}

fn line_search(
    space: FitSpace,
    model: PowerLaw,
    sse: f64,
    delta: &DVector<f64>,
    dbh: &[f64],
    y: &[f64],
) -> Option<(PowerLaw, f64, f64)> {
    let mut step = 1.0;
    for _ in 0..MAX_HALVINGS {
        let candidate = PowerLaw {
            a: model.a + step * delta[0],
            b: model.b + step * delta[1],
        };
        if candidate.a > 0.0 && candidate.b.is_finite() {
            let candidate_sse = sum_squares(space, candidate, dbh, y);
            if candidate_sse.is_finite() && candidate_sse < sse {
                return Some((candidate, candidate_sse, step));
            }
        }
        step *= 0.5;
    }
    None
}

fn sum_squares(space: FitSpace, model: PowerLaw, dbh: &[f64], y: &[f64]) -> f64 {
    dbh.iter()
        .zip(y)
        .map(|(&d, &yi)| {
            let r = yi - evaluate(space, model, d);
            r * r
        })
        .sum()
}
