//! Power-law biomass model evaluation.
//!
//! The fitter relies on three primitive operations:
//! - evaluate the model in the fit space (log or raw)
//! - fill a Jacobian row with respect to `(a, b)` (for Gauss-Newton)
//! - predict biomass on the raw scale (for residuals, plots, predictions)
//!
//! Parameters are kept as `(a, b)` in both spaces so standard errors are
//! reported for the quantities people quote, not for `ln(a)`.

use crate::domain::{FitSpace, PowerLaw};

/// Raw-scale biomass `a · dbh^b`.
pub fn predict(model: PowerLaw, dbh: f64) -> f64 {
    model.a * dbh.powf(model.b)
}

/// Raw-scale biomass with a back-transformation correction factor applied.
pub fn predict_corrected(model: PowerLaw, bias_correction: f64, dbh: f64) -> f64 {
    predict(model, dbh) * bias_correction
}

/// Observed response in the fit space.
pub fn response(space: FitSpace, biomass: f64) -> f64 {
    match space {
        FitSpace::Log => biomass.ln(),
        FitSpace::Raw => biomass,
    }
}

/// Model value in the fit space.
pub fn evaluate(space: FitSpace, model: PowerLaw, dbh: f64) -> f64 {
    match space {
        FitSpace::Log => model.a.ln() + model.b * dbh.ln(),
        FitSpace::Raw => predict(model, dbh),
    }
}

/// Fill `out` with `[∂f/∂a, ∂f/∂b]` of the fit-space model at `dbh`.
pub fn fill_jacobian_row(space: FitSpace, model: PowerLaw, dbh: f64, out: &mut [f64; 2]) {
    let ln_d = dbh.ln();
    match space {
        FitSpace::Log => {
            out[0] = 1.0 / model.a;
            out[1] = ln_d;
        }
        FitSpace::Raw => {
            let d_pow_b = dbh.powf(model.b);
            out[0] = d_pow_b;
            out[1] = model.a * d_pow_b * ln_d;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_and_raw_spaces_agree_after_transform() {
        let m = PowerLaw { a: 0.12, b: 2.4 };
        let d = 23.0;
        let raw = evaluate(FitSpace::Raw, m, d);
        let log = evaluate(FitSpace::Log, m, d);
        assert!((raw.ln() - log).abs() < 1e-12);
        assert!((response(FitSpace::Log, raw) - log).abs() < 1e-12);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let m = PowerLaw { a: 0.08, b: 2.6 };
        let d = 31.5;
        let h = 1e-7;
        for space in [FitSpace::Log, FitSpace::Raw] {
            let mut row = [0.0; 2];
            fill_jacobian_row(space, m, d, &mut row);

            let da = (evaluate(space, PowerLaw { a: m.a + h, ..m }, d)
                - evaluate(space, PowerLaw { a: m.a - h, ..m }, d))
                / (2.0 * h);
            let db = (evaluate(space, PowerLaw { b: m.b + h, ..m }, d)
                - evaluate(space, PowerLaw { b: m.b - h, ..m }, d))
                / (2.0 * h);
            assert!((row[0] - da).abs() <= 1e-5 * da.abs().max(1.0), "{space:?} da");
            assert!((row[1] - db).abs() <= 1e-5 * db.abs().max(1.0), "{space:?} db");
        }
    }

    #[test]
    fn corrected_prediction_scales() {
        let m = PowerLaw { a: 0.1, b: 2.0 };
        assert!((predict(m, 10.0) - 10.0).abs() < 1e-12);
        assert!((predict_corrected(m, 1.02, 10.0) - 10.2).abs() < 1e-12);
    }
}
