//! Student-t quantiles for confidence intervals.
//!
//! The CDF goes through the regularized incomplete beta function
//! (continued fraction, Lentz's method); the quantile refines a normal
//! approximation with Newton steps. For `p > 0.5` the t CDF is concave, so
//! Newton started from the (too small) normal quantile approaches the root
//! monotonically from the left.

use std::f64::consts::PI;

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const CF_MAX_ITER: usize = 300;
const CF_EPS: f64 = 1e-15;
const FPMIN: f64 = 1e-300;

/// `ln Γ(x)` via the Lanczos approximation (reflection for `x < 0.5`).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS[0];
    for (i, &c) in LANCZOS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularized incomplete beta `I_x(a, b)`.
pub fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x.is_nan() || a <= 0.0 || b <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fast for x < (a+1)/(a+b+2); use the
    // symmetry I_x(a,b) = 1 - I_{1-x}(b,a) on the other side.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = clamp_tiny(1.0 - qab * x / qap);
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=CF_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / clamp_tiny(1.0 + aa * d);
        c = clamp_tiny(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / clamp_tiny(1.0 + aa * d);
        c = clamp_tiny(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPS {
            break;
        }
    }
    h
}

fn clamp_tiny(v: f64) -> f64 {
    if v.abs() < FPMIN { FPMIN } else { v }
}

/// Standard normal quantile (Acklam's rational approximation, ~1e-9 relative).
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if !(p > 0.0 && p < 1.0) {
        return f64::NAN;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// CDF of Student's t with `df` degrees of freedom.
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if t.is_nan() || !(df > 0.0) {
        return f64::NAN;
    }
    if t == 0.0 {
        return 0.5;
    }
    let x = df / (df + t * t);
    let tail = 0.5 * regularized_incomplete_beta(x, df / 2.0, 0.5);
    if t > 0.0 { 1.0 - tail } else { tail }
}

/// PDF of Student's t with `df` degrees of freedom.
pub fn t_pdf(t: f64, df: f64) -> f64 {
    if t.is_nan() || !(df > 0.0) {
        return f64::NAN;
    }
    let half = df / 2.0;
    let ln_pdf = ln_gamma(half + 0.5)
        - 0.5 * (df * PI).ln()
        - ln_gamma(half)
        - (half + 0.5) * (1.0 + t * t / df).ln();
    ln_pdf.exp()
}

/// Quantile of Student's t: returns `t` with `P(T <= t) = p`.
///
/// Returns `NaN` for `p` outside `(0, 1)` or non-positive `df`.
pub fn t_quantile(p: f64, df: f64) -> f64 {
    if !(p > 0.0 && p < 1.0) || !(df > 0.0) {
        return f64::NAN;
    }
    if p == 0.5 {
        return 0.0;
    }
    if p < 0.5 {
        return -t_quantile(1.0 - p, df);
    }

    let mut t = inverse_normal_cdf(p);
    for _ in 0..200 {
        let pdf = t_pdf(t, df);
        if !(pdf > 0.0) {
            break;
        }
        let step = (t_cdf(t, df) - p) / pdf;
        t -= step;
        if step.abs() < 1e-12 * t.abs().max(1.0) {
            break;
        }
    }
    t
}

/// Two-sided critical value `t(1 - α/2, df)` for a confidence level `1 - α`.
pub fn t_critical(confidence: f64, df: f64) -> f64 {
    t_quantile(1.0 - (1.0 - confidence) / 2.0, df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ln_gamma_matches_factorials() {
        // Γ(5) = 24, Γ(0.5) = √π
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-12);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-12);
    }

    #[test]
    fn incomplete_beta_edges_and_symmetry() {
        assert_eq!(regularized_incomplete_beta(0.0, 2.0, 3.0), 0.0);
        assert_eq!(regularized_incomplete_beta(1.0, 2.0, 3.0), 1.0);
        // I_x(1,1) = x
        assert!((regularized_incomplete_beta(0.3, 1.0, 1.0) - 0.3).abs() < 1e-12);
        let lhs = regularized_incomplete_beta(0.4, 2.5, 4.0);
        let rhs = 1.0 - regularized_incomplete_beta(0.6, 4.0, 2.5);
        assert!((lhs - rhs).abs() < 1e-12);
    }

    #[test]
    fn normal_quantile_known_values() {
        assert!((inverse_normal_cdf(0.975) - 1.959_964).abs() < 1e-6);
        assert!(inverse_normal_cdf(0.5).abs() < 1e-12);
        assert!((inverse_normal_cdf(0.01) + 2.326_348).abs() < 1e-6);
    }

    #[test]
    fn t_quantile_matches_tables() {
        let cases = [
            (0.975, 1.0, 12.706_205),
            (0.975, 5.0, 2.570_582),
            (0.975, 10.0, 2.228_139),
            (0.95, 5.0, 2.015_048),
            (0.975, 30.0, 2.042_272),
            (0.995, 20.0, 2.845_340),
        ];
        for (p, df, expected) in cases {
            let got = t_quantile(p, df);
            assert!((got - expected).abs() < 1e-4, "t({p}, {df}) = {got}, expected {expected}");
        }
    }

    #[test]
    fn t_quantile_is_symmetric_and_inverts_cdf() {
        let q = t_quantile(0.1, 7.0);
        assert!((q + t_quantile(0.9, 7.0)).abs() < 1e-10);
        assert!((t_cdf(q, 7.0) - 0.1).abs() < 1e-10);
        assert!(t_quantile(1.0, 7.0).is_nan());
    }

    #[test]
    fn t_critical_is_two_sided() {
        assert!((t_critical(0.95, 10.0) - 2.228_139).abs() < 1e-4);
    }
}
