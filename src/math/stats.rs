//! Descriptive statistics for plot and tree samples.
//!
//! Variance uses Welford's running update so large basal-area values with a
//! small spread do not lose precision to cancellation.

/// Arithmetic mean. `None` for empty input or any non-finite value.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() || !data.iter().all(|x| x.is_finite()) {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample variance (denominator `n - 1`). `None` when `n < 2`.
pub fn variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 || !data.iter().all(|x| x.is_finite()) {
        return None;
    }
    let mut count = 0.0;
    let mut running_mean = 0.0;
    let mut m2 = 0.0;
    for &x in data {
        count += 1.0;
        let delta = x - running_mean;
        running_mean += delta / count;
        m2 += delta * (x - running_mean);
    }
    Some((m2 / (count - 1.0)).max(0.0))
}

/// Sample standard deviation.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    variance(data).map(f64::sqrt)
}

/// Minimum and maximum of a non-empty, finite slice.
pub fn min_max(data: &[f64]) -> Option<(f64, f64)> {
    if data.is_empty() || !data.iter().all(|x| x.is_finite()) {
        return None;
    }
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variance_of_textbook_sample() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&v).unwrap() - 5.0).abs() < 1e-12);
        assert!((variance(&v).unwrap() - 32.0 / 7.0).abs() < 1e-12);
        assert!((std_dev(&v).unwrap() - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs_return_none() {
        assert!(mean(&[]).is_none());
        assert!(variance(&[1.0]).is_none());
        assert!(mean(&[1.0, f64::NAN]).is_none());
        assert!(min_max(&[]).is_none());
        assert_eq!(min_max(&[3.0, -1.0, 2.0]), Some((-1.0, 3.0)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn variance_non_negative(data in proptest::collection::vec(-1e6_f64..1e6, 2..60)) {
            let var = variance(&data).unwrap();
            prop_assert!(var >= 0.0);
        }

        #[test]
        fn shifting_does_not_change_variance(
            data in proptest::collection::vec(0.0_f64..200.0, 2..40),
            shift in -1e4_f64..1e4,
        ) {
            let shifted: Vec<f64> = data.iter().map(|x| x + shift).collect();
            let a = variance(&data).unwrap();
            let b = variance(&shifted).unwrap();
            prop_assert!((a - b).abs() <= 1e-6 * (1.0 + a));
        }
    }
}
