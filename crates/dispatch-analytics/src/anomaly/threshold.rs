//! Mean + k·sigma threshold on passenger counts.

use statrs::statistics::Statistics;

/// Upper threshold `mean + sigma_multiplier * std` (sample std).
///
/// `None` when fewer than two values or zero spread; no value can exceed
/// an undefined threshold.
pub fn upper_threshold(values: &[f64], sigma_multiplier: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().mean();
    let std = values.iter().std_dev();
    (std.is_finite() && std > 0.0).then(|| mean + sigma_multiplier * std)
}

/// Flags for values strictly above the threshold.
pub fn detect(values: &[f64], sigma_multiplier: f64) -> (Option<f64>, Vec<bool>) {
    let threshold = upper_threshold(values, sigma_multiplier);
    let flags = values
        .iter()
        .map(|&v| threshold.is_some_and(|t| v > t))
        .collect();
    (threshold, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_extreme_value_is_flagged() {
        let mut values = vec![10.0; 10];
        values.push(10_000.0);
        let (threshold, flags) = detect(&values, 3.0);
        assert!(threshold.is_some());
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
        assert!(flags[10]);
    }

    #[test]
    fn test_ten_points_cannot_reach_three_sigma() {
        // One outlier among n points sits at most (n-1)/sqrt(n) sample sigmas out
        let mut values = vec![10.0; 9];
        values.push(10_000.0);
        let (_, flags) = detect(&values, 3.0);
        assert!(flags.iter().all(|f| !f));
    }

    #[test]
    fn test_threshold_uses_sample_std() {
        // mean 208, sample std sqrt(784080 / 4) = 442.74
        let (threshold, flags) = detect(&[10.0, 10.0, 10.0, 10.0, 1000.0], 3.0);
        let threshold = threshold.unwrap();
        assert!((threshold - 1536.22).abs() < 0.01, "threshold {threshold}");
        assert!(flags.iter().all(|f| !f));
    }

    #[test]
    fn test_constant_and_tiny_inputs_flag_nothing() {
        assert_eq!(detect(&[5.0, 5.0, 5.0], 3.0), (None, vec![false; 3]));
        assert_eq!(detect(&[5.0], 3.0), (None, vec![false]));
        assert_eq!(detect(&[], 3.0), (None, vec![]));
    }
}
