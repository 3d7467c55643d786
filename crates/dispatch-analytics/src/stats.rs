//! Small numeric helpers shared by the detectors and the distribution view.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Summary statistics of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Sample size
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator); 0 below two points
    pub std_dev: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Middle value, interpolated for even counts
    pub median: f64,
    /// Total
    pub sum: f64,
}

impl SummaryStats {
    /// `None` for an empty sample.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let std_dev = if values.len() > 1 {
            values.iter().std_dev()
        } else {
            0.0
        };

        Some(Self {
            count: values.len(),
            mean: values.iter().mean(),
            std_dev,
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
            median: percentile(values, 50.0).unwrap_or(0.0),
            sum: values.iter().sum(),
        })
    }
}

/// Percentile `q` (0..=100) with linear interpolation between closest ranks.
///
/// Returns `None` for an empty sample.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Population mean and standard deviation, with a unit scale for constant input.
pub(crate) fn standardizer(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let mean = values.iter().mean();
    let std = values.iter().population_std_dev();
    if std.is_finite() && std > 0.0 {
        (mean, std)
    } else {
        (mean, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(4.0));
        assert_eq!(percentile(&values, 50.0), Some(2.5));
        assert!((percentile(&values, 1.0).unwrap() - 1.03).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_summary_stats() {
        let stats = SummaryStats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.median, 4.5);
        assert_eq!(stats.sum, 40.0);

        let single = SummaryStats::of(&[3.0]).unwrap();
        assert_eq!(single.std_dev, 0.0);
        assert!(SummaryStats::of(&[]).is_none());
    }

    #[test]
    fn test_standardizer_handles_constant_input() {
        assert_eq!(standardizer(&[5.0, 5.0, 5.0]), (5.0, 1.0));
        let (mean, std) = standardizer(&[1.0, 3.0]);
        assert_eq!(mean, 2.0);
        assert_eq!(std, 1.0);
    }
}
