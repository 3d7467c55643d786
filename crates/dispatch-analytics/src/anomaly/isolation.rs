//! Isolation forest over one-dimensional passenger counts.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use crate::error::{AnalyticsError, Result};
use crate::stats::percentile;

const EULER_GAMMA: f64 = 0.577_215_664_9;
const MIN_POINTS: usize = 2;

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn grow(values: &[f64], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if depth >= limit || values.len() <= 1 || min >= max {
        return Node::Leaf { size: values.len() };
    }

    let value = rng.gen_range(min..max);
    let (left, right): (Vec<f64>, Vec<f64>) = values.iter().partition(|&&v| v <= value);
    Node::Split {
        value,
        left: Box::new(grow(&left, depth + 1, limit, rng)),
        right: Box::new(grow(&right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, x: f64) -> f64 {
    let mut node = node;
    let mut depth = 0.0;
    loop {
        match node {
            Node::Leaf { size } => return depth + average_path_length(*size),
            Node::Split { value, left, right } => {
                node = if x <= *value { left } else { right };
                depth += 1.0;
            }
        }
    }
}

/// Anomaly score of every value, in `[-1, 0)`; lower is more abnormal.
pub fn scores(
    values: &[f64],
    n_estimators: usize,
    max_samples: usize,
    seed: u64,
) -> Result<Vec<f64>> {
    if values.len() < MIN_POINTS {
        return Err(AnalyticsError::InsufficientData {
            detector: "isolation_forest",
            required: MIN_POINTS,
            available: values.len(),
        });
    }

    let psi = max_samples.clamp(MIN_POINTS, values.len());
    let limit = (psi as f64).log2().ceil() as usize;
    let mut rng = StdRng::seed_from_u64(seed);

    let trees: Vec<Node> = (0..n_estimators.max(1))
        .map(|_| {
            let subsample: Vec<f64> = sample(&mut rng, values.len(), psi)
                .into_iter()
                .map(|i| values[i])
                .collect();
            grow(&subsample, 0, limit, &mut rng)
        })
        .collect();

    let normalizer = average_path_length(psi);
    Ok(values
        .iter()
        .map(|&x| {
            let mean_depth =
                trees.iter().map(|t| path_length(t, x)).sum::<f64>() / trees.len() as f64;
            -(2.0_f64.powf(-mean_depth / normalizer))
        })
        .collect())
}

/// Flags the `contamination` fraction of values with the lowest scores.
pub fn detect(
    values: &[f64],
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
) -> Result<Vec<bool>> {
    let scores = scores(values, n_estimators, max_samples, seed)?;
    let offset = percentile(&scores, 100.0 * contamination).unwrap_or(f64::NEG_INFINITY);
    Ok(scores.iter().map(|&s| s < offset).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_outlier() -> Vec<f64> {
        let mut values: Vec<f64> = (0..50).map(|i| 90.0 + f64::from(i % 21)).collect();
        values.insert(17, 5000.0);
        values
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.245).abs() < 1e-2);
    }

    #[test]
    fn test_isolated_value_has_lowest_score_and_is_flagged() {
        let values = with_outlier();
        let flags = detect(&values, 100, 256, 0.01, 42).unwrap();
        assert!(flags[17]);
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
    }

    #[test]
    fn test_scores_are_seeded() {
        let values = with_outlier();
        assert_eq!(
            scores(&values, 100, 256, 7).unwrap(),
            scores(&values, 100, 256, 7).unwrap()
        );
    }

    #[test]
    fn test_constant_input_flags_nothing() {
        let flags = detect(&[7.0; 40], 100, 256, 0.01, 42).unwrap();
        assert!(flags.iter().all(|f| !f));
    }

    #[test]
    fn test_single_point_is_insufficient() {
        let err = detect(&[1.0], 100, 256, 0.01, 42).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::InsufficientData {
                required: 2,
                available: 1,
                ..
            }
        ));
    }
}
