//! Local Outlier Factor over one-dimensional passenger counts.

use crate::error::{AnalyticsError, Result};
use crate::stats::percentile;

const LRD_EPSILON: f64 = 1e-10;

/// Negative local outlier factor of every value (lower is more abnormal).
///
/// Needs more than `n_neighbors` values.
pub fn negative_outlier_factors(values: &[f64], n_neighbors: usize) -> Result<Vec<f64>> {
    let required = n_neighbors + 1;
    if n_neighbors == 0 || values.len() < required {
        return Err(AnalyticsError::InsufficientData {
            detector: "local_outlier_factor",
            required: required.max(2),
            available: values.len(),
        });
    }

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();

    // Neighborhoods in sorted positions
    let neighbors: Vec<Vec<(usize, f64)>> = (0..sorted.len())
        .map(|pos| nearest_neighbors(&sorted, pos, n_neighbors))
        .collect();
    let k_distance: Vec<f64> = neighbors
        .iter()
        .map(|n| n.last().map_or(0.0, |&(_, d)| d))
        .collect();

    let lrd: Vec<f64> = neighbors
        .iter()
        .map(|hood| {
            let reach: f64 = hood
                .iter()
                .map(|&(o, d)| d.max(k_distance[o]))
                .sum::<f64>()
                / hood.len() as f64;
            1.0 / (reach + LRD_EPSILON)
        })
        .collect();

    let mut factors = vec![0.0; values.len()];
    for (pos, hood) in neighbors.iter().enumerate() {
        let mean_lrd = hood.iter().map(|&(o, _)| lrd[o]).sum::<f64>() / hood.len() as f64;
        factors[order[pos]] = -(mean_lrd / lrd[pos]);
    }
    Ok(factors)
}

/// Flags the `contamination` fraction of values with the lowest factors.
pub fn detect(values: &[f64], n_neighbors: usize, contamination: f64) -> Result<Vec<bool>> {
    let factors = negative_outlier_factors(values, n_neighbors)?;
    let offset = percentile(&factors, 100.0 * contamination).unwrap_or(f64::NEG_INFINITY);
    Ok(factors.iter().map(|&f| f < offset).collect())
}

/// The `k` positions closest to `pos` in a sorted slice, excluding `pos`,
/// ordered by distance.
fn nearest_neighbors(sorted: &[f64], pos: usize, k: usize) -> Vec<(usize, f64)> {
    let mut hood = Vec::with_capacity(k);
    let mut left = pos.checked_sub(1);
    let mut right = (pos + 1 < sorted.len()).then_some(pos + 1);

    while hood.len() < k {
        match (left, right) {
            (Some(l), Some(r)) if sorted[pos] - sorted[l] <= sorted[r] - sorted[pos] => {
                hood.push((l, sorted[pos] - sorted[l]));
                left = l.checked_sub(1);
            }
            (Some(l), None) => {
                hood.push((l, sorted[pos] - sorted[l]));
                left = l.checked_sub(1);
            }
            (_, Some(r)) => {
                hood.push((r, sorted[r] - sorted[pos]));
                right = (r + 1 < sorted.len()).then_some(r + 1);
            }
            (None, None) => break,
        }
    }
    hood
}
