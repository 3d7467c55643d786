//! Distribution of mean route load.

use serde::{Deserialize, Serialize};

use dispatch_domain::FlightTable;

use crate::aggregation::route_profiles;
use crate::error::Result;
use crate::stats::SummaryStats;

/// One equal-width histogram bin; the last bin is closed on the right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Inclusive lower edge
    pub lower: f64,
    /// Upper edge
    pub upper: f64,
    /// Routes in the bin
    pub count: usize,
}

/// Histogram of per-route mean passengers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Bins in ascending order; empty without data
    pub bins: Vec<HistogramBin>,
    /// Summary of the binned values
    pub stats: Option<SummaryStats>,
}

/// Equal-width histogram of `values` with `bins` bins spanning min..max.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // A degenerate range still gets one bin of width 1
    let (min, max, bins) = if max > min {
        (min, max, bins)
    } else {
        (min - 0.5, max + 0.5, 1)
    };
    let width = (max - min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &v in values {
        let index = (((v - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

/// Histogram of mean load over routes that carried any passengers.
pub fn load_histogram(table: &FlightTable, bins: usize) -> Result<Histogram> {
    let loads: Vec<f64> = route_profiles(table)?
        .into_iter()
        .map(|p| p.mean_passengers)
        .filter(|&m| m > 0.0)
        .collect();

    tracing::debug!(routes = loads.len(), bins, "Built load histogram");

    Ok(Histogram {
        bins: histogram(&loads, bins),
        stats: SummaryStats::of(&loads),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dispatch_domain::FlightRecord;

    #[test]
    fn test_histogram_counts_every_value() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 10.0];
        let bins = histogram(&values, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), values.len());
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[4].count, 1);
        assert_eq!(bins[4].upper, 10.0);
    }

    #[test]
    fn test_constant_values_collapse_to_one_bin() {
        let bins = histogram(&[3.0, 3.0], 20);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 2);
    }

    #[test]
    fn test_idle_routes_are_excluded() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let table: FlightTable = vec![
            FlightRecord::new("A", date, "SU", "SVO", 0),
            FlightRecord::new("B", date, "SU", "SVO", 40),
            FlightRecord::new("C", date, "SU", "SVO", 80),
        ]
        .into_iter()
        .collect();

        let hist = load_histogram(&table, 20).unwrap();
        assert_eq!(hist.bins.iter().map(|b| b.count).sum::<usize>(), 2);
        assert_eq!(hist.stats.unwrap().count, 2);
    }

    #[test]
    fn test_empty_table_has_no_bins() {
        let hist = load_histogram(&FlightTable::default(), 20).unwrap();
        assert!(hist.bins.is_empty());
        assert!(hist.stats.is_none());
    }
}
