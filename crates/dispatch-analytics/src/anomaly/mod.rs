//! Passenger-count anomaly detection.
//!
//! Three detectors run side by side over the same values:
//!
//! - [`threshold`]: mean + 3 sigma cut-off
//! - [`lof`]: local outlier factor (density)
//! - [`isolation`]: isolation forest
//!
//! Each detector is independent. One that lacks data reports
//! [`DetectorOutcome::InsufficientData`] and leaves its flags unset, while the
//! others still run.

pub mod isolation;
pub mod lof;
pub mod threshold;

use dispatch_domain::{AnomalyFlag, FlightTable};
use serde::{Deserialize, Serialize};

use crate::config::AnomalyConfig;
use crate::error::{AnalyticsError, Result};

/// Status of one detector run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectorOutcome {
    /// Detector ran
    Completed {
        /// Records it flagged
        flagged: usize,
    },
    /// Too few records for the detector
    InsufficientData {
        /// Minimum record count
        required: usize,
        /// Records in the table
        available: usize,
    },
}

impl DetectorOutcome {
    /// True when the detector ran.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Per-record flags plus the status of every detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    /// One flag per record, in table order
    pub flags: Vec<AnomalyFlag>,
    /// Threshold used by the sigma detector, if defined
    pub threshold: Option<f64>,
    /// Sigma-threshold detector
    pub threshold_status: DetectorOutcome,
    /// Local outlier factor detector
    pub density_status: DetectorOutcome,
    /// Isolation forest detector
    pub isolation_status: DetectorOutcome,
}

impl AnomalyReport {
    /// Records flagged by at least one detector.
    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyFlag> {
        self.flags.iter().filter(|f| f.any())
    }
}

fn outcome(result: Result<Vec<bool>>) -> Result<(DetectorOutcome, Option<Vec<bool>>)> {
    match result {
        Ok(flags) => Ok((
            DetectorOutcome::Completed {
                flagged: flags.iter().filter(|f| **f).count(),
            },
            Some(flags),
        )),
        Err(AnalyticsError::InsufficientData {
            detector,
            required,
            available,
        }) => {
            tracing::debug!(detector, required, available, "Detector skipped");
            Ok((
                DetectorOutcome::InsufficientData {
                    required,
                    available,
                },
                None,
            ))
        }
        Err(e) => Err(e),
    }
}

/// Run all three detectors over the passenger counts of `table`.
pub fn detect_anomalies(table: &FlightTable, config: &AnomalyConfig) -> Result<AnomalyReport> {
    if table.is_empty() {
        return Err(AnalyticsError::EmptyFilterResult);
    }
    let values = table.passengers();

    let (threshold, threshold_flags) = threshold::detect(&values, config.sigma_multiplier);
    let threshold_status = DetectorOutcome::Completed {
        flagged: threshold_flags.iter().filter(|f| **f).count(),
    };

    let (density_status, density_flags) = outcome(lof::detect(
        &values,
        config.n_neighbors,
        config.contamination,
    ))?;
    let (isolation_status, isolation_flags) = outcome(isolation::detect(
        &values,
        config.n_estimators,
        config.max_samples,
        config.contamination,
        config.seed,
    ))?;

    let flags = table
        .iter()
        .enumerate()
        .map(|(i, record)| AnomalyFlag {
            record: record.clone(),
            threshold_anomaly: threshold_flags[i],
            density_anomaly: density_flags.as_ref().map(|f| f[i]),
            isolation_anomaly: isolation_flags.as_ref().map(|f| f[i]),
        })
        .collect();

    tracing::debug!(
        records = values.len(),
        ?threshold,
        ?threshold_status,
        ?density_status,
        ?isolation_status,
        "Ran anomaly detectors"
    );

    Ok(AnomalyReport {
        flags,
        threshold,
        threshold_status,
        density_status,
        isolation_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};
    use dispatch_domain::FlightRecord;

    fn table(loads: &[u32]) -> FlightTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        loads
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                FlightRecord::new("SU100", start + Days::new(i as u64), "SU", "SVO", p)
            })
            .collect()
    }

    #[test]
    fn test_small_table_skips_density_but_keeps_threshold() {
        let mut loads = vec![10; 10];
        loads.push(10_000);
        let report = detect_anomalies(&table(&loads), &AnomalyConfig::default()).unwrap();

        assert!(report.threshold.is_some());
        assert_eq!(
            report.density_status,
            DetectorOutcome::InsufficientData {
                required: 21,
                available: 11
            }
        );
        assert!(report.isolation_status.is_completed());
        assert!(report.flags[10].threshold_anomaly);
        assert_eq!(report.flags[10].density_anomaly, None);
        assert!(report.flags[10].isolation_anomaly.is_some());
        assert_eq!(report.anomalies().count(), 1);
    }

    #[test]
    fn test_single_record_runs_threshold_only() {
        let report = detect_anomalies(&table(&[42]), &AnomalyConfig::default()).unwrap();
        assert_eq!(report.threshold, None);
        assert!(!report.flags[0].threshold_anomaly);
        assert!(!report.density_status.is_completed());
        assert!(!report.isolation_status.is_completed());
    }

    #[test]
    fn test_empty_table_is_reported() {
        let err = detect_anomalies(&FlightTable::default(), &AnomalyConfig::default()).unwrap_err();
        assert!(matches!(err, AnalyticsError::EmptyFilterResult));
    }

    #[test]
    fn test_all_detectors_agree_on_extreme_value() {
        let mut loads: Vec<u32> = (0..40).map(|i| 100 + i % 7).collect();
        loads.push(9_000);
        let report = detect_anomalies(&table(&loads), &AnomalyConfig::default()).unwrap();
        let last = report.flags.last().unwrap();
        assert!(last.threshold_anomaly);
        assert_eq!(last.density_anomaly, Some(true));
        assert_eq!(last.isolation_anomaly, Some(true));
    }
}
