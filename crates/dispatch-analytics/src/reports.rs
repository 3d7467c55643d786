//! Report assembly for analytics results.

use std::sync::Arc;

use dispatch_domain::{DateRange, FlightTable, MonthlyAggregate, SourceKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregation::{monthly_distinct_flights, monthly_passengers, Heatmap};
use crate::anomaly::AnomalyReport;
use crate::clustering::RouteClusters;
use crate::distribution::Histogram;
use crate::error::{AnalyticsError, Result};
use crate::forecast::Forecast;
use crate::ranking::Ranking;

/// Monthly passenger and flight totals for the selected range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyOverview {
    /// Passenger sum per month
    pub passengers: Vec<MonthlyAggregate>,
    /// Distinct flight numbers per month
    pub distinct_flights: Vec<MonthlyAggregate>,
    /// Passengers over the whole range
    pub total_passengers: f64,
    /// Records over the whole range
    pub total_departures: usize,
}

impl MonthlyOverview {
    /// Monthly totals of `table`.
    pub fn from_table(table: &FlightTable) -> Result<Self> {
        let passengers = monthly_passengers(table)?;
        let total_passengers = passengers.iter().map(|m| m.value).sum();
        Ok(Self {
            passengers,
            distinct_flights: monthly_distinct_flights(table)?,
            total_passengers,
            total_departures: table.len(),
        })
    }
}

/// Outcome of one report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Section<T> {
    /// The analysis ran
    Ready {
        /// Its result
        result: T,
    },
    /// The analysis could not run
    Unavailable {
        /// [`AnalyticsError::code`] or a host-specific code
        code: String,
        /// Error text
        detail: String,
    },
}

impl<T: Clone> Section<T> {
    /// Ready on success, unavailable on error.
    pub fn from_result(result: Result<Arc<T>>) -> Self {
        match result {
            Ok(value) => Section::Ready {
                result: Arc::unwrap_or_clone(value),
            },
            Err(e) => Section::from_error(&e),
        }
    }
}

impl<T> Section<T> {
    /// Unavailable section describing `error`.
    pub fn from_error(error: &AnalyticsError) -> Self {
        Section::Unavailable {
            code: error.code().to_string(),
            detail: error.to_string(),
        }
    }

    /// Result of a ready section.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready { result } => Some(result),
            Section::Unavailable { .. } => None,
        }
    }
}

/// Every analysis of one dataset over one date range.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    /// Analyzed dataset
    pub dataset_id: Uuid,
    /// Content hash of the dataset
    pub fingerprint: String,
    /// Where the dataset came from
    pub source: SourceKind,
    /// Date filter applied to every section
    pub range: DateRange,
    /// Records left after the date filter
    pub records: usize,
    /// Monthly totals
    pub overview: Section<MonthlyOverview>,
    /// Departures per month of year and weekday
    pub heatmap: Section<Heatmap>,
    /// One ranking per [`GroupKey::ALL`](dispatch_domain::GroupKey::ALL) entry
    pub rankings: Vec<Section<Ranking>>,
    /// Passenger forecast
    pub forecast: Section<Forecast>,
    /// Route load tiers
    pub clusters: Section<RouteClusters>,
    /// Anomaly flags
    pub anomalies: Section<AnomalyReport>,
    /// Route-load histogram
    pub load_distribution: Section<Histogram>,
}

impl AnalyticsReport {
    /// Report as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True when no record fell inside the range.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dispatch_domain::FlightRecord;

    #[test]
    fn test_monthly_overview_totals() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 4, d).unwrap();
        let table = FlightTable::new(vec![
            FlightRecord::new("SU100", day(1), "SU", "SVO", 10),
            FlightRecord::new("SU100", day(2), "SU", "SVO", 20),
            FlightRecord::new("SU200", day(3), "SU", "SVO", 30),
        ]);
        let overview = MonthlyOverview::from_table(&table).unwrap();
        assert_eq!(overview.total_passengers, 60.0);
        assert_eq!(overview.total_departures, 3);
        assert_eq!(overview.distinct_flights[0].value, 2.0);
    }

    #[test]
    fn test_section_carries_error_code() {
        let section: Section<Forecast> = Section::from_result(Err(
            AnalyticsError::InsufficientHistory {
                required: 2,
                available: 1,
            },
        ));
        assert!(section.ready().is_none());
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["status"], "UNAVAILABLE");
        assert_eq!(json["code"], "INSUFFICIENT_HISTORY");
    }
}
