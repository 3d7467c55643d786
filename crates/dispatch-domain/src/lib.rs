//! # Flight Dispatch Analytics - Domain Model
//!
//! Canonical flight-dispatch records, value objects and derived analytics
//! entities. These types are the single source of truth across the loader,
//! the analytics core and the report host.
//!
//! The canonical table ([`FlightTable`]) is immutable once built: analyses
//! borrow it and return owned result values, so any number of analyses may
//! read the same loaded dataset at once.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Datelike, Days, Month, Months, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Contract value used when a record carries no contract number.
pub const NO_CONTRACT: &str = "NO_CONTRACT";

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

/// Weekdays in display order, Monday first.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// Calendar month bucket, stored as the first day of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth(NaiveDate);

impl YearMonth {
    /// Month bucket containing `date`.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self(date - Days::new(u64::from(date.day0())))
    }

    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// First calendar day of the month (the period timestamp).
    #[must_use]
    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    /// Month of year, independent of the year.
    #[must_use]
    pub fn month_of_year(self) -> Month {
        MONTHS[self.0.month0() as usize]
    }

    /// The following month.
    #[must_use]
    pub fn succ(self) -> Self {
        Self(self.0 + Months::new(1))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m"))
    }
}

impl FromStr for YearMonth {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::MalformedInput(format!("invalid month bucket '{s}'"));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Month of year for a calendar index `0..12`.
#[must_use]
pub fn month_from_index(month0: usize) -> Option<Month> {
    MONTHS.get(month0).copied()
}

/// Inclusive calendar date range used to filter a table before analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// Categorical column a table can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupKey {
    Airline,
    Airport,
    /// Flight number, treated as a recurring service line.
    Route,
    Contract,
}

impl GroupKey {
    pub const ALL: [Self; 4] = [Self::Airline, Self::Route, Self::Airport, Self::Contract];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Airline => "AIRLINE",
            Self::Airport => "AIRPORT",
            Self::Route => "ROUTE",
            Self::Contract => "CONTRACT",
        }
    }

    /// Column value of `record` for this key.
    pub fn value<'a>(&self, record: &'a FlightRecord) -> &'a str {
        match self {
            Self::Airline => &record.airline,
            Self::Airport => &record.airport,
            Self::Route => &record.flight_no,
            Self::Contract => &record.contract_short,
        }
    }
}

impl FromStr for GroupKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "airline" => Ok(Self::Airline),
            "airport" => Ok(Self::Airport),
            "route" | "flight_no" | "flight" => Ok(Self::Route),
            "contract" | "contract_short" => Ok(Self::Contract),
            other => Err(DomainError::MalformedInput(format!(
                "unknown group key '{other}'"
            ))),
        }
    }
}

/// Route load tier assigned after clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadTier {
    Low,
    Medium,
    High,
}

impl LoadTier {
    /// Tiers in ascending load order.
    pub const ASCENDING: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW_LOAD",
            Self::Medium => "MEDIUM_LOAD",
            Self::High => "HIGH_LOAD",
        }
    }
}

/// Where a dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Upload,
    Directory,
    Sample,
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// One departure from the dispatch system, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightRecord {
    pub flight_no: String,
    pub dep_date: NaiveDate,
    pub airline: String,
    pub airport: String,
    pub passengers: u32,
    pub contract_short: String,
}

impl FlightRecord {
    pub fn new(
        flight_no: impl Into<String>,
        dep_date: NaiveDate,
        airline: impl Into<String>,
        airport: impl Into<String>,
        passengers: u32,
    ) -> Self {
        Self {
            flight_no: flight_no.into(),
            dep_date,
            airline: airline.into(),
            airport: airport.into(),
            passengers,
            contract_short: NO_CONTRACT.to_string(),
        }
    }

    #[must_use]
    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract_short = contract.into();
        self
    }
}

/// Immutable, cheaply clonable table of flight records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightTable {
    records: Arc<[FlightRecord]>,
}

impl FlightTable {
    pub fn new(records: Vec<FlightRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn records(&self) -> &[FlightRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlightRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records departing inside `range`, as a new table.
    #[must_use]
    pub fn filter(&self, range: &DateRange) -> Self {
        self.iter()
            .filter(|r| range.contains(r.dep_date))
            .cloned()
            .collect()
    }

    /// Earliest and latest departure date, if any.
    pub fn date_span(&self) -> Option<DateRange> {
        let start = self.iter().map(|r| r.dep_date).min()?;
        let end = self.iter().map(|r| r.dep_date).max()?;
        Some(DateRange { start, end })
    }

    /// Passenger counts in record order.
    pub fn passengers(&self) -> Vec<f64> {
        self.iter().map(|r| f64::from(r.passengers)).collect()
    }

    /// SHA-256 over the canonical rows, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for r in self.iter() {
            hasher.update(r.flight_no.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(r.dep_date.to_string().as_bytes());
            hasher.update(b"\x1f");
            hasher.update(r.airline.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(r.airport.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(r.passengers.to_le_bytes());
            hasher.update(b"\x1f");
            hasher.update(r.contract_short.as_bytes());
            hasher.update(b"\x1e");
        }
        hex::encode(hasher.finalize())
    }
}

impl FromIterator<FlightRecord> for FlightTable {
    fn from_iter<I: IntoIterator<Item = FlightRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FlightTable {
    type Item = &'a FlightRecord;
    type IntoIter = std::slice::Iter<'a, FlightRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A loaded table plus its identity, as handed over by a data source.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Identity of this particular load (one per upload).
    pub id: Uuid,
    /// Content fingerprint of `table`.
    pub fingerprint: String,
    pub source: SourceKind,
    pub table: FlightTable,
}

impl Dataset {
    pub fn new(source: SourceKind, table: FlightTable) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: table.fingerprint(),
            source,
            table,
        }
    }
}

// =============================================================================
// DERIVED ENTITIES
// =============================================================================

/// Monthly aggregate of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub month: YearMonth,
    pub value: f64,
}

/// Mean load of one route across its departures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProfile {
    pub flight_no: String,
    pub mean_passengers: f64,
    pub departures: usize,
}

/// Route profile tagged with its cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub flight_no: String,
    pub mean_passengers: f64,
    pub cluster_id: usize,
    pub tier: LoadTier,
}

/// Record with the verdict of each anomaly detector.
///
/// A detector flag is `None` when that detector could not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub record: FlightRecord,
    pub threshold_anomaly: bool,
    pub density_anomaly: Option<bool>,
    pub isolation_anomaly: Option<bool>,
}

impl AnomalyFlag {
    /// True when any detector flagged the record.
    #[must_use]
    pub fn any(&self) -> bool {
        self.threshold_anomaly
            || self.density_anomaly.unwrap_or(false)
            || self.isolation_anomaly.unwrap_or(false)
    }
}

/// One point of a fitted or projected monthly series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: YearMonth,
    pub yhat: f64,
    /// `None` when the fit leaves no residual degrees of freedom
    pub yhat_lower: Option<f64>,
    pub yhat_upper: Option<f64>,
    pub trend: f64,
    pub seasonal: f64,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_table() -> FlightTable {
        FlightTable::new(vec![
            FlightRecord::new("SU100", date(2024, 1, 5), "SU", "SVO", 120),
            FlightRecord::new("SU100", date(2024, 2, 9), "SU", "SVO", 80),
            FlightRecord::new("S7200", date(2024, 3, 31), "S7", "OVB", 60),
        ])
    }

    #[test]
    fn test_year_month_bucketing() {
        let ym = YearMonth::of(date(2024, 2, 29));
        assert_eq!(ym.first_day(), date(2024, 2, 1));
        assert_eq!(ym.to_string(), "2024-02");
        assert_eq!(ym.month_of_year(), Month::February);
        assert_eq!(ym.succ().to_string(), "2024-03");
        assert_eq!(YearMonth::of(date(2024, 12, 31)).succ().to_string(), "2025-01");
    }

    #[test]
    fn test_year_month_roundtrips_through_json() {
        let ym: YearMonth = "2023-11".parse().unwrap();
        let json = serde_json::to_string(&ym).unwrap();
        assert_eq!(json, "\"2023-11\"");
        assert_eq!(serde_json::from_str::<YearMonth>(&json).unwrap(), ym);
        assert!("2023-13".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        assert!(DateRange::new(date(2024, 2, 1), date(2024, 1, 1)).is_err());
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 1, 31)));
        assert!(!range.contains(date(2024, 2, 1)));
    }

    #[test]
    fn test_filter_is_inclusive_and_leaves_source_untouched() {
        let table = sample_table();
        let range = DateRange::new(date(2024, 1, 5), date(2024, 2, 9)).unwrap();
        let filtered = table.filter(&range);
        assert_eq!(filtered.len(), 2);
        assert_eq!(table.len(), 3);

        let empty = table.filter(&DateRange::new(date(2030, 1, 1), date(2030, 1, 2)).unwrap());
        assert!(empty.is_empty());
        assert!(empty.date_span().is_none());
    }

    #[test]
    fn test_date_span() {
        let span = sample_table().date_span().unwrap();
        assert_eq!(span.start(), date(2024, 1, 5));
        assert_eq!(span.end(), date(2024, 3, 31));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = sample_table();
        let b = sample_table();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut records = a.records().to_vec();
        records[0].passengers += 1;
        assert_ne!(a.fingerprint(), FlightTable::new(records).fingerprint());
    }

    #[test]
    fn test_dataset_ids_are_unique_per_load() {
        let a = Dataset::new(SourceKind::Sample, sample_table());
        let b = Dataset::new(SourceKind::Sample, sample_table());
        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_group_key_values() {
        let record = FlightRecord::new("SU100", date(2024, 1, 5), "SU", "SVO", 120)
            .with_contract("K-17");
        assert_eq!(GroupKey::Route.value(&record), "SU100");
        assert_eq!(GroupKey::Airline.value(&record), "SU");
        assert_eq!(GroupKey::Airport.value(&record), "SVO");
        assert_eq!(GroupKey::Contract.value(&record), "K-17");
        assert_eq!("flight_no".parse::<GroupKey>().unwrap(), GroupKey::Route);
        assert!("gate".parse::<GroupKey>().is_err());
    }

    #[test]
    fn test_anomaly_flag_any() {
        let record = FlightRecord::new("SU100", date(2024, 1, 5), "SU", "SVO", 120);
        let flag = AnomalyFlag {
            record,
            threshold_anomaly: false,
            density_anomaly: None,
            isolation_anomaly: Some(true),
        };
        assert!(flag.any());
    }
}
