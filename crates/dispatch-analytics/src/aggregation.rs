//! Time-bucketing and group-aggregation primitives shared by every analysis.
//!
//! All grouped views (monthly series, weekday heatmap, per-route profiles,
//! ranking sums) go through [`aggregate_by_period`], which runs one SQL
//! `GROUP BY` over a [`FlightStore`] so that each view buckets and reduces
//! records the same way.

use std::collections::BTreeMap;

use chrono::{Month, Weekday};
use dispatch_domain::{
    month_from_index, FlightTable, GroupKey, MonthlyAggregate, RouteProfile, YearMonth, WEEKDAYS,
};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::store::{FlightStore, GroupedRow};

/// Time bucketing applied before reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    /// Calendar month (year + month).
    Month,
    /// Month of year x weekday, densely filled.
    WeekdayByMonth,
    /// No time bucketing.
    None,
}

/// Reduction applied to the metric within a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reducer {
    /// Total of the metric
    Sum,
    /// Arithmetic mean of the metric
    Mean,
    /// Number of distinct metric values
    CountDistinct,
}

/// Per-record value being reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    /// Passenger count of the record
    Passengers,
    /// Each record counts as one departure.
    Departures,
    /// Categorical column; only valid with [`Reducer::CountDistinct`].
    Key(GroupKey),
}

/// Bucket label of an aggregate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodKey {
    /// Calendar month
    Month(YearMonth),
    /// Month of year and weekday, across years
    MonthWeekday {
        /// Month of year
        month: Month,
        /// Day of week
        weekday: Weekday,
    },
    /// The whole table
    All,
}

/// One reduced bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Time bucket
    pub period: PeriodKey,
    /// Group value, when grouped
    pub group: Option<String>,
    /// Reduced metric
    pub value: f64,
}

/// Month x weekday matrix with fixed Monday..Sunday columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    /// Monday..Sunday
    pub columns: [Weekday; 7],
    /// Observed months, January first
    pub rows: Vec<HeatmapRow>,
}

/// One observed month of the heatmap, values in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRow {
    /// Month of year
    pub month: Month,
    /// One value per column
    pub values: [f64; 7],
}

impl AggregateRow {
    fn from_grouped(period: Period, row: GroupedRow) -> Result<Self> {
        let period = match period {
            Period::Month => {
                let month = u32::try_from(row.minor)
                    .ok()
                    .and_then(|m| YearMonth::new(i32::try_from(row.major).ok()?, m));
                PeriodKey::Month(month.ok_or_else(|| bad_bucket(&row))?)
            }
            Period::WeekdayByMonth => {
                let month = usize::try_from(row.major - 1)
                    .ok()
                    .and_then(month_from_index);
                let weekday = usize::try_from(row.minor)
                    .ok()
                    .and_then(|i| WEEKDAYS.get(i).copied());
                match (month, weekday) {
                    (Some(month), Some(weekday)) => PeriodKey::MonthWeekday { month, weekday },
                    _ => return Err(bad_bucket(&row)),
                }
            }
            Period::None => PeriodKey::All,
        };
        Ok(Self {
            period,
            group: row.group,
            value: row.value,
        })
    }
}

fn bad_bucket(row: &GroupedRow) -> AnalyticsError {
    AnalyticsError::AnalysisFailed(format!(
        "unexpected period bucket ({}, {})",
        row.major, row.minor
    ))
}

// Zero-fill every weekday of each observed (month, group), ordered by
// month then group.
fn fill_weekdays(rows: Vec<AggregateRow>) -> Vec<AggregateRow> {
    let mut cells: BTreeMap<(u32, Option<String>), (Month, [f64; 7])> = BTreeMap::new();
    for row in rows {
        let PeriodKey::MonthWeekday { month, weekday } = row.period else {
            continue;
        };
        let (_, values) = cells
            .entry((month.number_from_month(), row.group))
            .or_insert((month, [0.0; 7]));
        values[weekday.num_days_from_monday() as usize] = row.value;
    }

    cells
        .into_iter()
        .flat_map(|((_, group), (month, values))| {
            WEEKDAYS
                .into_iter()
                .zip(values)
                .map(move |(weekday, value)| AggregateRow {
                    period: PeriodKey::MonthWeekday { month, weekday },
                    group: group.clone(),
                    value,
                })
        })
        .collect()
}

fn aggregate_in(
    store: &FlightStore,
    period: Period,
    group_key: Option<GroupKey>,
    metric: Metric,
    reducer: Reducer,
) -> Result<Vec<AggregateRow>> {
    let rows = store
        .grouped(period, group_key, metric, reducer)?
        .into_iter()
        .map(|row| AggregateRow::from_grouped(period, row))
        .collect::<Result<Vec<_>>>()?;
    Ok(if period == Period::WeekdayByMonth {
        fill_weekdays(rows)
    } else {
        rows
    })
}

/// Bucket `table` by `period` (and optionally `group_key`) and reduce
/// `metric` with `reducer`.
///
/// Rows come out ordered by period, then group key. Only observed
/// combinations are emitted, except for [`Period::WeekdayByMonth`], which
/// emits all seven weekdays (zero-filled) for every observed month.
pub fn aggregate_by_period(
    table: &FlightTable,
    period: Period,
    group_key: Option<GroupKey>,
    metric: Metric,
    reducer: Reducer,
) -> Result<Vec<AggregateRow>> {
    if matches!(metric, Metric::Key(_)) && reducer != Reducer::CountDistinct {
        return Err(AnalyticsError::MalformedInput(format!(
            "{reducer:?} needs a numeric metric, got {metric:?}"
        )));
    }

    if table.is_empty() {
        return Ok(Vec::new());
    }

    let store = FlightStore::load(table)?;
    let rows = aggregate_in(&store, period, group_key, metric, reducer)?;

    tracing::debug!(
        records = table.len(),
        rows = rows.len(),
        ?period,
        ?group_key,
        ?metric,
        ?reducer,
        "Aggregated records"
    );

    Ok(rows)
}

/// Dense month x weekday matrix (Monday..Sunday columns).
pub fn weekday_heatmap(table: &FlightTable, metric: Metric, reducer: Reducer) -> Result<Heatmap> {
    let rows = aggregate_by_period(table, Period::WeekdayByMonth, None, metric, reducer)?;

    let mut heatmap = Heatmap {
        columns: WEEKDAYS,
        rows: Vec::new(),
    };
    for row in rows {
        let PeriodKey::MonthWeekday { month, weekday } = row.period else {
            continue;
        };
        let column = weekday.num_days_from_monday() as usize;
        match heatmap.rows.last_mut() {
            Some(last) if last.month == month => last.values[column] = row.value,
            _ => {
                let mut values = [0.0; 7];
                values[column] = row.value;
                heatmap.rows.push(HeatmapRow { month, values });
            }
        }
    }
    Ok(heatmap)
}

fn monthly(table: &FlightTable, metric: Metric, reducer: Reducer) -> Result<Vec<MonthlyAggregate>> {
    Ok(aggregate_by_period(table, Period::Month, None, metric, reducer)?
        .into_iter()
        .filter_map(|row| match row.period {
            PeriodKey::Month(month) => Some(MonthlyAggregate {
                month,
                value: row.value,
            }),
            _ => None,
        })
        .collect())
}

/// Total passengers per calendar month.
pub fn monthly_passengers(table: &FlightTable) -> Result<Vec<MonthlyAggregate>> {
    monthly(table, Metric::Passengers, Reducer::Sum)
}

/// Distinct flight numbers operated per calendar month.
pub fn monthly_distinct_flights(table: &FlightTable) -> Result<Vec<MonthlyAggregate>> {
    monthly(table, Metric::Key(GroupKey::Route), Reducer::CountDistinct)
}

/// Passenger sum per value of `key`, ordered by key.
pub fn grouped_passengers(table: &FlightTable, key: GroupKey) -> Result<Vec<(String, f64)>> {
    Ok(
        aggregate_by_period(table, Period::None, Some(key), Metric::Passengers, Reducer::Sum)?
            .into_iter()
            .map(|row| (row.group.unwrap_or_default(), row.value))
            .collect(),
    )
}

/// Mean load and departure count per flight number, ordered by flight number.
pub fn route_profiles(table: &FlightTable) -> Result<Vec<RouteProfile>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }

    let store = FlightStore::load(table)?;
    let route = Some(GroupKey::Route);
    let means = aggregate_in(&store, Period::None, route, Metric::Passengers, Reducer::Mean)?;
    let counts = aggregate_in(&store, Period::None, route, Metric::Departures, Reducer::Sum)?;

    Ok(means
        .into_iter()
        .zip(counts)
        .map(|(mean, count)| RouteProfile {
            flight_no: mean.group.unwrap_or_default(),
            mean_passengers: mean.value,
            departures: count.value as usize,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dispatch_domain::FlightRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table() -> FlightTable {
        FlightTable::new(vec![
            // 2024-01-01 is a Monday
            FlightRecord::new("SU100", date(2024, 1, 1), "SU", "SVO", 100),
            FlightRecord::new("SU100", date(2024, 1, 8), "SU", "SVO", 50),
            FlightRecord::new("S7200", date(2024, 1, 3), "S7", "OVB", 30),
            FlightRecord::new("S7200", date(2024, 3, 2), "S7", "OVB", 70),
            FlightRecord::new("UT300", date(2023, 3, 5), "UT", "VKO", 10),
        ])
    }

    #[test]
    fn test_monthly_sum_is_ordered_and_sparse() {
        let rows = monthly_passengers(&table()).unwrap();
        let labels: Vec<String> = rows.iter().map(|r| r.month.to_string()).collect();
        assert_eq!(labels, vec!["2023-03", "2024-01", "2024-03"]);
        assert_eq!(rows[1].value, 180.0);
    }

    #[test]
    fn test_monthly_distinct_flights() {
        let rows = monthly_distinct_flights(&table()).unwrap();
        assert_eq!(rows[1].value, 2.0);
        assert_eq!(rows[2].value, 1.0);
    }

    #[test]
    fn test_empty_input_yields_empty_result() {
        let rows = aggregate_by_period(
            &FlightTable::default(),
            Period::Month,
            Some(GroupKey::Airline),
            Metric::Passengers,
            Reducer::Sum,
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_sum_over_categorical_metric_is_rejected() {
        let err = aggregate_by_period(
            &table(),
            Period::None,
            None,
            Metric::Key(GroupKey::Airline),
            Reducer::Sum,
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedInput(_)));
    }

    #[test]
    fn test_heatmap_is_dense_with_fixed_columns() {
        let heatmap = weekday_heatmap(&table(), Metric::Departures, Reducer::Sum).unwrap();
        assert_eq!(heatmap.columns, WEEKDAYS);
        let months: Vec<Month> = heatmap.rows.iter().map(|r| r.month).collect();
        assert_eq!(months, vec![Month::January, Month::March]);

        // January: two Mondays, one Wednesday
        assert_eq!(heatmap.rows[0].values, [2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        // March merges 2023 (Sunday) and 2024 (Saturday)
        assert_eq!(heatmap.rows[1].values, [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_heatmap_of_empty_table_has_columns_and_no_rows() {
        let heatmap =
            weekday_heatmap(&FlightTable::default(), Metric::Departures, Reducer::Sum).unwrap();
        assert_eq!(heatmap.columns.len(), 7);
        assert!(heatmap.rows.is_empty());
    }

    #[test]
    fn test_route_profiles() {
        let profiles = route_profiles(&table()).unwrap();
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].flight_no, "S7200");
        assert_eq!(profiles[0].mean_passengers, 50.0);
        assert_eq!(profiles[1].flight_no, "SU100");
        assert_eq!(profiles[1].mean_passengers, 75.0);
        assert_eq!(profiles[1].departures, 2);
    }

    #[test]
    fn test_grouped_passengers() {
        let sums = grouped_passengers(&table(), GroupKey::Airline).unwrap();
        assert_eq!(
            sums,
            vec![
                ("S7".to_string(), 100.0),
                ("SU".to_string(), 150.0),
                ("UT".to_string(), 10.0)
            ]
        );
    }

    #[test]
    fn test_grouped_weekday_rows_are_dense_per_group() {
        let rows = aggregate_by_period(
            &table(),
            Period::WeekdayByMonth,
            Some(GroupKey::Airline),
            Metric::Passengers,
            Reducer::Sum,
        )
        .unwrap();
        // January: S7, SU; March: S7, UT
        assert_eq!(rows.len(), 4 * 7);
        let groups: Vec<&str> = rows
            .iter()
            .step_by(7)
            .map(|r| r.group.as_deref().unwrap())
            .collect();
        assert_eq!(groups, vec!["S7", "SU", "S7", "UT"]);
        assert_eq!(rows[7].value, 150.0);
        assert_eq!(
            rows[7].period,
            PeriodKey::MonthWeekday {
                month: Month::January,
                weekday: Weekday::Mon
            }
        );
        assert_eq!(rows.iter().map(|r| r.value).sum::<f64>(), 260.0);
    }
}
