//! Top-N rankings of passenger volume by group.

use std::cmp::Ordering;

use dispatch_domain::{FlightTable, GroupKey};
use serde::{Deserialize, Serialize};

use crate::aggregation::grouped_passengers;
use crate::error::Result;

/// Label of a ranking row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingKey {
    /// Value of the grouping column
    Group(String),
    /// Placeholder row for an empty input
    NoData,
}

/// One ranked group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    /// Group label
    pub key: RankingKey,
    /// Passenger total
    pub value: f64,
    /// Share of the returned rows' total, in percent
    pub share_pct: f64,
}

/// Ranked passenger totals for one grouping column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    /// Column the rows are grouped by
    pub group_key: GroupKey,
    /// Rows by descending value
    pub rows: Vec<RankingRow>,
}

impl Ranking {
    /// True when the input had no records.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.rows.as_slice(), [row] if row.key == RankingKey::NoData)
    }
}

/// Top `limit` groups by passenger sum, descending, ties by ascending key.
pub fn top_groups(table: &FlightTable, group_key: GroupKey, limit: usize) -> Result<Ranking> {
    if table.is_empty() {
        return Ok(Ranking {
            group_key,
            rows: vec![RankingRow {
                key: RankingKey::NoData,
                value: 0.0,
                share_pct: 0.0,
            }],
        });
    }

    let mut sums = grouped_passengers(table, group_key)?;
    sums.sort_by(|(ka, va), (kb, vb)| {
        vb.partial_cmp(va)
            .unwrap_or(Ordering::Equal)
            .then_with(|| ka.cmp(kb))
    });
    sums.truncate(limit);

    let total: f64 = sums.iter().map(|(_, v)| v).sum();
    let rows = sums
        .into_iter()
        .map(|(key, value)| RankingRow {
            key: RankingKey::Group(key),
            value,
            share_pct: if total > 0.0 { value / total * 100.0 } else { 0.0 },
        })
        .collect();

    Ok(Ranking { group_key, rows })
}
