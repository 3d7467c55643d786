//! In-memory DuckDB table of flight records used for grouped queries.

use dispatch_domain::{FlightTable, GroupKey};
use duckdb::{params, Connection};

use crate::aggregation::{Metric, Period, Reducer};
use crate::error::Result;

/// One `GROUP BY` output row: two period components, optional group, value.
///
/// Period components are `(year, month)` for [`Period::Month`],
/// `(month, weekday from Monday = 0)` for [`Period::WeekdayByMonth`] and
/// `(0, 0)` for [`Period::None`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupedRow {
    pub major: i64,
    pub minor: i64,
    pub group: Option<String>,
    pub value: f64,
}

/// Flight records loaded into a private in-memory DuckDB database.
pub struct FlightStore {
    conn: Connection,
}

impl FlightStore {
    /// Open an in-memory database and ingest every record of `table`.
    pub fn load(table: &FlightTable) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        store.ingest(table)?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE flights (
                flight_no VARCHAR NOT NULL,
                dep_date DATE NOT NULL,
                airline VARCHAR NOT NULL,
                airport VARCHAR NOT NULL,
                passengers BIGINT NOT NULL,
                contract_short VARCHAR NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn ingest(&self, table: &FlightTable) -> Result<usize> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        let mut stmt = self.conn.prepare(
            r"
            INSERT INTO flights (
                flight_no, dep_date, airline, airport, passengers, contract_short
            ) VALUES (?, ?, ?, ?, ?, ?)
            ",
        )?;
        let mut count = 0;
        for record in table {
            stmt.execute(params![
                record.flight_no,
                record.dep_date.format("%Y-%m-%d").to_string(),
                record.airline,
                record.airport,
                i64::from(record.passengers),
                record.contract_short,
            ])?;
            count += 1;
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(count)
    }

    /// Run one grouped query; rows are ordered by period, then group.
    pub(crate) fn grouped(
        &self,
        period: Period,
        group_key: Option<GroupKey>,
        metric: Metric,
        reducer: Reducer,
    ) -> Result<Vec<GroupedRow>> {
        let (major, minor) = match period {
            Period::Month => ("year(dep_date)", "month(dep_date)"),
            Period::WeekdayByMonth => ("month(dep_date)", "isodow(dep_date) - 1"),
            Period::None => ("0", "0"),
        };
        let group = group_key.map_or("CAST(NULL AS VARCHAR)", column);
        let input = match metric {
            Metric::Passengers => "passengers",
            Metric::Departures => "1",
            Metric::Key(key) => column(key),
        };
        let value = match reducer {
            Reducer::Sum => format!("SUM({input})"),
            Reducer::Mean => format!("AVG({input})"),
            Reducer::CountDistinct => format!("COUNT(DISTINCT {input})"),
        };

        let query = format!(
            r"
            SELECT
                CAST({major} AS BIGINT) AS major,
                CAST({minor} AS BIGINT) AS minor,
                {group} AS grp,
                CAST({value} AS DOUBLE) AS val
            FROM flights
            GROUP BY major, minor, grp
            ORDER BY major, minor, grp
            "
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map([], |row| {
            Ok(GroupedRow {
                major: row.get(0)?,
                minor: row.get(1)?,
                group: row.get(2)?,
                value: row.get(3)?,
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn column(key: GroupKey) -> &'static str {
    match key {
        GroupKey::Airline => "airline",
        GroupKey::Airport => "airport",
        GroupKey::Route => "flight_no",
        GroupKey::Contract => "contract_short",
    }
}
