//! Column mapping and type coercion from dispatch-system CSV exports to
//! canonical [`FlightRecord`]s.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use dispatch_domain::{FlightRecord, NO_CONTRACT};
use encoding_rs::WINDOWS_1251;

use crate::error::{LoadError, Result};

/// Default field delimiter of dispatch exports.
pub const DEFAULT_DELIMITER: u8 = b';';

const FLIGHT_NO: &[&str] = &["Номер рейса", "flight_no"];
const DEP_DATE: &[&str] = &["Дата вылета", "dep_date"];
const AIRLINE: &[&str] = &["Код а/к", "airline"];
const AIRPORT: &[&str] = &["Код а/п", "airport"];
const PASSENGERS: &[&str] = &["Кол-во пасс.", "passengers"];
const CONTRACT: &[&str] = &["№ договора", "contract_short", "contract"];

const DATE_FORMATS: [&str; 3] = ["%d.%m.%Y", "%d/%m/%Y", "%Y-%m-%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Positions of the canonical columns in a CSV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub flight_no: usize,
    pub dep_date: usize,
    pub airline: usize,
    pub airport: usize,
    pub passengers: Option<usize>,
    pub contract: Option<usize>,
}

impl ColumnMap {
    /// Locate canonical columns by source or canonical header name.
    ///
    /// Headers starting with `Unnamed` are ignored.
    pub fn from_headers(headers: &StringRecord) -> Result<Self> {
        let names: Vec<&str> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim())
            .collect();

        let find = |aliases: &[&str]| {
            names
                .iter()
                .position(|name| !name.starts_with("Unnamed") && aliases.contains(name))
        };
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| {
                LoadError::MalformedInput(format!("missing required column '{}'", aliases[0]))
            })
        };

        Ok(Self {
            flight_no: require(FLIGHT_NO)?,
            dep_date: require(DEP_DATE)?,
            airline: require(AIRLINE)?,
            airport: require(AIRPORT)?,
            passengers: find(PASSENGERS),
            contract: find(CONTRACT),
        })
    }

    /// Canonical record from a CSV row; `None` when the date is unusable.
    pub fn record(&self, row: &StringRecord) -> Option<FlightRecord> {
        let field = |index: usize| row.get(index).unwrap_or("").trim();

        let dep_date = parse_date(field(self.dep_date))?;
        let passengers = self.passengers.map_or(0, |i| parse_passengers(field(i)));
        let contract = self
            .contract
            .map_or_else(|| NO_CONTRACT.to_string(), |i| contract_token(field(i)));

        Some(
            FlightRecord::new(
                field(self.flight_no),
                dep_date,
                field(self.airline),
                field(self.airport),
                passengers,
            )
            .with_contract(contract),
        )
    }
}

/// Day-first date, optionally followed by a time of day.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Passenger count; unparsable or negative values become 0.
pub fn parse_passengers(raw: &str) -> u32 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.trunc() as u32,
        _ => 0,
    }
}

/// First whitespace-delimited token of a contract number.
pub fn contract_token(raw: &str) -> String {
    raw.split_whitespace()
        .next()
        .unwrap_or(NO_CONTRACT)
        .to_string()
}

/// Text of an export: UTF-8 when the bytes are valid UTF-8, otherwise
/// Windows-1251, the encoding dispatch systems export with.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let (text, _, had_errors) = WINDOWS_1251.decode(bytes);
            if had_errors {
                tracing::warn!("Replaced undecodable bytes in windows-1251 input");
            }
            text
        }
    }
}

/// Decode and normalize every row of a CSV export.
///
/// Rows with an unparsable departure date are dropped.
pub fn read_records(bytes: &[u8], delimiter: u8) -> Result<Vec<FlightRecord>> {
    let text = decode(bytes);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for row in reader.records() {
        match columns.record(&row?) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "Dropped rows with unparsable departure dates");
    }
    tracing::debug!(rows = records.len(), "Normalized CSV rows");

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_source_headers_are_mapped() {
        let csv = "\u{feff}Номер рейса;Дата вылета;Код а/к;Код а/п;Кол-во пасс.;№ договора;Unnamed: 6\n\
                   SU100;05.01.2024;SU;SVO;120;Д-17 от 01.01.2024;\n\
                   SU101;06.01.2024 14:30;SU;LED;abc;;\n";
        let records = read_records(csv.as_bytes(), DEFAULT_DELIMITER).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].flight_no, "SU100");
        assert_eq!(records[0].dep_date, date(2024, 1, 5));
        assert_eq!(records[0].passengers, 120);
        assert_eq!(records[0].contract_short, "Д-17");
        assert_eq!(records[1].dep_date, date(2024, 1, 6));
        assert_eq!(records[1].passengers, 0);
        assert_eq!(records[1].contract_short, NO_CONTRACT);
    }

    #[test]
    fn test_canonical_headers_and_optional_columns() {
        let csv = "flight_no,dep_date,airline,airport\nS7200,2024-03-02,S7,OVB\n";
        let records = read_records(csv.as_bytes(), b',').unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].passengers, 0);
        assert_eq!(records[0].contract_short, NO_CONTRACT);
    }

    #[test]
    fn test_missing_date_column_is_malformed() {
        let csv = "Номер рейса;Код а/к;Код а/п\nSU100;SU;SVO\n";
        let err = read_records(csv.as_bytes(), DEFAULT_DELIMITER).unwrap_err();
        assert!(matches!(err, LoadError::MalformedInput(_)));
    }

    #[test]
    fn test_unparsable_dates_drop_rows() {
        let csv = "flight_no;dep_date;airline;airport;passengers\n\
                   A;31.02.2024;SU;SVO;1\n\
                   B;not a date;SU;SVO;2\n\
                   C;29.02.2024;SU;SVO;3\n";
        let records = read_records(csv.as_bytes(), DEFAULT_DELIMITER).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].flight_no, "C");
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_date("05.01.2024"), Some(date(2024, 1, 5)));
        assert_eq!(parse_date("05/01/2024"), Some(date(2024, 1, 5)));
        assert_eq!(parse_date(" 2024-01-05 "), Some(date(2024, 1, 5)));
        assert_eq!(parse_date("05.01.2024 23:59:59"), Some(date(2024, 1, 5)));
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_passenger_coercion() {
        assert_eq!(parse_passengers("12"), 12);
        assert_eq!(parse_passengers("12.0"), 12);
        assert_eq!(parse_passengers(" 12 "), 12);
        assert_eq!(parse_passengers("-4"), 0);
        assert_eq!(parse_passengers(""), 0);
        assert_eq!(parse_passengers("n/a"), 0);
    }

    #[test]
    fn test_windows_1251_export_is_decoded() {
        let text = "Номер рейса;Дата вылета;Код а/к;Код а/п;Кол-во пасс.;№ договора\n\
                    SU100;05.01.2024;SU;SVO;120;Д-17 от 01.01.2024\n";
        let (bytes, _, had_errors) = WINDOWS_1251.encode(text);
        assert!(!had_errors);
        assert!(std::str::from_utf8(&bytes).is_err());

        let records = read_records(&bytes, DEFAULT_DELIMITER).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].passengers, 120);
        assert_eq!(records[0].contract_short, "Д-17");
    }

    #[test]
    fn test_utf8_input_is_borrowed() {
        assert!(matches!(decode("flight_no".as_bytes()), Cow::Borrowed(_)));
    }

    #[test]
    fn test_contract_token() {
        assert_eq!(contract_token("  K-17   от 2023"), "K-17");
        assert_eq!(contract_token("   "), NO_CONTRACT);
    }
}
