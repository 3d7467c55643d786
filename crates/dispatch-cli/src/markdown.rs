//! Markdown rendering of an analytics report.

use dispatch_analytics::anomaly::DetectorOutcome;
use dispatch_analytics::ranking::RankingKey;
use dispatch_analytics::reports::Section;
use dispatch_analytics::AnalyticsReport;
use dispatch_domain::LoadTier;

use crate::runner::FORECAST_TIMED_OUT;

/// Flagged records listed before the table is cut off
const MAX_FLAGGED_ROWS: usize = 20;

fn unavailable_message(code: &str) -> &'static str {
    match code {
        "EMPTY_FILTER_RESULT" => "No flights fall inside the selected dates.",
        "INSUFFICIENT_HISTORY" => "Not enough monthly history to build a forecast.",
        "INSUFFICIENT_ROUTES" => "Not enough distinct routes to group by load.",
        "INSUFFICIENT_DATA" => "Not enough data for this analysis.",
        FORECAST_TIMED_OUT => "The forecast took too long and was skipped.",
        _ => "This analysis could not be completed.",
    }
}

/// Push the heading for `section`; returns the ready result, or `None` after
/// writing the unavailable notice.
fn section<'a, T>(md: &mut String, title: &str, section: &'a Section<T>) -> Option<&'a T> {
    md.push_str(&format!("## {title}\n\n"));
    match section {
        Section::Ready { result } => Some(result),
        Section::Unavailable { code, detail } => {
            md.push_str(&format!("> {} ({detail})\n\n", unavailable_message(code)));
            None
        }
    }
}

fn detector_status(outcome: &DetectorOutcome) -> String {
    match outcome {
        DetectorOutcome::Completed { flagged } => format!("{flagged} flagged"),
        DetectorOutcome::InsufficientData {
            required,
            available,
        } => format!("skipped, needs {required} records, has {available}"),
    }
}

fn mark(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "yes",
        Some(false) => "",
        None => "n/a",
    }
}

/// Render `report` as a Markdown document.
pub fn render_markdown(report: &AnalyticsReport, generated_at: &str) -> String {
    let mut md = String::new();
    md.push_str("# Flight Dispatch Analytics Report\n\n");
    md.push_str(&format!("**Generated:** {generated_at}\n\n"));
    md.push_str(&format!("**Period:** {}\n\n", report.range));
    md.push_str(&format!(
        "**Dataset:** {} ({:?}, {} flights in period)\n\n",
        report.dataset_id, report.source, report.records
    ));

    if let Some(overview) = section(&mut md, "Monthly Overview", &report.overview) {
        md.push_str(&format!(
            "Total passengers: {:.0}, departures: {}\n\n",
            overview.total_passengers, overview.total_departures
        ));
        md.push_str("| Month | Passengers | Distinct Flights |\n");
        md.push_str("|-------|------------|------------------|\n");
        for (passengers, flights) in overview.passengers.iter().zip(&overview.distinct_flights) {
            md.push_str(&format!(
                "| {} | {:.0} | {:.0} |\n",
                passengers.month, passengers.value, flights.value
            ));
        }
        md.push('\n');
    }

    if let Some(forecast) = section(&mut md, "Passenger Forecast", &report.forecast) {
        let residual = forecast
            .residual_std
            .map_or_else(|| "n/a".to_string(), |s| format!("{s:.1}"));
        md.push_str(&format!(
            "Model: {:?}, Fourier order {}, residual std {residual}\n\n",
            forecast.mode, forecast.fourier_order
        ));
        md.push_str("| Month | Forecast | Lower | Upper |\n");
        md.push_str("|-------|----------|-------|-------|\n");
        let bound = |b: Option<u64>| b.map_or_else(|| "n/a".to_string(), |b| b.to_string());
        for point in forecast.presented() {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                point.period,
                point.passengers,
                bound(point.lower),
                bound(point.upper)
            ));
        }
        md.push('\n');
    }

    if let Some(clusters) = section(&mut md, "Route Load Tiers", &report.clusters) {
        md.push_str("| Tier | Centre (passengers) | Routes |\n");
        md.push_str("|------|---------------------|--------|\n");
        for centroid in &clusters.centroids {
            let routes: Vec<&str> = clusters
                .routes_in(centroid.tier)
                .map(|a| a.flight_no.as_str())
                .collect();
            md.push_str(&format!(
                "| {} | {:.1} | {} |\n",
                centroid.tier.as_str(),
                centroid.mean_passengers,
                routes.join(", ")
            ));
        }
        md.push('\n');
        let high = clusters.routes_in(LoadTier::High).count();
        md.push_str(&format!("{high} route(s) in the high-load tier.\n\n"));
    }

    if let Some(anomalies) = section(&mut md, "Anomalies", &report.anomalies) {
        let threshold = anomalies
            .threshold
            .map(|t| format!("{t:.1}"))
            .unwrap_or_else(|| "N/A".to_string());
        md.push_str("| Detector | Status |\n");
        md.push_str("|----------|--------|\n");
        md.push_str(&format!(
            "| Threshold (> {threshold}) | {} |\n",
            detector_status(&anomalies.threshold_status)
        ));
        md.push_str(&format!(
            "| Local outlier factor | {} |\n",
            detector_status(&anomalies.density_status)
        ));
        md.push_str(&format!(
            "| Isolation forest | {} |\n\n",
            detector_status(&anomalies.isolation_status)
        ));

        let flagged: Vec<_> = anomalies.anomalies().collect();
        if !flagged.is_empty() {
            md.push_str("| Date | Flight | Passengers | Threshold | Density | Isolation |\n");
            md.push_str("|------|--------|------------|-----------|---------|-----------|\n");
            for flag in flagged.iter().take(MAX_FLAGGED_ROWS) {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} |\n",
                    flag.record.dep_date,
                    flag.record.flight_no,
                    flag.record.passengers,
                    mark(Some(flag.threshold_anomaly)),
                    mark(flag.density_anomaly),
                    mark(flag.isolation_anomaly)
                ));
            }
            if flagged.len() > MAX_FLAGGED_ROWS {
                md.push_str(&format!("\n...and {} more.\n", flagged.len() - MAX_FLAGGED_ROWS));
            }
            md.push('\n');
        }
    }

    md.push_str("## Top Groups by Passengers\n\n");
    for ranking in &report.rankings {
        match ranking {
            Section::Ready { result } => {
                md.push_str(&format!("### {}\n\n", result.group_key.as_str()));
                md.push_str("| Rank | Group | Passengers | Share |\n");
                md.push_str("|------|-------|------------|-------|\n");
                for (i, row) in result.rows.iter().enumerate() {
                    let label = match &row.key {
                        RankingKey::Group(name) => name.as_str(),
                        RankingKey::NoData => "No data",
                    };
                    md.push_str(&format!(
                        "| {} | {} | {:.0} | {:.1}% |\n",
                        i + 1,
                        label,
                        row.value,
                        row.share_pct
                    ));
                }
                md.push('\n');
            }
            Section::Unavailable { code, detail } => {
                md.push_str(&format!("> {} ({detail})\n\n", unavailable_message(code)));
            }
        }
    }

    if let Some(heatmap) = section(&mut md, "Departures by Weekday", &report.heatmap) {
        md.push_str("| Month |");
        for weekday in &heatmap.columns {
            md.push_str(&format!(" {weekday} |"));
        }
        md.push_str("\n|-------|");
        md.push_str(&"-----|".repeat(heatmap.columns.len()));
        md.push('\n');
        for row in &heatmap.rows {
            md.push_str(&format!("| {} |", row.month.name()));
            for value in &row.values {
                md.push_str(&format!(" {value:.0} |"));
            }
            md.push('\n');
        }
        md.push('\n');
    }

    if let Some(histogram) = section(&mut md, "Route Load Distribution", &report.load_distribution)
    {
        if let Some(stats) = &histogram.stats {
            md.push_str("| Metric | Value |\n");
            md.push_str("|--------|-------|\n");
            md.push_str(&format!("| Routes | {} |\n", stats.count));
            md.push_str(&format!("| Mean | {:.1} |\n", stats.mean));
            md.push_str(&format!("| Median | {:.1} |\n", stats.median));
            md.push_str(&format!("| Std Dev | {:.1} |\n", stats.std_dev));
            md.push_str(&format!("| Min | {:.1} |\n", stats.min));
            md.push_str(&format!("| Max | {:.1} |\n", stats.max));
            md.push('\n');
        } else {
            md.push_str("No routes with passengers.\n\n");
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dispatch_analytics::AnalyticsEngine;
    use dispatch_domain::{DateRange, Dataset, FlightRecord, FlightTable, SourceKind};
    use dispatch_loader::{DataSource, SampleSource};

    #[test]
    fn test_renders_every_section() {
        let dataset = SampleSource::new(11, 13, 5).load().unwrap();
        let range = dataset.table.date_span().unwrap();
        let report = AnalyticsEngine::default().report(&dataset, &range);

        let md = render_markdown(&report, "2024-01-01T00:00:00Z");
        assert!(md.starts_with("# Flight Dispatch Analytics Report"));
        for heading in [
            "## Monthly Overview",
            "## Passenger Forecast",
            "## Route Load Tiers",
            "## Anomalies",
            "## Top Groups by Passengers",
            "### AIRLINE",
            "### CONTRACT",
            "## Departures by Weekday",
            "## Route Load Distribution",
        ] {
            assert!(md.contains(heading), "missing {heading}");
        }
        assert!(md.contains("| Month | Mon | Tue | Wed | Thu | Fri | Sat | Sun |"));
        assert!(md.contains("HIGH_LOAD"));
    }

    #[test]
    fn test_empty_period_renders_notices() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let dataset = Dataset::new(
            SourceKind::Upload,
            FlightTable::new(vec![FlightRecord::new("SU100", day, "SU", "SVO", 10)]),
        );
        let later = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let range = DateRange::new(later, later).unwrap();
        let report = AnalyticsEngine::default().report(&dataset, &range);

        let md = render_markdown(&report, "now");
        assert!(md.contains("No flights fall inside the selected dates."));
        assert!(md.contains("| 1 | No data | 0 | 0.0% |"));
    }

    #[test]
    fn test_short_history_renders_missing_bounds() {
        let day = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        let dataset = Dataset::new(
            SourceKind::Upload,
            FlightTable::new(vec![
                FlightRecord::new("SU100", day(1), "SU", "SVO", 100),
                FlightRecord::new("SU100", day(2), "SU", "SVO", 140),
            ]),
        );
        let range = dataset.table.date_span().unwrap();
        let report = AnalyticsEngine::default().report(&dataset, &range);

        let md = render_markdown(&report, "now");
        assert!(md.contains("residual std n/a"));
        assert!(md.contains("| n/a | n/a |"));
    }

    #[test]
    fn test_timeout_has_its_own_message() {
        assert_eq!(
            unavailable_message(FORECAST_TIMED_OUT),
            "The forecast took too long and was skipped."
        );
        assert_eq!(
            unavailable_message("SOMETHING_ELSE"),
            "This analysis could not be completed."
        );
    }
}
