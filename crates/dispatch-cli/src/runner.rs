//! Concurrent execution of the analyses behind one report.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dispatch_analytics::forecast::Forecast;
use dispatch_analytics::reports::Section;
use dispatch_analytics::{AnalyticsEngine, AnalyticsReport, PrecomputedSections};
use dispatch_domain::{DateRange, Dataset, GroupKey};
use tokio::task::{spawn_blocking, JoinError};

/// Section code for a forecast that exceeded its budget.
pub const FORECAST_TIMED_OUT: &str = "FORECAST_TIMED_OUT";

/// Await a forecast task, giving up after `budget`.
///
/// A task that outlives its budget keeps running on the blocking pool; its
/// result only lands in the engine cache.
pub async fn forecast_within<F>(task: F, budget: Duration) -> anyhow::Result<Section<Forecast>>
where
    F: Future<Output = Result<dispatch_analytics::Result<Arc<Forecast>>, JoinError>>,
{
    match tokio::time::timeout(budget, task).await {
        Ok(joined) => Ok(Section::from_result(joined?)),
        Err(_) => {
            tracing::warn!(budget_ms = budget.as_millis(), "Forecast exceeded its budget, skipped");
            Ok(Section::Unavailable {
                code: FORECAST_TIMED_OUT.to_string(),
                detail: format!("forecast did not finish within {} ms", budget.as_millis()),
            })
        }
    }
}

/// Run every analysis for `dataset` over `range`.
///
/// Forecast, clustering, anomaly detection and rankings run in parallel on
/// the blocking pool; the engine then assembles the report around them,
/// running the cheap aggregate views itself.
pub async fn run_report(
    engine: Arc<AnalyticsEngine>,
    dataset: Arc<Dataset>,
    range: DateRange,
    forecast_budget: Duration,
) -> anyhow::Result<AnalyticsReport> {
    let forecast = spawn_blocking({
        let (engine, dataset) = (Arc::clone(&engine), Arc::clone(&dataset));
        move || engine.forecast(&dataset, &range)
    });
    let clusters = spawn_blocking({
        let (engine, dataset) = (Arc::clone(&engine), Arc::clone(&dataset));
        move || engine.clusters(&dataset, &range)
    });
    let anomalies = spawn_blocking({
        let (engine, dataset) = (Arc::clone(&engine), Arc::clone(&dataset));
        move || engine.anomalies(&dataset, &range)
    });
    let rankings = spawn_blocking({
        let (engine, dataset) = (Arc::clone(&engine), Arc::clone(&dataset));
        move || {
            GroupKey::ALL
                .into_iter()
                .map(|key| Section::from_result(engine.ranking(&dataset, &range, key)))
                .collect::<Vec<_>>()
        }
    });

    let forecast = forecast_within(forecast, forecast_budget).await?;
    let (clusters, anomalies, rankings) = tokio::try_join!(clusters, anomalies, rankings)?;

    let precomputed = PrecomputedSections {
        forecast: Some(forecast),
        clusters: Some(Section::from_result(clusters)),
        anomalies: Some(Section::from_result(anomalies)),
        rankings: Some(rankings),
    };
    let report =
        spawn_blocking(move || engine.assemble_report(&dataset, &range, precomputed)).await?;

    tracing::info!(records = report.records, "Report assembled");
    Ok(report)
}
