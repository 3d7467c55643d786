//! Analytics engine facade over the individual analyses.

use std::sync::Arc;

use dispatch_domain::{DateRange, Dataset, FlightTable, GroupKey};
use serde::Serialize;

use crate::aggregation::{weekday_heatmap, Heatmap, Metric, Reducer};
use crate::anomaly::{detect_anomalies, AnomalyReport};
use crate::cache::{AnalysisCache, AnalysisKind, CacheKey, CachePolicy, Cacheable};
use crate::clustering::{cluster_routes, RouteClusters};
use crate::config::AnalyticsConfig;
use crate::distribution::{load_histogram, Histogram};
use crate::error::Result;
use crate::forecast::{forecast_passengers, Forecast};
use crate::ranking::{top_groups, Ranking};
use crate::reports::{AnalyticsReport, MonthlyOverview, Section};

/// Runs analyses over loaded datasets, memoizing results per dataset and
/// date range.
///
/// The engine is `Send + Sync`; independent analyses of the same dataset may
/// be requested from several threads at once.
#[derive(Debug)]
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    cache: AnalysisCache,
    policy: CachePolicy,
}

impl AnalyticsEngine {
    /// Create an engine; caching follows `config.cache_enabled`.
    pub fn new(config: AnalyticsConfig) -> Self {
        let policy = if config.cache_enabled {
            CachePolicy::CacheFirst
        } else {
            CachePolicy::Bypass
        };
        Self {
            cache: AnalysisCache::with_max_datasets(config.cache_max_datasets),
            config,
            policy,
        }
    }

    /// Override the cache policy.
    #[must_use]
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parameters every analysis runs with.
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Result cache shared by every analysis.
    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    fn run<T, P>(
        &self,
        dataset: &Dataset,
        range: &DateRange,
        kind: AnalysisKind,
        params: &P,
        compute: impl FnOnce(&FlightTable) -> Result<T>,
    ) -> Result<Arc<T>>
    where
        T: Cacheable,
        P: Serialize + ?Sized,
    {
        let key = CacheKey {
            dataset_id: dataset.id,
            fingerprint: dataset.fingerprint.clone(),
            range: *range,
            kind,
            params: serde_json::to_string(params)?,
        };
        self.policy.fetch(&self.cache, key, || {
            let table = dataset.table.filter(range);
            tracing::debug!(
                dataset_id = %dataset.id,
                %range,
                ?kind,
                records = table.len(),
                "Running analysis"
            );
            compute(&table)
        })
    }

    /// Monthly passenger forecast.
    pub fn forecast(&self, dataset: &Dataset, range: &DateRange) -> Result<Arc<Forecast>> {
        let config = &self.config.forecast;
        self.run(dataset, range, AnalysisKind::Forecast, config, |table| {
            forecast_passengers(table, config)
        })
    }

    /// Route load tiers.
    pub fn clusters(&self, dataset: &Dataset, range: &DateRange) -> Result<Arc<RouteClusters>> {
        let config = &self.config.clustering;
        self.run(dataset, range, AnalysisKind::Clusters, config, |table| {
            cluster_routes(table, config)
        })
    }

    /// Passenger-count anomalies.
    pub fn anomalies(&self, dataset: &Dataset, range: &DateRange) -> Result<Arc<AnomalyReport>> {
        let config = &self.config.anomaly;
        self.run(dataset, range, AnalysisKind::Anomalies, config, |table| {
            detect_anomalies(table, config)
        })
    }

    /// Top groups by passengers for `key`.
    pub fn ranking(
        &self,
        dataset: &Dataset,
        range: &DateRange,
        key: GroupKey,
    ) -> Result<Arc<Ranking>> {
        let limit = self.config.ranking_limit;
        self.run(dataset, range, AnalysisKind::Ranking(key), &limit, |table| {
            top_groups(table, key, limit)
        })
    }

    /// Departures per month of year and weekday.
    pub fn heatmap(&self, dataset: &Dataset, range: &DateRange) -> Result<Arc<Heatmap>> {
        self.run(dataset, range, AnalysisKind::Heatmap, &(), |table| {
            weekday_heatmap(table, Metric::Departures, Reducer::Sum)
        })
    }

    /// Monthly passenger sums and distinct flights.
    pub fn monthly_overview(
        &self,
        dataset: &Dataset,
        range: &DateRange,
    ) -> Result<Arc<MonthlyOverview>> {
        self.run(dataset, range, AnalysisKind::MonthlyOverview, &(), |table| {
            MonthlyOverview::from_table(table)
        })
    }

    /// Histogram of mean route load.
    pub fn load_distribution(
        &self,
        dataset: &Dataset,
        range: &DateRange,
    ) -> Result<Arc<Histogram>> {
        let bins = self.config.histogram_bins;
        self.run(dataset, range, AnalysisKind::LoadDistribution, &bins, |table| {
            load_histogram(table, bins)
        })
    }

    /// Run every analysis; failing sections are reported, not propagated.
    pub fn report(&self, dataset: &Dataset, range: &DateRange) -> AnalyticsReport {
        self.assemble_report(dataset, range, PrecomputedSections::default())
    }

    /// Build the report from sections a host already ran (concurrently or
    /// under a time budget), running only the missing analyses.
    pub fn assemble_report(
        &self,
        dataset: &Dataset,
        range: &DateRange,
        precomputed: PrecomputedSections,
    ) -> AnalyticsReport {
        let records = dataset.table.filter(range).len();

        let report = AnalyticsReport {
            dataset_id: dataset.id,
            fingerprint: dataset.fingerprint.clone(),
            source: dataset.source,
            range: *range,
            records,
            overview: Section::from_result(self.monthly_overview(dataset, range)),
            heatmap: Section::from_result(self.heatmap(dataset, range)),
            rankings: precomputed.rankings.unwrap_or_else(|| {
                GroupKey::ALL
                    .into_iter()
                    .map(|key| Section::from_result(self.ranking(dataset, range, key)))
                    .collect()
            }),
            forecast: precomputed
                .forecast
                .unwrap_or_else(|| Section::from_result(self.forecast(dataset, range))),
            clusters: precomputed
                .clusters
                .unwrap_or_else(|| Section::from_result(self.clusters(dataset, range))),
            anomalies: precomputed
                .anomalies
                .unwrap_or_else(|| Section::from_result(self.anomalies(dataset, range))),
            load_distribution: Section::from_result(self.load_distribution(dataset, range)),
        };

        tracing::info!(
            dataset_id = %dataset.id,
            %range,
            records,
            cache_entries = self.cache.len(),
            "Generated analytics report"
        );
        report
    }
}

/// Report sections computed outside [`AnalyticsEngine::assemble_report`].
///
/// `None` fields are computed by the engine during assembly.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedSections {
    /// Forecast section, possibly a timeout notice
    pub forecast: Option<Section<Forecast>>,
    /// Route load tiers
    pub clusters: Option<Section<RouteClusters>>,
    /// Anomaly flags
    pub anomalies: Option<Section<AnomalyReport>>,
    /// One ranking per [`GroupKey::ALL`] entry, in that order
    pub rankings: Option<Vec<Section<Ranking>>>,
}

impl Default for AnalyticsEngine {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}
