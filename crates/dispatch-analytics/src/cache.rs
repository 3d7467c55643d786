//! # Analysis Cache
//!
//! In-process memo of analysis results, keyed by dataset identity, date
//! filter, analysis kind and parameters.
//!
//! Entries are inserted whole behind a reader/writer lock, so a concurrent
//! reader sees either no entry or a complete one.
//!
//! The cache holds results for at most `max_datasets` datasets. Inserting a
//! result for a new dataset beyond that evicts every entry of the dataset
//! that was least recently written.
//!
//! ## Policies
//!
//! - `CacheFirst` - Return a cached result, compute and store on miss (default)
//! - `Bypass` - Always compute, never touch the cache
//! - `Refresh` - Always compute, overwrite the cached entry

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dispatch_domain::{DateRange, GroupKey};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregation::Heatmap;
use crate::anomaly::AnomalyReport;
use crate::clustering::RouteClusters;
use crate::distribution::Histogram;
use crate::error::Result;
use crate::forecast::Forecast;
use crate::ranking::Ranking;
use crate::reports::MonthlyOverview;

/// Which analysis an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisKind {
    /// Passenger forecast
    Forecast,
    /// Route load tiers
    Clusters,
    /// Anomaly flags
    Anomalies,
    /// Top groups for one key
    Ranking(GroupKey),
    /// Month x weekday departures
    Heatmap,
    /// Monthly totals
    MonthlyOverview,
    /// Route-load histogram
    LoadDistribution,
}

/// Identity of one cached analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Dataset the result was computed from
    pub dataset_id: Uuid,
    /// Content hash of that dataset
    pub fingerprint: String,
    /// Date filter applied first
    pub range: DateRange,
    /// Analysis the entry holds
    pub kind: AnalysisKind,
    /// Serialized parameters the analysis ran with
    pub params: String,
}

/// A cached analysis result.
#[derive(Debug, Clone)]
pub enum CachedAnalysis {
    /// [`AnalysisKind::Forecast`] result
    Forecast(Arc<Forecast>),
    /// [`AnalysisKind::Clusters`] result
    Clusters(Arc<RouteClusters>),
    /// [`AnalysisKind::Anomalies`] result
    Anomalies(Arc<AnomalyReport>),
    /// [`AnalysisKind::Ranking`] result
    Ranking(Arc<Ranking>),
    /// [`AnalysisKind::Heatmap`] result
    Heatmap(Arc<Heatmap>),
    /// [`AnalysisKind::MonthlyOverview`] result
    MonthlyOverview(Arc<MonthlyOverview>),
    /// [`AnalysisKind::LoadDistribution`] result
    LoadDistribution(Arc<Histogram>),
}

/// Result types that can live in the cache.
pub trait Cacheable: Sized {
    /// Wrap a result as a cache entry.
    fn into_entry(value: Arc<Self>) -> CachedAnalysis;
    /// Unwrap an entry of this type.
    fn from_entry(entry: &CachedAnalysis) -> Option<Arc<Self>>;
}

macro_rules! cacheable {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Cacheable for $ty {
                fn into_entry(value: Arc<Self>) -> CachedAnalysis {
                    CachedAnalysis::$variant(value)
                }

                fn from_entry(entry: &CachedAnalysis) -> Option<Arc<Self>> {
                    match entry {
                        CachedAnalysis::$variant(value) => Some(Arc::clone(value)),
                        _ => None,
                    }
                }
            }
        )*
    };
}

cacheable! {
    Forecast => Forecast,
    RouteClusters => Clusters,
    AnomalyReport => Anomalies,
    Ranking => Ranking,
    Heatmap => Heatmap,
    MonthlyOverview => MonthlyOverview,
    Histogram => LoadDistribution,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held
    pub entries: usize,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that did not
    pub misses: u64,
}

/// Datasets retained by [`AnalysisCache::new`].
pub const DEFAULT_MAX_DATASETS: usize = 4;

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<CacheKey, CachedAnalysis>,
    // Least recently written dataset first
    datasets: VecDeque<Uuid>,
}

/// Thread-safe analysis memo bounded by dataset count.
#[derive(Debug)]
pub struct AnalysisCache {
    entries: RwLock<Entries>,
    max_datasets: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::with_max_datasets(DEFAULT_MAX_DATASETS)
    }
}

impl AnalysisCache {
    /// Cache retaining [`DEFAULT_MAX_DATASETS`] datasets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache retaining results for at most `max_datasets` datasets (at least one).
    pub fn with_max_datasets(max_datasets: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            max_datasets: max_datasets.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached entry for `key`, counting the hit or miss.
    pub fn get(&self, key: &CacheKey) -> Option<CachedAnalysis> {
        let entry = self.entries.read().map.get(key).cloned();
        let counter = if entry.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Store `entry`, evicting the least recently written dataset when full.
    pub fn insert(&self, key: CacheKey, entry: CachedAnalysis) {
        let mut entries = self.entries.write();
        let dataset_id = key.dataset_id;
        entries.datasets.retain(|id| *id != dataset_id);
        while entries.datasets.len() >= self.max_datasets {
            let Some(evicted) = entries.datasets.pop_front() else {
                break;
            };
            entries.map.retain(|key, _| key.dataset_id != evicted);
            tracing::debug!(dataset_id = %evicted, "Evicted cached analyses");
        }
        entries.datasets.push_back(dataset_id);
        entries.map.insert(key, entry);
    }

    /// Drop every entry computed from `dataset_id`.
    pub fn invalidate_dataset(&self, dataset_id: Uuid) -> usize {
        let mut entries = self.entries.write();
        let before = entries.map.len();
        entries.map.retain(|key, _| key.dataset_id != dataset_id);
        entries.datasets.retain(|id| *id != dataset_id);
        before - entries.map.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.datasets.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().map.is_empty()
    }

    /// Datasets with at least one cached result.
    pub fn dataset_count(&self) -> usize {
        self.entries.read().datasets.len()
    }

    /// Entry count and hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// How an analysis request uses the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Use a cached result, compute and store on miss
    #[default]
    CacheFirst,
    /// Compute without reading or writing the cache
    Bypass,
    /// Compute and overwrite the cached result
    Refresh,
}

impl CachePolicy {
    /// Resolve `key` according to the policy, running `compute` when needed.
    ///
    /// Failed computations are never cached.
    pub fn fetch<T: Cacheable>(
        &self,
        cache: &AnalysisCache,
        key: CacheKey,
        compute: impl FnOnce() -> Result<T>,
    ) -> Result<Arc<T>> {
        match self {
            CachePolicy::CacheFirst => {
                if let Some(value) = cache.get(&key).as_ref().and_then(T::from_entry) {
                    tracing::debug!(kind = ?key.kind, "Cache hit");
                    return Ok(value);
                }
                tracing::debug!(kind = ?key.kind, "Cache miss, computing");

                let value = Arc::new(compute()?);
                cache.insert(key, T::into_entry(Arc::clone(&value)));
                Ok(value)
            }

            CachePolicy::Bypass => compute().map(Arc::new),

            CachePolicy::Refresh => {
                let value = Arc::new(compute()?);
                cache.insert(key, T::into_entry(Arc::clone(&value)));
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use crate::ranking::{RankingKey, RankingRow};
    use chrono::NaiveDate;
    use std::cell::Cell;

    fn key(kind: AnalysisKind) -> CacheKey {
        key_for(Uuid::nil(), kind)
    }

    fn key_for(dataset_id: Uuid, kind: AnalysisKind) -> CacheKey {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        CacheKey {
            dataset_id,
            fingerprint: "abc".into(),
            range: DateRange::new(day, day).unwrap(),
            kind,
            params: "{}".into(),
        }
    }

    fn ranking(value: f64) -> Ranking {
        Ranking {
            group_key: GroupKey::Airline,
            rows: vec![RankingRow {
                key: RankingKey::Group("SU".into()),
                value,
                share_pct: 100.0,
            }],
        }
    }

    #[test]
    fn test_cache_first_computes_once() {
        let cache = AnalysisCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(ranking(1.0))
        };

        let kind = AnalysisKind::Ranking(GroupKey::Airline);
        let a = CachePolicy::CacheFirst.fetch(&cache, key(kind), compute).unwrap();
        let b = CachePolicy::CacheFirst.fetch(&cache, key(kind), compute).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_refresh_overwrites_and_bypass_leaves_cache_alone() {
        let cache = AnalysisCache::new();
        let kind = AnalysisKind::Ranking(GroupKey::Airline);
        CachePolicy::Bypass
            .fetch(&cache, key(kind), || Ok(ranking(1.0)))
            .unwrap();
        assert!(cache.is_empty());

        CachePolicy::Refresh
            .fetch(&cache, key(kind), || Ok(ranking(2.0)))
            .unwrap();
        let cached = CachePolicy::CacheFirst
            .fetch(&cache, key(kind), || Ok(ranking(3.0)))
            .unwrap();
        assert_eq!(cached.rows[0].value, 2.0);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = AnalysisCache::new();
        let result: Result<Arc<Ranking>> = CachePolicy::CacheFirst.fetch(
            &cache,
            key(AnalysisKind::Ranking(GroupKey::Airport)),
            || Err(AnalyticsError::EmptyFilterResult),
        );
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_dataset() {
        let cache = AnalysisCache::new();
        cache.insert(
            key(AnalysisKind::Heatmap),
            CachedAnalysis::Ranking(Arc::new(ranking(1.0))),
        );
        assert_eq!(cache.invalidate_dataset(Uuid::new_v4()), 0);
        assert_eq!(cache.invalidate_dataset(Uuid::nil()), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oldest_dataset_is_evicted_beyond_capacity() {
        let cache = AnalysisCache::with_max_datasets(2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let entry = || CachedAnalysis::Ranking(Arc::new(ranking(1.0)));

        cache.insert(key_for(a, AnalysisKind::Heatmap), entry());
        cache.insert(key_for(a, AnalysisKind::Forecast), entry());
        cache.insert(key_for(b, AnalysisKind::Heatmap), entry());
        // Writing to `a` again makes `b` the least recently written
        cache.insert(key_for(a, AnalysisKind::Clusters), entry());
        cache.insert(key_for(c, AnalysisKind::Heatmap), entry());

        assert_eq!(cache.dataset_count(), 2);
        assert_eq!(cache.len(), 4);
        assert!(cache.get(&key_for(b, AnalysisKind::Heatmap)).is_none());
        assert!(cache.get(&key_for(a, AnalysisKind::Forecast)).is_some());
        assert!(cache.get(&key_for(c, AnalysisKind::Heatmap)).is_some());
    }
}
