//! # Analytics Configuration
//!
//! Model hyperparameters for every analysis, with environment overrides.
//! `Default` is fixed (6-month horizon, k-means seeded with 42, 20-neighbor
//! LOF, 1% outlier fraction); only [`AnalyticsConfig::from_env`] reads the
//! environment.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level analytics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Forecast engine parameters
    pub forecast: ForecastConfig,

    /// Clustering engine parameters
    pub clustering: ClusteringConfig,

    /// Anomaly engine parameters
    pub anomaly: AnomalyConfig,

    /// Rows returned by rankings
    pub ranking_limit: usize,

    /// Bins of the route-load histogram
    pub histogram_bins: usize,

    /// Memoize results per dataset and filter
    pub cache_enabled: bool,

    /// Datasets whose results the cache retains
    pub cache_max_datasets: usize,
}

/// Trend + yearly seasonality forecast parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Monthly periods projected past the last observation
    pub horizon: usize,
    /// Maximum Fourier order of the yearly seasonality
    pub fourier_order: usize,
    /// Coverage of the uncertainty interval, in (0, 1)
    pub interval_width: f64,
    /// Prior scale of the seasonal coefficients (ridge strength is its inverse square)
    pub seasonality_prior_scale: f64,
    /// Observed months needed before seasonality is fitted
    pub min_seasonal_months: usize,
}

/// k-means parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Seed of the k-means++ generator
    pub seed: u64,
    /// Independent k-means++ restarts; the lowest inertia wins
    pub n_init: usize,
    /// Lloyd iterations per restart
    pub max_iter: usize,
    /// Convergence threshold on total centroid movement (standardized units)
    pub tolerance: f64,
}

/// Anomaly detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Standard deviations above the mean for the threshold detector
    pub sigma_multiplier: f64,
    /// Neighborhood size of the density detector
    pub n_neighbors: usize,
    /// Expected outlier fraction for the density and isolation detectors
    pub contamination: f64,
    /// Trees in the isolation ensemble
    pub n_estimators: usize,
    /// Subsample size per isolation tree
    pub max_samples: usize,
    /// Seed of the isolation forest
    pub seed: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 6,
            fourier_order: 3,
            interval_width: 0.80,
            seasonality_prior_scale: 10.0,
            min_seasonal_months: 12,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            sigma_multiplier: 3.0,
            n_neighbors: 20,
            contamination: 0.01,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            clustering: ClusteringConfig::default(),
            anomaly: AnomalyConfig::default(),
            ranking_limit: 5,
            histogram_bins: 20,
            cache_enabled: true,
            cache_max_datasets: 4,
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from `DISPATCH_*` environment variables,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            forecast: ForecastConfig {
                horizon: env_or("DISPATCH_FORECAST_HORIZON", defaults.forecast.horizon),
                fourier_order: env_or(
                    "DISPATCH_FORECAST_FOURIER_ORDER",
                    defaults.forecast.fourier_order,
                ),
                interval_width: env_or(
                    "DISPATCH_FORECAST_INTERVAL_WIDTH",
                    defaults.forecast.interval_width,
                ),
                ..defaults.forecast
            },

            clustering: ClusteringConfig {
                seed: env_or("DISPATCH_CLUSTER_SEED", defaults.clustering.seed),
                n_init: env_or("DISPATCH_CLUSTER_N_INIT", defaults.clustering.n_init),
                ..defaults.clustering
            },

            anomaly: AnomalyConfig {
                n_neighbors: env_or("DISPATCH_LOF_NEIGHBORS", defaults.anomaly.n_neighbors),
                contamination: env_or(
                    "DISPATCH_CONTAMINATION",
                    defaults.anomaly.contamination,
                ),
                n_estimators: env_or(
                    "DISPATCH_ISOLATION_TREES",
                    defaults.anomaly.n_estimators,
                ),
                seed: env_or("DISPATCH_ISOLATION_SEED", defaults.anomaly.seed),
                ..defaults.anomaly
            },

            ranking_limit: env_or("DISPATCH_RANKING_LIMIT", defaults.ranking_limit),

            histogram_bins: env_or("DISPATCH_HISTOGRAM_BINS", defaults.histogram_bins),

            cache_enabled: env::var("DISPATCH_CACHE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.cache_enabled),

            cache_max_datasets: env_or(
                "DISPATCH_CACHE_MAX_DATASETS",
                defaults.cache_max_datasets,
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.forecast.horizon, 6);
        assert_eq!(config.clustering.seed, 42);
        assert_eq!(config.anomaly.n_neighbors, 20);
        assert!((config.anomaly.contamination - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.ranking_limit, 5);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        assert_eq!(env_or("DISPATCH_TEST_UNSET_VARIABLE", 7usize), 7);
    }
}
