//! # Host Configuration
//!
//! Environment-based settings for the report host. Command-line flags take
//! precedence over these.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Report host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Wall-clock budget for the forecast fit
    pub forecast_budget: Duration,

    /// Directory of CSV exports used when no source flag is given
    pub data_dir: Option<PathBuf>,
}

impl HostConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            log_json: env::var("LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),

            forecast_budget: Duration::from_millis(
                env::var("DISPATCH_FORECAST_BUDGET_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5_000),
            ),

            data_dir: env::var("DISPATCH_DATA_DIR").ok().map(PathBuf::from),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
