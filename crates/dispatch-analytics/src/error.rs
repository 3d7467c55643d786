//! Analytics error types.

use dispatch_domain::DomainError;
use thiserror::Error;

/// Analytics errors.
///
/// The `Insufficient*` and `EmptyFilterResult` variants are preconditions an
/// analysis checks before fitting anything; callers are expected to surface
/// them, not retry.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Forecast needs more monthly points
    #[error("Insufficient history: {available} monthly points, at least {required} required")]
    InsufficientHistory {
        /// Minimum number of months
        required: usize,
        /// Months present
        available: usize,
    },

    /// Clustering needs more distinct routes
    #[error("Insufficient routes: {available} distinct routes, at least {required} required")]
    InsufficientRoutes {
        /// Minimum number of routes
        required: usize,
        /// Routes present
        available: usize,
    },

    /// A detector needs more observations
    #[error("Insufficient data for {detector}: {available} points, at least {required} required")]
    InsufficientData {
        /// Detector name
        detector: &'static str,
        /// Minimum number of points
        required: usize,
        /// Points present
        available: usize,
    },

    /// Date-range filter left no records
    #[error("No records in the selected date range")]
    EmptyFilterResult,

    /// Input violates the table contract
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Numerical failure while fitting a model
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    /// DuckDB error
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Domain error
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl AnalyticsError {
    /// True for precondition failures caused by too little data.
    #[must_use]
    pub fn is_insufficiency(&self) -> bool {
        matches!(
            self,
            Self::InsufficientHistory { .. }
                | Self::InsufficientRoutes { .. }
                | Self::InsufficientData { .. }
                | Self::EmptyFilterResult
        )
    }

    /// Stable machine-readable code for hosts.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientHistory { .. } => "INSUFFICIENT_HISTORY",
            Self::InsufficientRoutes { .. } => "INSUFFICIENT_ROUTES",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::EmptyFilterResult => "EMPTY_FILTER_RESULT",
            Self::MalformedInput(_) | Self::Domain(_) => "MALFORMED_INPUT",
            Self::AnalysisFailed(_) => "ANALYSIS_FAILED",
            Self::DuckDb(_) => "QUERY_FAILED",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
