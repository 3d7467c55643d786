//! # Dispatch Analytics
//!
//! Batch analytics core for flight-dispatch records. Every analysis is a
//! pure function over an immutable [`FlightTable`](dispatch_domain::FlightTable)
//! and returns an owned, serializable result.
//!
//! ## Features
//!
//! - Time-bucketed aggregation over an in-memory DuckDB table and the
//!   month/weekday heatmap
//! - Monthly passenger forecast (trend + yearly seasonality)
//! - Route load tiers via k-means
//! - Threshold, density and isolation anomaly detectors
//! - Top-N rankings and the route-load distribution
//! - [`AnalyticsEngine`] facade with a per-dataset result cache

#![forbid(unsafe_code)]
#![warn(clippy::all, missing_docs)]

pub mod aggregation;
pub mod anomaly;
pub mod cache;
pub mod clustering;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod ranking;
pub mod reports;
pub mod stats;
pub mod store;

pub use config::AnalyticsConfig;
pub use engine::{AnalyticsEngine, PrecomputedSections};
pub use error::{AnalyticsError, Result};
pub use reports::AnalyticsReport;
