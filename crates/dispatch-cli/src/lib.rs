//! # Dispatch Report CLI
//!
//! Host for the analytics core: loads a dataset, runs every analysis for a
//! date range and writes the report as JSON or Markdown.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌────────────────────┐
//! │  DataSource  │────▶│     Dataset      │────▶│  AnalyticsEngine   │
//! │ (csv / dir / │     │ (immutable, Arc) │     │ (cached analyses)  │
//! │   sample)    │     └──────────────────┘     └─────────┬──────────┘
//! └──────────────┘                                        │
//!                          ┌──────────────────────────────┘
//!                          ▼
//!                ┌──────────────────┐     ┌──────────────────┐
//!                │  runner (tokio)  │────▶│  JSON / Markdown │
//!                │ forecast budget  │     │      output      │
//!                └──────────────────┘     └──────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod markdown;
pub mod runner;

pub use config::HostConfig;
pub use markdown::render_markdown;
pub use runner::run_report;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
