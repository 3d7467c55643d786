//! # Dispatch Report
//!
//! Binary entry point: load flight records, analyze a date range, print the
//! report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use dispatch_analytics::{AnalyticsConfig, AnalyticsEngine, AnalyticsReport};
use dispatch_cli::{render_markdown, run_report, HostConfig};
use dispatch_domain::DateRange;
use dispatch_loader::{CsvUploadSource, DataSource, DirectorySource, SampleSource};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

/// Report plus the moment it was rendered; the report itself carries no clock.
#[derive(Serialize)]
struct Envelope<'a> {
    generated_at: &'a str,
    report: &'a AnalyticsReport,
}

#[derive(Parser, Debug)]
#[command(name = "dispatch-report")]
#[command(about = "Analyze flight dispatch records", version)]
struct Args {
    /// Single CSV export to analyze
    #[arg(long, conflicts_with = "dir")]
    file: Option<PathBuf>,

    /// Directory scanned recursively for CSV exports
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Sample dataset seed, used when no file or directory is given
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Months in the sample dataset
    #[arg(long, default_value = "24")]
    sample_months: u32,

    /// Routes in the sample dataset
    #[arg(long, default_value = "12")]
    sample_routes: usize,

    /// CSV field delimiter
    #[arg(long, default_value = ";")]
    delimiter: char,

    /// First day of the analyzed period (defaults to the earliest record)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day of the analyzed period (defaults to the latest record)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: Format,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Forecast horizon in months
    #[arg(long)]
    horizon: Option<usize>,

    /// Rows per ranking
    #[arg(long)]
    ranking_limit: Option<usize>,

    /// Forecast time budget in milliseconds
    #[arg(long)]
    forecast_budget_ms: Option<u64>,

    /// Disable the result cache
    #[arg(long)]
    no_cache: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    tracing_subscriber::registry().with(filter).with(layer).init();
}

fn select_source(args: &Args, host: &HostConfig) -> Result<Box<dyn DataSource>> {
    if !args.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }
    let delimiter = args.delimiter as u8;

    let dir = args.dir.as_ref().or(host.data_dir.as_ref());
    let source: Box<dyn DataSource> = match (&args.file, dir) {
        (Some(file), _) => Box::new(
            CsvUploadSource::from_path(file)
                .with_context(|| format!("reading {}", file.display()))?
                .with_delimiter(delimiter),
        ),
        (None, Some(dir)) => Box::new(DirectorySource::new(dir).with_delimiter(delimiter)),
        (None, None) => Box::new(SampleSource::new(
            args.seed,
            args.sample_months,
            args.sample_routes,
        )),
    };
    Ok(source)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let host = HostConfig::from_env();

    let level = args.log_level.clone().unwrap_or_else(|| host.log_level.clone());
    init_tracing(&level, args.log_json || host.log_json);

    tracing::info!(version = dispatch_cli::VERSION, "Starting dispatch report");

    // Load dataset
    let source = select_source(&args, &host)?;
    let kind = source.kind();
    let dataset = Arc::new(
        tokio::task::spawn_blocking(move || source.load())
            .await?
            .context("loading dataset")?,
    );
    tracing::info!(
        dataset_id = %dataset.id,
        source = ?kind,
        records = dataset.table.len(),
        fingerprint = %dataset.fingerprint,
        "Dataset loaded"
    );

    let Some(span) = dataset.table.date_span() else {
        bail!("dataset contains no valid flight records");
    };
    let range = DateRange::new(
        args.from.unwrap_or_else(|| span.start()),
        args.to.unwrap_or_else(|| span.end()),
    )?;

    // Build engine
    let mut config = AnalyticsConfig::from_env();
    if let Some(horizon) = args.horizon {
        config.forecast.horizon = horizon;
    }
    if let Some(limit) = args.ranking_limit {
        config.ranking_limit = limit;
    }
    if args.no_cache {
        config.cache_enabled = false;
    }
    let engine = Arc::new(AnalyticsEngine::new(config));

    let budget = args
        .forecast_budget_ms
        .map_or(host.forecast_budget, Duration::from_millis);
    let report = run_report(engine, Arc::clone(&dataset), range, budget).await?;

    let generated_at = chrono::Utc::now().to_rfc3339();
    let rendered = match args.format {
        Format::Json => serde_json::to_string_pretty(&Envelope {
            generated_at: &generated_at,
            report: &report,
        })?,
        Format::Markdown => render_markdown(&report, &generated_at),
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
