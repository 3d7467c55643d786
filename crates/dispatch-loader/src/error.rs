//! Loader error types

use std::path::PathBuf;

use thiserror::Error;

/// Loader errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format: {0} (expected .csv or .zip)")]
    UnsupportedFormat(String),

    #[error("ZIP archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("No CSV files found in archive {0}")]
    NoCsvEntries(String),

    #[error("No CSV files found under {}", .0.display())]
    NoCsvFiles(PathBuf),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;
