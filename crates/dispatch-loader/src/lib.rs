//! # Dispatch Loader
//!
//! Turns dispatch-system CSV exports (UTF-8 or Windows-1251) (or a seeded synthetic sample) into
//! canonical [`Dataset`](dispatch_domain::Dataset)s for the analytics core.
//!
//! ## Sources
//!
//! - [`CsvUploadSource`] - one uploaded `.csv` file, or a `.zip` of them,
//!   held in memory
//! - [`DirectorySource`] - every `.csv` file under a directory tree
//! - [`SampleSource`] - deterministic synthetic dataset

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod error;
pub mod normalize;
pub mod sample;
pub mod source;

pub use error::{LoadError, Result};
pub use sample::SampleSource;
pub use source::{CsvUploadSource, DataSource, DirectorySource};
