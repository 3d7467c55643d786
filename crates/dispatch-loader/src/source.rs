//! Data sources that produce canonical datasets.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use dispatch_domain::{Dataset, FlightRecord, FlightTable, SourceKind};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{LoadError, Result};
use crate::normalize::{read_records, DEFAULT_DELIMITER};

/// Capability to load a dataset.
///
/// Hosts pick a source explicitly and pass the resulting [`Dataset`] to the
/// analytics core; nothing falls back to a default dataset on its own.
pub trait DataSource: Send + Sync {
    /// Load and normalize the full dataset.
    fn load(&self) -> Result<Dataset>;

    /// Provenance recorded on the dataset.
    fn kind(&self) -> SourceKind;
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

fn is_csv(path: &Path) -> bool {
    has_extension(path, "csv")
}

// Appends one file's rows, or logs and skips the file when it fails to parse.
fn append_or_skip(file: &str, parsed: Result<Vec<FlightRecord>>, records: &mut Vec<FlightRecord>) {
    match parsed {
        Ok(mut rows) => {
            tracing::debug!(file, rows = rows.len(), "Loaded CSV file");
            records.append(&mut rows);
        }
        Err(e) => {
            tracing::warn!(file, error = %e, "Skipping CSV file");
        }
    }
}

// =============================================================================
// UPLOAD
// =============================================================================

/// A single uploaded `.csv` file, or a `.zip` archive of them, held in memory.
#[derive(Debug, Clone)]
pub struct CsvUploadSource {
    name: String,
    bytes: Vec<u8>,
    delimiter: u8,
}

impl CsvUploadSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// Read an upload from disk, named after the file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, std::fs::read(path)?))
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CsvUploadSource {
    fn load_archive(&self) -> Result<Vec<FlightRecord>> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;

        let mut entries: Vec<(String, usize)> = Vec::new();
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            if !entry.is_dir() && is_csv(Path::new(entry.name())) {
                entries.push((entry.name().to_string(), index));
            }
        }
        if entries.is_empty() {
            return Err(LoadError::NoCsvEntries(self.name.clone()));
        }
        entries.sort();

        let mut records = Vec::new();
        for (name, index) in &entries {
            let parsed = archive
                .by_index(*index)
                .map_err(LoadError::from)
                .and_then(|mut entry| {
                    let mut bytes = Vec::new();
                    entry.read_to_end(&mut bytes)?;
                    read_records(&bytes, self.delimiter)
                });
            append_or_skip(name, parsed, &mut records);
        }

        tracing::info!(
            archive = %self.name,
            files = entries.len(),
            records = records.len(),
            "Loaded uploaded archive"
        );
        Ok(records)
    }
}

impl DataSource for CsvUploadSource {
    fn load(&self) -> Result<Dataset> {
        let path = Path::new(&self.name);
        let records = if is_csv(path) {
            let records = read_records(&self.bytes, self.delimiter)?;
            tracing::info!(file = %self.name, records = records.len(), "Loaded uploaded CSV");
            records
        } else if has_extension(path, "zip") {
            self.load_archive()?
        } else {
            return Err(LoadError::UnsupportedFormat(self.name.clone()));
        };
        Ok(Dataset::new(self.kind(), FlightTable::new(records)))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Upload
    }
}

// =============================================================================
// DIRECTORY
// =============================================================================

/// Every `*.csv` file under a directory tree, concatenated.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    delimiter: u8,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// CSV files under the root, in file-name order.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && is_csv(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

impl DataSource for DirectorySource {
    fn load(&self) -> Result<Dataset> {
        let files = self.discover()?;
        if files.is_empty() {
            return Err(LoadError::NoCsvFiles(self.root.clone()));
        }

        let mut records = Vec::new();
        for path in &files {
            let parsed = std::fs::read(path)
                .map_err(LoadError::from)
                .and_then(|bytes| read_records(&bytes, self.delimiter));
            append_or_skip(&path.display().to_string(), parsed, &mut records);
        }

        tracing::info!(
            root = %self.root.display(),
            files = files.len(),
            records = records.len(),
            "Loaded CSV directory"
        );
        Ok(Dataset::new(self.kind(), FlightTable::new(records)))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Directory
    }
}
