//! Persistent audit trail of completed moves.
//!
//! The history document is a JSON array of [`HistoryRecord`]s shared by
//! every watcher and every engine run. Records are only ever appended.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur while reading or writing the history document.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Failed to read history file.
    #[error("failed to read history file {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to write history file.
    #[error("failed to write history file {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// History file exists but is not a JSON array of records.
    #[error("invalid history file format in {}: {source}", .path.display())]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// One completed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Original file name.
    pub file: String,
    /// Category the file was classified as.
    #[serde(rename = "type")]
    pub category: String,
    /// Local time of the move, `YYYY-MM-DD HH:MM:SS`.
    pub date: String,
    /// Destination relative to the source folder, e.g. `Pictures/photo_1.jpg`.
    pub destination: String,
    /// The monitored folder the file arrived in.
    pub source_folder: String,
}

impl HistoryRecord {
    /// Creates a record stamped with the current local time.
    pub fn now(
        file: impl Into<String>,
        category: impl Into<String>,
        destination: impl Into<String>,
        source_folder: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            category: category.into(),
            date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            destination: destination.into(),
            source_folder: source_folder.into(),
        }
    }
}

/// The on-disk history document with a write lock around load-append-save.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    /// Creates a store backed by the file at `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the history document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every record. A missing file is an empty history.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::InvalidFormat` for a file that exists but does
    /// not parse, so a caller never mistakes corruption for an empty history.
    pub fn load(&self) -> HistoryResult<Vec<HistoryRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryError::ReadFailed {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| HistoryError::InvalidFormat {
            path: self.path.clone(),
            source,
        })
    }

    /// Appends `record` and persists the whole sequence.
    ///
    /// Load, append and save run under one lock so concurrent watchers
    /// cannot lose each other's records. A corrupt existing document aborts
    /// the append and is left untouched.
    pub fn record(&self, record: HistoryRecord) -> HistoryResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut history = self.load()?;
        history.push(record);
        self.save(&history)
    }

    fn save(&self, history: &[HistoryRecord]) -> HistoryResult<()> {
        let write_failed = |source: io::Error| HistoryError::WriteFailed {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let json = serde_json::to_string_pretty(history)
            .map_err(|e| write_failed(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        fs::write(&self.path, json).map_err(write_failed)
    }
}
