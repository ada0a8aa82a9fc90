//! Per-file processing pipeline.
//!
//! A [`FileOrganizer`] belongs to one monitored folder and takes each
//! arriving path through: de-duplication, skip rules, stabilization,
//! classification, destination resolution, the move, and the history
//! record. State shared across folders (processed paths, history,
//! destination locks) is held behind `Arc`s owned by the engine.

use crate::config::IgnoreRules;
use crate::destination::{DestinationLocks, lock_folder, move_file, resolve_destination};
use crate::file_category::CategoryTable;
use crate::history::{HistoryError, HistoryRecord, HistoryStore};
use crate::processed::ProcessedPaths;
use crate::stability::StabilityDetector;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Suffixes of files that are still being written by another program.
pub const TRANSIENT_SUFFIXES: &[&str] = &[".tmp", ".crdownload"];

/// Errors that can occur while processing one file.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Failed to create a category directory.
    #[error("failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to move a file to its category directory.
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file disappeared while waiting for it to stabilize.
    #[error("{} vanished before it finished writing", .0.display())]
    Vanished(PathBuf),
    /// The move succeeded but the history record could not be written.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Why a path was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The path was already claimed during this run.
    AlreadyProcessed,
    /// Hidden file (name starts with `.`).
    Hidden,
    /// Partial download or temporary file.
    Transient,
    /// Matched an `ignore_patterns` entry.
    Ignored,
    /// The path no longer exists.
    Missing,
    /// The path is not a regular file.
    NotAFile,
    /// The file was still being written when waiting stopped. It stays in
    /// place for the next run's startup sweep.
    Unstable,
}

/// How long to wait for a file that is still being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patience {
    /// Poll until the file is stable or the run shuts down.
    UntilStable,
    /// Check once and leave unfinished files alone.
    SingleCheck,
}

/// Terminal state of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file was moved and recorded.
    Moved {
        /// Category the file was classified as.
        category: String,
        /// Final location of the file.
        destination: PathBuf,
    },
    /// The file was left alone.
    Skipped(SkipReason),
}

/// Timing of the stabilization loop.
#[derive(Clone)]
pub struct Stabilizer {
    detector: Arc<dyn StabilityDetector>,
    retry_delay: Duration,
}

impl Stabilizer {
    /// Polls `detector`, sleeping `retry_delay` between failed checks.
    pub fn new(detector: Arc<dyn StabilityDetector>, retry_delay: Duration) -> Self {
        Self {
            detector,
            retry_delay,
        }
    }
}

impl std::fmt::Debug for Stabilizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stabilizer")
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

/// State shared by every folder's organizer during one engine run.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Categories and their subfolders.
    pub categories: Arc<CategoryTable>,
    /// Extra skip rules.
    pub ignore: Arc<IgnoreRules>,
    /// Run-scoped de-duplication set.
    pub processed: Arc<ProcessedPaths>,
    /// The audit trail.
    pub history: Arc<HistoryStore>,
    /// Serializes resolve + move per destination folder.
    pub destination_locks: Arc<DestinationLocks>,
    /// Write-completion check.
    pub stabilizer: Stabilizer,
    /// Cancelled when the run stops; ends every stabilization wait.
    pub shutdown: CancellationToken,
}

/// Counts of what happened to the files handled by a sweep or a watcher.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    /// Files moved.
    pub moved: usize,
    /// Files skipped by the skip rules or the processed set.
    pub skipped: usize,
    /// Files left in place because they were still being written.
    pub deferred: usize,
    /// Files whose processing failed.
    pub failed: usize,
}

impl ProcessReport {
    /// Counts one result of [`FileOrganizer::handle`].
    pub fn record(&mut self, outcome: Option<&FileOutcome>) {
        match outcome {
            Some(FileOutcome::Moved { .. }) => self.moved += 1,
            Some(FileOutcome::Skipped(SkipReason::Unstable)) => self.deferred += 1,
            Some(FileOutcome::Skipped(_)) => self.skipped += 1,
            None => self.failed += 1,
        }
    }

    /// Adds another report's counts to this one.
    pub fn merge(&mut self, other: &ProcessReport) {
        self.moved += other.moved;
        self.skipped += other.skipped;
        self.deferred += other.deferred;
        self.failed += other.failed;
    }
}

/// Processes files arriving in one monitored folder.
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    source_folder: PathBuf,
    shared: SharedState,
}

impl FileOrganizer {
    /// Creates an organizer for `source_folder`; category subfolders are
    /// created inside it.
    pub fn new(source_folder: impl Into<PathBuf>, shared: SharedState) -> Self {
        Self {
            source_folder: source_folder.into(),
            shared,
        }
    }

    /// The monitored folder this organizer moves files out of.
    pub fn source_folder(&self) -> &Path {
        &self.source_folder
    }

    /// Handles a creation event. Errors are logged, never returned, so one
    /// bad file cannot stop the watcher.
    pub fn handle_created(&self, path: &Path) -> Option<FileOutcome> {
        self.handle(path, Patience::UntilStable)
    }

    /// Like [`FileOrganizer::handle_created`] with an explicit wait policy.
    pub fn handle(&self, path: &Path, patience: Patience) -> Option<FileOutcome> {
        match self.process(path, patience) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error processing file");
                None
            }
        }
    }

    /// Handles a rename inside the watched folder: the old name is claimed
    /// so it is never treated as an arrival, and the new name is processed.
    pub fn handle_renamed(&self, from: &Path, to: &Path) -> Option<FileOutcome> {
        self.shared.processed.insert(from);
        debug!(from = %from.display(), to = %to.display(), "Rename observed");
        self.handle_created(to)
    }

    /// Runs the full pipeline for `path`, waiting until it is stable.
    pub fn process_file(&self, path: &Path) -> OrganizeResult<FileOutcome> {
        self.process(path, Patience::UntilStable)
    }

    /// Runs the full pipeline for `path`.
    ///
    /// Once the path is claimed it stays claimed even if a later step
    /// fails or the file is deferred; retrying requires a new engine run.
    pub fn process(&self, path: &Path, patience: Patience) -> OrganizeResult<FileOutcome> {
        if self.shared.processed.contains(path) {
            debug!(path = %path.display(), "Already processed, skipping");
            return Ok(FileOutcome::Skipped(SkipReason::AlreadyProcessed));
        }

        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(FileOutcome::Skipped(SkipReason::NotAFile));
        };

        if let Some(reason) = self.skip_reason(&filename) {
            info!(file = %filename, ?reason, "Skipping file");
            return Ok(FileOutcome::Skipped(reason));
        }

        match fs::metadata(path) {
            Err(_) => {
                info!(file = %filename, "File no longer exists, skipping");
                return Ok(FileOutcome::Skipped(SkipReason::Missing));
            }
            Ok(meta) if !meta.is_file() => {
                info!(file = %filename, "Not a regular file, skipping");
                return Ok(FileOutcome::Skipped(SkipReason::NotAFile));
            }
            Ok(_) => {}
        }

        if !self.shared.processed.insert(path) {
            return Ok(FileOutcome::Skipped(SkipReason::AlreadyProcessed));
        }
        info!(file = %filename, folder = %self.source_folder.display(), "File event detected");

        if !self.wait_until_stable(path, &filename, patience)? {
            info!(file = %filename, "Still being written, leaving it for the next run");
            return Ok(FileOutcome::Skipped(SkipReason::Unstable));
        }

        let category = self.shared.categories.classify(&filename).to_string();
        let subfolder = self.shared.categories.subfolder_for(&category);
        let destination_folder = self.source_folder.join(subfolder);
        info!(file = %filename, category = %category, "Classified");

        let destination = self.move_into(path, &filename, &destination_folder)?;
        self.shared.processed.insert(&destination);

        let relative = destination
            .strip_prefix(&self.source_folder)
            .unwrap_or(&destination)
            .to_string_lossy()
            .into_owned();
        info!(file = %filename, destination = %relative, "Moved file");

        self.shared.history.record(HistoryRecord::now(
            filename,
            category.clone(),
            relative,
            self.source_folder.to_string_lossy(),
        ))?;

        Ok(FileOutcome::Moved {
            category,
            destination,
        })
    }

    /// Regular files already in the folder, sorted by path. Each one is
    /// handled as its own task by the caller.
    pub fn existing_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.source_folder)?
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(|entry| entry.path())
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn skip_reason(&self, filename: &str) -> Option<SkipReason> {
        if filename.starts_with('.') {
            return Some(SkipReason::Hidden);
        }
        if TRANSIENT_SUFFIXES
            .iter()
            .any(|suffix| filename.ends_with(suffix))
        {
            return Some(SkipReason::Transient);
        }
        if self.shared.ignore.matches(filename) {
            return Some(SkipReason::Ignored);
        }
        None
    }

    /// Blocks until the detector reports the file complete. There is no
    /// retry limit; only this file's task waits. Returns false when waiting
    /// stops first: after one check under [`Patience::SingleCheck`], or
    /// once the run shuts down.
    fn wait_until_stable(
        &self,
        path: &Path,
        filename: &str,
        patience: Patience,
    ) -> OrganizeResult<bool> {
        let stabilizer = &self.shared.stabilizer;
        while !stabilizer.detector.is_stable(path) {
            if fs::symlink_metadata(path).is_err() {
                return Err(OrganizeError::Vanished(path.to_path_buf()));
            }
            if patience == Patience::SingleCheck || self.shared.shutdown.is_cancelled() {
                return Ok(false);
            }
            info!(file = %filename, "Waiting for file to be fully written");
            thread::sleep(stabilizer.retry_delay);
        }
        info!(file = %filename, "File is now stable");
        Ok(true)
    }

    fn move_into(
        &self,
        path: &Path,
        filename: &str,
        destination_folder: &Path,
    ) -> OrganizeResult<PathBuf> {
        let lock = self.shared.destination_locks.for_folder(destination_folder);
        let _guard = lock_folder(&lock);

        let destination = resolve_destination(destination_folder, filename).map_err(|source| {
            OrganizeError::DirectoryCreationFailed {
                path: destination_folder.to_path_buf(),
                source,
            }
        })?;

        if destination.file_name().is_some_and(|n| n != filename) {
            info!(
                file = %filename,
                renamed_to = %destination.display(),
                "Name already taken in destination, using suffix"
            );
        }

        move_file(path, &destination).map_err(|source| OrganizeError::FileMoveFailure {
            from: path.to_path_buf(),
            to: destination.clone(),
            source,
        })?;

        Ok(destination)
    }
}
