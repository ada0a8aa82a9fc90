//! Engine supervisor.
//!
//! Loads shared state once, starts one [`FolderWatcher`] per enabled folder
//! (each sweeps its existing files first) and waits for a termination
//! signal.

use crate::config::{ConfigError, EngineConfig, MonitoredFolder};
use crate::destination::DestinationLocks;
use crate::file_organizer::{FileOrganizer, Patience, ProcessReport, SharedState, Stabilizer};
use crate::history::HistoryStore;
use crate::processed::ProcessedPaths;
use crate::stability::SizePollDetector;
use crate::watcher::FolderWatcher;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Errors that stop the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// None of the configured folders could be watched.
    #[error("no folders are being monitored, check the configuration")]
    NothingWatched,
}

/// A monitored folder that exists and will be processed.
#[derive(Debug, Clone)]
pub struct ActiveFolder {
    /// Display label.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of folders that were watched.
    pub watched: usize,
    /// Totals over the startup sweeps and live arrivals.
    pub processed: ProcessReport,
}

/// Owns the state of one engine run.
#[derive(Debug)]
pub struct Engine {
    folders: Vec<MonitoredFolder>,
    shared: SharedState,
}

impl Engine {
    /// Builds the run's shared state from configuration.
    ///
    /// The processed-path set starts empty; categories, ignore patterns and
    /// timings are fixed for the lifetime of the engine.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let settings = &config.engine;
        let detector = SizePollDetector::new(settings.stability_wait()?);

        let shared = SharedState {
            categories: Arc::new(config.category_table()),
            ignore: Arc::new(settings.compile_ignore_patterns()?),
            processed: Arc::new(ProcessedPaths::new()),
            history: Arc::new(HistoryStore::new(settings.history_path()?)),
            destination_locks: Arc::new(DestinationLocks::new()),
            stabilizer: Stabilizer::new(Arc::new(detector), settings.retry_delay()?),
            shutdown: CancellationToken::new(),
        };

        info!(
            folders = config.monitored_folders.len(),
            categories = shared.categories.category_names().count(),
            history = %shared.history.path().display(),
            "Configuration loaded"
        );

        Ok(Self {
            folders: config.enabled_folders().cloned().collect(),
            shared,
        })
    }

    /// Enabled folders whose path resolves and exists. Others are logged
    /// and left out.
    pub fn active_folders(&self) -> Vec<ActiveFolder> {
        self.folders
            .iter()
            .filter_map(|folder| {
                let name = folder.display_name().to_string();
                match folder.resolve_path() {
                    Ok(path) if path.is_dir() => Some(ActiveFolder { name, path }),
                    Ok(path) => {
                        warn!(folder = %name, path = %path.display(), "Monitored folder does not exist");
                        None
                    }
                    Err(e) => {
                        warn!(folder = %name, error = %e, "Cannot resolve monitored folder");
                        None
                    }
                }
            })
            .collect()
    }

    fn organizer_for(&self, folder: &ActiveFolder) -> FileOrganizer {
        FileOrganizer::new(folder.path.clone(), self.shared.clone())
    }

    /// Sweeps every active folder once without watching.
    ///
    /// Each file runs as its own blocking task and is checked for stability
    /// once; files still being written are left for a later run.
    pub async fn sweep_all(&self) -> Result<ProcessReport, EngineError> {
        let folders = self.active_folders();
        if folders.is_empty() {
            error!("No folders are being monitored! Check your configuration.");
            return Err(EngineError::NothingWatched);
        }

        let mut tasks = JoinSet::new();
        for folder in &folders {
            let organizer = Arc::new(self.organizer_for(folder));
            let files = match organizer.existing_files() {
                Ok(files) => files,
                Err(e) => {
                    error!(folder = %folder.name, error = %e, "Error scanning folder");
                    continue;
                }
            };
            info!(folder = %folder.name, files = files.len(), "Scanning existing files");
            for path in files {
                let organizer = Arc::clone(&organizer);
                tasks.spawn_blocking(move || organizer.handle(&path, Patience::SingleCheck));
            }
        }

        let mut report = ProcessReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome.as_ref()),
                Err(e) => {
                    error!(error = %e, "File task panicked");
                    report.failed += 1;
                }
            }
        }
        info!(
            moved = report.moved,
            skipped = report.skipped,
            deferred = report.deferred,
            failed = report.failed,
            "Scan complete"
        );
        Ok(report)
    }

    /// Runs until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<RunSummary, EngineError> {
        self.run_until(shutdown_signal()).await
    }

    /// Watches every active folder, sweeping its existing files in the
    /// background, then waits for `signal`.
    ///
    /// On `signal` every watcher stops taking events, pending stabilization
    /// waits give up, and the call returns once all in-flight files are done.
    pub async fn run_until<F>(self, signal: F) -> Result<RunSummary, EngineError>
    where
        F: Future<Output = ()>,
    {
        info!("--- Engine start ---");
        let shutdown = self.shared.shutdown.clone();
        let mut summary = RunSummary::default();
        let mut handles = Vec::new();

        for folder in self.active_folders() {
            info!(folder = %folder.name, path = %folder.path.display(), "Setting up monitoring");
            let organizer = self.organizer_for(&folder);

            match FolderWatcher::new(folder.name.clone(), organizer).spawn(shutdown.clone()) {
                Ok(handle) => {
                    info!(folder = %folder.name, path = %folder.path.display(), "Now monitoring");
                    handles.push(handle);
                }
                Err(e) => error!(folder = %folder.name, error = %e, "Could not watch folder"),
            }
        }

        if handles.is_empty() {
            error!("No folders are being monitored! Check your configuration.");
            return Err(EngineError::NothingWatched);
        }
        summary.watched = handles.len();

        signal.await;

        info!("Stopping all watchers...");
        shutdown.cancel();
        for handle in handles {
            match handle.await {
                Ok(report) => summary.processed.merge(&report),
                Err(e) => error!(error = %e, "Watcher task failed"),
            }
        }
        info!("All watchers stopped");

        Ok(summary)
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
