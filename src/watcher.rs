//! Live watching of one monitored folder.
//!
//! ```text
//! notify::RecommendedWatcher (its own thread)
//!   │  Result<Event>
//!   ▼
//! mpsc::UnboundedSender ──► FolderWatcher task
//!                              │  Arrival
//!                              ▼
//!                           JoinSet::spawn_blocking ──► FileOrganizer
//! ```
//!
//! Each arrival gets its own blocking task, so a file that never finishes
//! writing only holds up itself. Files already in the folder when the watch
//! starts go through the same task set as the startup sweep.

use crate::file_organizer::{FileOrganizer, FileOutcome, ProcessReport};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors that can occur while setting up a folder watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The platform watcher could not be created.
    #[error("failed to create file watcher: {0}")]
    Init(#[source] notify::Error),
    /// The folder could not be subscribed to.
    #[error("failed to watch {}: {source}", .folder.display())]
    Subscribe {
        folder: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// A file that should go through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// A new path appeared.
    Created(PathBuf),
    /// A file was renamed inside the watched folder.
    Renamed {
        /// Previous name.
        from: PathBuf,
        /// New name.
        to: PathBuf,
    },
}

/// Translates a notify event into pipeline arrivals.
///
/// Creations and rename targets are arrivals; a rename reported with both
/// ends carries the old name so it can be marked processed. Every other
/// event kind (modifications, removals, access) is ignored.
pub fn arrivals_from_event(event: &Event) -> Vec<Arrival> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event.paths.iter().cloned().map(Arrival::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![Arrival::Renamed {
                from: from.clone(),
                to: to.clone(),
            }],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            event.paths.iter().cloned().map(Arrival::Created).collect()
        }
        _ => Vec::new(),
    }
}

/// Watches one folder and drives its [`FileOrganizer`].
#[derive(Debug)]
pub struct FolderWatcher {
    name: String,
    organizer: Arc<FileOrganizer>,
}

impl FolderWatcher {
    /// Creates a watcher for the organizer's source folder.
    pub fn new(name: impl Into<String>, organizer: FileOrganizer) -> Self {
        Self {
            name: name.into(),
            organizer: Arc::new(organizer),
        }
    }

    /// Subscribes to the folder (non-recursively), queues the files already
    /// in it and starts the event loop on the current tokio runtime.
    ///
    /// The returned handle completes after `shutdown` is cancelled and every
    /// in-flight file has finished, with the counts of everything handled.
    pub fn spawn(
        self,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<ProcessReport>, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver is gone only after shutdown.
            let _ = tx.send(res);
        })
        .map_err(WatchError::Init)?;

        let folder = self.organizer.source_folder().to_path_buf();
        watcher
            .watch(&folder, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe { folder, source })?;

        // Listed after subscribing so nothing arriving in between is missed.
        let existing = match self.organizer.existing_files() {
            Ok(files) => files,
            Err(e) => {
                error!(folder = %self.name, error = %e, "Error scanning folder");
                Vec::new()
            }
        };
        info!(folder = %self.name, files = existing.len(), "Scanning existing files");

        Ok(tokio::spawn(self.run(watcher, rx, existing, shutdown)))
    }

    async fn run(
        self,
        watcher: RecommendedWatcher,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        existing: Vec<PathBuf>,
        shutdown: CancellationToken,
    ) -> ProcessReport {
        let mut tasks: JoinSet<Option<FileOutcome>> = JoinSet::new();
        let mut report = ProcessReport::default();

        for path in existing {
            self.dispatch(&mut tasks, Arrival::Created(path));
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = events.recv() => match received {
                    Some(Ok(event)) => {
                        for arrival in arrivals_from_event(&event) {
                            self.dispatch(&mut tasks, arrival);
                        }
                    }
                    Some(Err(e)) => warn!(folder = %self.name, error = %e, "Watch error"),
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.reap(&mut report, joined);
                }
            }
        }

        // Dropping the platform watcher stops new events.
        drop(watcher);
        if !tasks.is_empty() {
            info!(
                folder = %self.name,
                in_flight = tasks.len(),
                "Waiting for in-flight files to finish"
            );
        }
        while let Some(joined) = tasks.join_next().await {
            self.reap(&mut report, joined);
        }
        info!(
            folder = %self.name,
            moved = report.moved,
            skipped = report.skipped,
            deferred = report.deferred,
            failed = report.failed,
            "Watcher stopped"
        );
        report
    }

    fn dispatch(&self, tasks: &mut JoinSet<Option<FileOutcome>>, arrival: Arrival) {
        debug!(folder = %self.name, ?arrival, "Dispatching");
        let organizer = Arc::clone(&self.organizer);
        tasks.spawn_blocking(move || match arrival {
            Arrival::Created(path) => organizer.handle_created(&path),
            Arrival::Renamed { from, to } => organizer.handle_renamed(&from, &to),
        });
    }

    fn reap(&self, report: &mut ProcessReport, joined: Result<Option<FileOutcome>, JoinError>) {
        match joined {
            Ok(outcome) => report.record(outcome.as_ref()),
            Err(e) => {
                error!(folder = %self.name, error = %e, "File task panicked");
                report.failed += 1;
            }
        }
    }
}
