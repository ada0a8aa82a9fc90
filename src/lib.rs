//! tidywatch - keeps watched folders tidy
//!
//! This library watches directories for newly arrived files, waits until
//! each file has finished writing, classifies it by extension, moves it into
//! a category subfolder without overwriting anything, and appends an audit
//! record of every move.

pub mod cli;
pub mod config;
pub mod destination;
pub mod engine;
pub mod file_category;
pub mod file_organizer;
pub mod history;
pub mod logging;
pub mod output;
pub mod processed;
pub mod stability;
pub mod watcher;

pub use config::{ConfigError, EngineConfig, MonitoredFolder};
pub use engine::{Engine, EngineError};
pub use file_category::{CategoryTable, OTHERS};
pub use file_organizer::{FileOrganizer, FileOutcome, OrganizeError, Patience, ProcessReport, SkipReason};
pub use history::{HistoryRecord, HistoryStore};
pub use processed::ProcessedPaths;
pub use stability::{SizePollDetector, StabilityDetector};
pub use watcher::FolderWatcher;

pub use cli::{Cli, run_cli};
