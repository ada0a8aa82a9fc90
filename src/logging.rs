//! Log setup: timestamped, leveled lines appended to the log file, plus a
//! compact copy on stderr.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Errors that can occur while installing the log subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file could not be opened for appending.
    #[error("cannot open log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A global subscriber is already installed.
    #[error(transparent)]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber.
///
/// The level defaults to `info` and can be overridden with `RUST_LOG`.
/// With `echo_to_stderr` unset, only the log file is written.
pub fn init_logging(log_file: &Path, echo_to_stderr: bool) -> Result<(), LoggingError> {
    let open_failed = |source: std::io::Error| LoggingError::Open {
        path: log_file.to_path_buf(),
        source,
    };

    if let Some(parent) = log_file.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(open_failed)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(open_failed)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false);

    let stderr_layer = echo_to_stderr.then(|| {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(())
}
