//! Write-completion detection.
//!
//! A file is considered finished when its size is non-zero and does not
//! change across a wait interval. The check sits behind the
//! [`StabilityDetector`] trait so the pipeline does not depend on how
//! completion is decided.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Decides whether a file has finished being written.
pub trait StabilityDetector: Send + Sync {
    /// Returns true if the file at `path` looks complete.
    ///
    /// Filesystem errors count as "not stable"; implementations never fail.
    fn is_stable(&self, path: &Path) -> bool;
}

/// Size-polling detector: reads the size, sleeps, reads it again.
#[derive(Debug, Clone, Copy)]
pub struct SizePollDetector {
    wait: Duration,
}

impl SizePollDetector {
    /// Creates a detector that waits `wait` between the two size reads.
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

impl Default for SizePollDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl StabilityDetector for SizePollDetector {
    fn is_stable(&self, path: &Path) -> bool {
        is_stable(path, self.wait)
    }
}

/// Returns true iff both size reads succeed, agree, and are non-zero.
pub fn is_stable(path: &Path, wait: Duration) -> bool {
    let Ok(initial) = file_size(path) else {
        return false;
    };
    thread::sleep(wait);
    let Ok(current) = file_size(path) else {
        return false;
    };
    initial == current && current > 0
}

fn file_size(path: &Path) -> std::io::Result<u64> {
    fs::metadata(path).map(|meta| meta.len())
}
