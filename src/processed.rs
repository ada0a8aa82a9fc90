//! Run-scoped de-duplication of filesystem paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Paths already handled or in flight during one engine run.
///
/// Grows monotonically; entries are never removed. [`ProcessedPaths::insert`]
/// checks and adds under one lock, so two tasks racing on the same path
/// cannot both claim it.
#[derive(Debug, Default)]
pub struct ProcessedPaths {
    paths: Mutex<HashSet<PathBuf>>,
}

impl ProcessedPaths {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `path` has been claimed.
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    /// Claims `path`. Returns false if it was already present.
    pub fn insert(&self, path: &Path) -> bool {
        self.lock().insert(path.to_path_buf())
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // The set is always left consistent, so a poisoned lock is still usable.
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
