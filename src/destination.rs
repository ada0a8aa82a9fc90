//! Collision-free destination paths and the move itself.
//!
//! [`resolve_destination`] creates the category folder and picks the first
//! free name (`name.ext`, `name_1.ext`, `name_2.ext`, ...). Between the
//! existence check and the move another writer could take the same name, so
//! callers that share a destination folder hold the folder's lock from
//! [`DestinationLocks`] across resolve and move.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Ensures `destination_folder` exists and returns a path inside it for
/// `filename` that does not exist at check time.
///
/// # Errors
///
/// Returns the IO error from creating the folder.
pub fn resolve_destination(destination_folder: &Path, filename: &str) -> io::Result<PathBuf> {
    // create_dir_all succeeds if the folder already exists or appears concurrently.
    fs::create_dir_all(destination_folder)?;

    let candidate = destination_folder.join(filename);
    if !exists(&candidate) {
        return Ok(candidate);
    }

    let (stem, ext) = split_extension(filename);
    let mut counter: u64 = 1;
    loop {
        let candidate = destination_folder.join(format!("{stem}_{counter}{ext}"));
        if !exists(&candidate) {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Splits `name` into stem and extension (extension keeps its dot).
///
/// A leading dot does not start an extension, matching how the classifier
/// treats dotfiles.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn exists(path: &Path) -> bool {
    // symlink_metadata also sees dangling symlinks, which would still block a rename.
    fs::symlink_metadata(path).is_ok()
}

/// Moves `source` to `destination`.
///
/// Uses a rename, falling back to copy + remove when the two paths are on
/// different filesystems.
pub fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
        Err(e) => Err(e),
    }
}

/// One mutex per destination folder.
///
/// Watchers whose categories map to the same folder serialize their
/// resolve-then-move sequence through the folder's lock.
#[derive(Debug, Default)]
pub struct DestinationLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DestinationLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `folder`, creating it on first use.
    pub fn for_folder(&self, folder: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(folder.to_path_buf()).or_default())
    }
}

/// Locks a folder mutex, ignoring poisoning (it guards no data).
pub(crate) fn lock_folder(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
