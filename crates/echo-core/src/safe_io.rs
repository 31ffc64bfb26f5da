//! Crash-safe file writes for scope documents.
//!
//! - [`write_json_atomic`] writes a sibling `.tmp` file, fsyncs it and renames
//!   it over the target, so a reader sees the old document or the new one.
//! - [`ScopeLock`] is an RAII advisory lock (fs2) serializing writers that
//!   share a lock file.

use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)
}

/// Exclusive advisory lock held until drop.
pub struct ScopeLock {
    file: File,
}

impl ScopeLock {
    /// Block until the lock at `lock_path` is held. Creates the file if needed.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for ScopeLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
