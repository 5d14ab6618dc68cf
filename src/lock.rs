//! Advisory single-writer locking for a database directory.
//!
//! Cross-platform exclusive lock via `fs2`, released on `Drop`. Guards
//! against a second process opening the same database directory by
//! mistake; uncontested in the normal single-process embedding case.

use crate::consts::LOCK_FILE;
use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_file_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

fn open_lock_file(root: &Path) -> Result<std::fs::File> {
    let path = lock_file_path(root);
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .map_err(Error::from)
}

/// Acquire the exclusive database lock. Blocks until acquired.
pub fn acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    let file = open_lock_file(root)?;
    file.lock_exclusive()?;
    Ok(LockGuard {
        file,
        path: lock_file_path(root),
    })
}

/// Try to acquire the exclusive database lock without blocking.
pub fn try_acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    let file = open_lock_file(root)?;
    file.try_lock_exclusive()?;
    Ok(LockGuard {
        file,
        path: lock_file_path(root),
    })
}
