//! Error taxonomy for the store.
//!
//! Errors are typed rather than opaque strings because several call sites
//! branch on the *kind* of failure: block I/O retries under `IoAlignment`,
//! the facade treats `PoolExhausted` as retryable but `Corruption` as not.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("alignment violation in {path}: {detail}")]
    IoAlignment { path: PathBuf, detail: String },

    #[error("corruption in {path}: {detail}")]
    Corruption { path: PathBuf, detail: String },

    #[error("buffer pool exhausted: all {pinned} resident pages are pinned")]
    PoolExhausted { pinned: usize },

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    pub fn corruption(path: impl Into<PathBuf>, detail: impl fmt::Display) -> Self {
        Error::Corruption {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    pub fn alignment(path: impl Into<PathBuf>, detail: impl fmt::Display) -> Self {
        Error::IoAlignment {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    pub fn invariant(detail: impl fmt::Display) -> Self {
        Error::Invariant(detail.to_string())
    }

    /// True when the failure is a hint to retry via a different I/O strategy
    /// rather than a hard error.
    pub fn is_alignment(&self) -> bool {
        matches!(self, Error::IoAlignment { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
