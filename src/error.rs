//! Error taxonomy for the curation engine
//!
//! Per-file failures are recovered inside the scan loops and aggregated into
//! reports; everything else propagates as [`Error`]. Each variant carries a
//! stable machine-readable kind for callers that map errors to exit codes.

use std::path::PathBuf;
use std::time::Duration;

/// Per-file failures. Logged and counted; a scan continues past them.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt file {}: {detail}", path.display())]
    CorruptFile { path: PathBuf, detail: String },

    #[error("metadata read exceeded {budget:?}: {}", path.display())]
    Timeout { path: PathBuf, budget: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error for every fallible operation in the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input from the caller: missing path, threshold outside [0, 1].
    /// Never retried.
    #[error("{0}")]
    User(String),

    #[error(transparent)]
    File(#[from] FileError),

    /// Database failure that survived the busy-retry loop.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Corrupt store, schema from the future, or a deletion session already
    /// in flight. Fatal to the current operation.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A deletion group violated its construction invariants.
    #[error("invalid deletion group: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn user(msg: impl Into<String>) -> Self {
        Error::User(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Error::Integrity(msg.into())
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::User(_) => "user",
            Error::File(_) => "file",
            Error::Store(_) => "store",
            Error::Integrity(_) => "integrity",
            Error::Validation(_) => "validation",
            Error::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
