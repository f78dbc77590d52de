//! # Error Kinds
//!
//! Purpose: give every tier a single vocabulary for the failure modes
//! enumerated in the design: a bad argument, a storage handle that refuses
//! to open, a statement that fails mid-execution, or a filesystem call that
//! errors. None of these ever leave a tier as a bare `Result` at the public
//! surface — callers see `bool`/`Option`, and this type exists so the
//! internal fallible helpers and the `tracing` call sites share one shape.

use std::path::PathBuf;

/// Result alias used by internal, fallible helpers across the workspace.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failure kinds shared by the memory and disk tiers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Empty key, empty value, a `filename` missing where the storage type
    /// requires one, or a `filename` present where it must not be.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The manifest database could not be opened.
    #[error("storage open failed at {path}: {message}")]
    StorageOpen { path: PathBuf, message: String },

    /// A prepared statement or `exec` call returned an error.
    #[error("storage execution failed: {0}")]
    StorageExec(String),

    /// Directory create, atomic write, move, or recursive delete failed.
    #[error("filesystem operation failed on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub fn invalid(reason: &'static str) -> Self {
        CacheError::InvalidArgument(reason)
    }

    pub fn storage_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CacheError::StorageOpen {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn storage_exec(message: impl Into<String>) -> Self {
        CacheError::StorageExec(message.into())
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
