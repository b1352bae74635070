//! Error types for manifest synchronization and reporting.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// The remote listing or an object fetch could not proceed.
    #[error("Backend unavailable for {target}: {reason}")]
    BackendUnavailable { target: String, reason: String },

    /// The local cache directory could not be created or read.
    #[error("Cache directory unavailable at {}: {source}", .path.display())]
    CacheDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write cache entry {key}: {reason}")]
    CacheWriteFailure { key: String, reason: String },

    #[error("Could not extract manifest {}: {reason}", .path.display())]
    ExtractionFailure { path: PathBuf, reason: String },

    #[error("Malformed manifest {}: {reason}", .path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub(crate) fn backend(target: impl Into<String>, reason: impl ToString) -> Self {
        CatalogError::BackendUnavailable {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn cache_write(key: impl Into<String>, reason: impl ToString) -> Self {
        CatalogError::CacheWriteFailure {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
