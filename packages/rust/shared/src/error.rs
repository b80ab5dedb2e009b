//! Error types for stationgeo.
//!
//! Library crates use [`StationGeoError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all stationgeo operations.
#[derive(Debug, thiserror::Error)]
pub enum StationGeoError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Pre-run database snapshot failed. Fatal: the pipeline must not
    /// mutate the store without a fresh backup.
    #[error("backup error: {0}")]
    Backup(String),

    /// Failure to enumerate the train dataset.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Geocoding service error.
    #[error("geocode error: {0}")]
    Geocode(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StationGeoError>;

impl StationGeoError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
