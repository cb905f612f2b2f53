//! Error types for TreeSync
//!
//! Job-level and per-entry failures are expressed as `TreeSyncError`.
//! The transfer engine never lets these escape `run()`: they are folded
//! into the `TransferReport` instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for TreeSync operations
#[derive(Error, Debug)]
pub enum TreeSyncError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A single path component violates the filename grammar
    #[error("Invalid file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },

    /// Invalid path format
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// A glob pattern could not be compiled
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Hash verification failed
    #[error("Integrity check failed for '{path}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// No free name was found for a RENAME conflict
    #[error("No free name for '{path}' after {attempts} attempts")]
    RenameExhausted { path: PathBuf, attempts: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Preset file could not be read or written
    #[error("Preset error at '{path}': {message}")]
    PresetError { path: PathBuf, message: String },

    /// The background worker went away without delivering a report
    #[error("Transfer worker terminated without a report: {0}")]
    WorkerLost(String),
}

impl TreeSyncError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an integrity mismatch error
    pub fn integrity_mismatch(
        path: impl Into<PathBuf>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::IntegrityMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid file name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFileName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::NotADirectory(path)
            | Self::InvalidPath { path, .. }
            | Self::IntegrityMismatch { path, .. }
            | Self::RenameExhausted { path, .. }
            | Self::PresetError { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for TreeSync operations
pub type Result<T> = std::result::Result<T, TreeSyncError>;

impl From<std::io::Error> for TreeSyncError {
    fn from(err: std::io::Error) -> Self {
        TreeSyncError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| TreeSyncError::io(path, e))
    }
}
