//! Storage traits and error types
//!
//! This module defines the trait interface for critical CSS storage backends
//! and associated error types.

use crate::config::StorageMode;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unable to write critical CSS to {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Critical CSS as persisted by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCss {
    pub css: String,
    pub updated_at: DateTime<Utc>,
}

/// Trait for critical CSS storage backends
///
/// Implementations are shared between concurrently running jobs and the
/// page-serving layer, so they must be thread-safe.
pub trait CssStore: Send + Sync {
    /// Which strategy this backend implements
    fn mode(&self) -> StorageMode;

    /// Stores `css` under `key`, replacing any previous value
    fn put(&self, key: &str, css: &str) -> StorageResult<()>;

    /// Reads the CSS stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<StoredCss>>;

    /// Removes the CSS stored under `key`
    ///
    /// Returns `true` if something was removed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Human-readable location of `key`, used in log transcripts
    fn describe(&self, key: &str) -> String;
}
