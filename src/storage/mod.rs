//! Storage module for persisting critical CSS
//!
//! This module handles:
//! - The shared SQLite database and its schema
//! - The `CssStore` interface implemented by both storage strategies
//! - Flat-file and key-value record backends
//! - Selecting the backend once from configuration

mod database;
mod file;
mod record;
mod schema;
mod traits;

pub use database::{format_timestamp, now_timestamp, parse_timestamp, Database};
pub use file::FileStore;
pub use record::RecordStore;
pub use traits::{CssStore, StorageError, StorageResult, StoredCss};

use crate::config::{StorageConfig, StorageMode};
use std::sync::Arc;

/// Builds the storage backend selected by configuration
///
/// This is the only place that branches on [`StorageMode`]; everything else
/// works against `dyn CssStore`.
pub fn open_store(config: &StorageConfig, db: Arc<Database>) -> StorageResult<Arc<dyn CssStore>> {
    match config.mode {
        StorageMode::File => {
            let directory = config.directory.as_deref().ok_or_else(|| {
                StorageError::InvalidKey("file storage requires a directory".to_string())
            })?;
            tracing::debug!("Using file storage under {}", directory);
            Ok(Arc::new(FileStore::new(directory)))
        }
        StorageMode::Record => {
            tracing::debug!("Using database record storage");
            Ok(Arc::new(RecordStore::new(db)))
        }
    }
}
