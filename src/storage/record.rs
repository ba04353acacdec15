//! Key-value record storage backend
//!
//! Critical CSS rows live in the `critical_css` table of the shared database.

use crate::config::StorageMode;
use crate::storage::database::{now_timestamp, parse_timestamp, Database};
use crate::storage::traits::{CssStore, StorageResult, StoredCss};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl CssStore for RecordStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Record
    }

    fn put(&self, key: &str, css: &str) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO critical_css (storage_key, css, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(storage_key) DO UPDATE SET css = excluded.css, updated_at = excluded.updated_at",
                params![key, css, now_timestamp()],
            )
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<StoredCss>> {
        let row: Option<(String, String)> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT css, updated_at FROM critical_css WHERE storage_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })?;

        Ok(row.map(|(css, updated_at)| StoredCss {
            css,
            updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
        }))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM critical_css WHERE storage_key = ?1",
                params![key],
            )
        })?;
        Ok(removed > 0)
    }

    fn describe(&self, key: &str) -> String {
        format!("database record {}", key)
    }
}
