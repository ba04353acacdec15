//! Refresh queue
//!
//! This module holds the durable work queue of URLs waiting for their critical
//! CSS to be regenerated:
//! - Deduplicated enqueue (one entry per URL)
//! - Atomic batch claims that move entries to in-flight
//! - Completion, bounded retry, and permanent-failure records
//! - Leased claims, recovered only after an interrupted process lets them expire

mod refresh;
mod state;

pub use refresh::{RefreshQueue, DEFAULT_LEASE};
pub use state::EntryState;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("URL is not in flight: {0}")]
    NotInFlight(String),

    #[error("URL is already being processed: {0}")]
    AlreadyInFlight(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A URL claimed for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub url: String,

    /// Failed attempts before this one
    pub attempts: u32,

    pub enqueued_at: DateTime<Utc>,
}

/// What happened to a failed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-enqueued; `attempt` failed attempts are now recorded
    Retrying { attempt: u32 },

    /// Recorded as a permanent failure after `attempts` attempts
    Abandoned { attempts: u32 },
}

/// A URL that will not be retried until it is enqueued again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermanentFailure {
    pub url: String,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub permanent_failures: u64,
}
