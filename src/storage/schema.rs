//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the critpath database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Pages waiting for (or undergoing) regeneration
CREATE TABLE IF NOT EXISTS refresh_queue (
    url TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    enqueued_at TEXT NOT NULL,
    -- Earliest time the entry may be claimed; later than enqueued_at for retries
    available_at TEXT NOT NULL,
    claimed_at TEXT,
    -- Queue instance holding the claim while in flight
    owner TEXT,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_refresh_queue_state ON refresh_queue(state, available_at);

-- Pages that exhausted their retry budget or failed fatally
CREATE TABLE IF NOT EXISTS permanent_failures (
    url TEXT PRIMARY KEY,
    attempts INTEGER NOT NULL,
    error TEXT NOT NULL,
    failed_at TEXT NOT NULL
);

-- Critical CSS in record storage mode
CREATE TABLE IF NOT EXISTS critical_css (
    storage_key TEXT PRIMARY KEY,
    css TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Small persistent settings such as the trigger key
CREATE TABLE IF NOT EXISTS settings (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
