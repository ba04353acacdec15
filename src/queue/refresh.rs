//! SQLite-backed refresh queue
//!
//! Every operation runs as one statement or one transaction while holding the
//! database mutex, so enqueue and claim never interleave halfway. Claims use
//! an immediate transaction so that two processes sharing the database file
//! cannot claim the same entry either.
//!
//! Each queue instance has its own owner id. A claim records the owner and
//! the claim time; only the owner may complete or fail it, and another
//! instance may take it back only after the lease has run out.

use crate::config::Config;
use crate::queue::state::EntryState;
use crate::queue::{FailOutcome, PermanentFailure, QueueEntry, QueueError, QueueResult, QueueStats};
use crate::storage::{format_timestamp, now_timestamp, parse_timestamp, Database};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use std::sync::Arc;
use std::time::Duration;

/// How long a claim stays valid without being completed or failed
pub const DEFAULT_LEASE: Duration = Duration::from_secs(10 * 60);

/// Durable, deduplicated queue of URLs waiting for regeneration
pub struct RefreshQueue {
    db: Arc<Database>,
    max_attempts: u32,
    owner: String,
    lease: Duration,
    retry_delay: Duration,
}

impl RefreshQueue {
    /// Creates a queue over `db`
    ///
    /// `max_attempts` is the total number of attempts a URL gets before a
    /// retryable failure becomes permanent.
    pub fn new(db: Arc<Database>, max_attempts: u32) -> Self {
        Self {
            db,
            max_attempts: max_attempts.max(1),
            owner: uuid::Uuid::new_v4().simple().to_string(),
            lease: DEFAULT_LEASE,
            retry_delay: Duration::ZERO,
        }
    }

    /// Creates a queue with the attempt budget, retry delay and lease of `config`
    ///
    /// The lease covers one render plus one extraction with a minute to spare.
    pub fn from_config(db: Arc<Database>, config: &Config) -> Self {
        let lease = Duration::from_secs(
            config.render.timeout_secs + config.extraction.timeout_secs + 60,
        );
        Self::new(db, config.queue.max_attempts)
            .with_lease(lease)
            .with_retry_delay(Duration::from_secs(config.queue.retry_delay_secs))
    }

    /// Sets how long a claim is protected from [`recover_in_flight`](Self::recover_in_flight)
    ///
    /// Must exceed the longest time a single job can take.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Sets how long a retried entry waits before it can be claimed again
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Adds every URL that is not already pending or in flight
    ///
    /// Returns the number of entries actually added.
    pub fn enqueue<I, S>(&self, urls: I) -> QueueResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            let mut added = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO refresh_queue (url, state, attempts, enqueued_at, available_at)
                     VALUES (?1, ?2, 0, ?3, ?3)",
                )?;
                for url in urls {
                    added += stmt.execute(params![
                        url.as_ref(),
                        EntryState::Pending.to_db_string(),
                        now
                    ])?;
                }
            }
            tx.commit()?;
            Ok(added)
        })
    }

    /// Claims up to `max_n` entries that are available now, oldest first
    pub fn dequeue_batch(&self, max_n: usize) -> QueueResult<Vec<QueueEntry>> {
        self.dequeue_available(max_n, Utc::now())
    }

    /// Claims up to `max_n` pending entries available at `cutoff`, oldest first
    ///
    /// Claimed entries are `in_flight` until passed to [`complete`] or
    /// [`fail`]. Concurrent callers never receive the same entry.
    ///
    /// [`complete`]: RefreshQueue::complete
    /// [`fail`]: RefreshQueue::fail
    pub fn dequeue_available(
        &self,
        max_n: usize,
        cutoff: DateTime<Utc>,
    ) -> QueueResult<Vec<QueueEntry>> {
        if max_n == 0 {
            return Ok(Vec::new());
        }

        self.db.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let rows: Vec<(String, u32, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT url, attempts, enqueued_at FROM refresh_queue
                     WHERE state = ?1 AND available_at <= ?2
                     ORDER BY enqueued_at ASC, rowid ASC LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(
                        params![
                            EntryState::Pending.to_db_string(),
                            format_timestamp(cutoff),
                            max_n as i64
                        ],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let mut claimed = Vec::with_capacity(rows.len());
            for (url, attempts, enqueued_at) in rows {
                if self.claim_pending(&tx, &url)? {
                    claimed.push(QueueEntry {
                        url,
                        attempts,
                        enqueued_at: parse_timestamp(&enqueued_at).unwrap_or_else(Utc::now),
                    });
                }
            }
            tx.commit()?;
            Ok(claimed)
        })
    }

    /// Claims one URL right away, adding it first when absent
    ///
    /// A pending entry is claimed even if its retry delay has not passed.
    /// Returns `None` while the URL is in flight anywhere else.
    pub fn claim_url(&self, url: &str) -> QueueResult<Option<QueueEntry>> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_timestamp();
            tx.execute(
                "INSERT OR IGNORE INTO refresh_queue (url, state, attempts, enqueued_at, available_at)
                 VALUES (?1, ?2, 0, ?3, ?3)",
                params![url, EntryState::Pending.to_db_string(), now],
            )?;

            if !self.claim_pending(&tx, url)? {
                return Ok(None);
            }

            let (attempts, enqueued_at): (u32, String) = tx.query_row(
                "SELECT attempts, enqueued_at FROM refresh_queue WHERE url = ?1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            tx.commit()?;

            Ok(Some(QueueEntry {
                url: url.to_string(),
                attempts,
                enqueued_at: parse_timestamp(&enqueued_at).unwrap_or_else(Utc::now),
            }))
        })
    }

    fn claim_pending(&self, tx: &Transaction<'_>, url: &str) -> rusqlite::Result<bool> {
        let updated = tx.execute(
            "UPDATE refresh_queue SET state = ?1, claimed_at = ?2, owner = ?3
             WHERE url = ?4 AND state = ?5",
            params![
                EntryState::InFlight.to_db_string(),
                now_timestamp(),
                self.owner,
                url,
                EntryState::Pending.to_db_string()
            ],
        )?;
        Ok(updated == 1)
    }

    /// Removes an entry this queue claimed after its job finished
    pub fn complete(&self, url: &str) -> QueueResult<()> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM refresh_queue WHERE url = ?1 AND state = ?2 AND owner = ?3",
                params![url, EntryState::InFlight.to_db_string(), self.owner],
            )
        })?;

        if removed == 0 {
            return Err(QueueError::NotInFlight(url.to_string()));
        }
        Ok(())
    }

    /// Removes an entry this queue claimed after its job failed
    ///
    /// A retryable failure with budget left re-enqueues the URL as a new
    /// pending entry with one more recorded attempt, claimable once the retry
    /// delay has passed. Anything else is recorded as a permanent failure.
    pub fn fail(&self, url: &str, error: &str, retryable: bool) -> QueueResult<FailOutcome> {
        let max_attempts = self.max_attempts;

        self.db.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let attempts: u32 = tx
                .query_row(
                    "SELECT attempts FROM refresh_queue WHERE url = ?1 AND state = ?2 AND owner = ?3",
                    params![url, EntryState::InFlight.to_db_string(), self.owner],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| QueueError::NotInFlight(url.to_string()))?;

            tx.execute("DELETE FROM refresh_queue WHERE url = ?1", params![url])?;

            let made = attempts + 1;
            let now = Utc::now();
            let outcome = if retryable && made < max_attempts {
                let available_at = now + chrono_duration(self.retry_delay);
                tx.execute(
                    "INSERT INTO refresh_queue (url, state, attempts, enqueued_at, available_at, last_error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        url,
                        EntryState::Pending.to_db_string(),
                        made,
                        format_timestamp(now),
                        format_timestamp(available_at),
                        error
                    ],
                )?;
                FailOutcome::Retrying { attempt: made }
            } else {
                tx.execute(
                    "INSERT INTO permanent_failures (url, attempts, error, failed_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(url) DO UPDATE SET attempts = excluded.attempts,
                        error = excluded.error, failed_at = excluded.failed_at",
                    params![url, made, error, format_timestamp(now)],
                )?;
                FailOutcome::Abandoned { attempts: made }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Returns claims whose lease ran out to pending
    ///
    /// Claims younger than the lease are left alone, whichever instance
    /// holds them, so a live process never loses its work to a new one.
    pub fn recover_in_flight(&self) -> QueueResult<usize> {
        let expired_before = Utc::now()
            .checked_sub_signed(chrono_duration(self.lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let recovered = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE refresh_queue SET state = ?1, claimed_at = NULL, owner = NULL
                 WHERE state = ?2 AND (claimed_at IS NULL OR claimed_at < ?3)",
                params![
                    EntryState::Pending.to_db_string(),
                    EntryState::InFlight.to_db_string(),
                    format_timestamp(expired_before)
                ],
            )
        })?;
        Ok(recovered)
    }

    /// Current state of a URL, `None` when absent
    pub fn state_of(&self, url: &str) -> QueueResult<Option<EntryState>> {
        let state: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT state FROM refresh_queue WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(state.as_deref().and_then(EntryState::from_db_string))
    }

    /// Attempts recorded for a queued URL
    pub fn attempts_of(&self, url: &str) -> QueueResult<Option<u32>> {
        let attempts = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT attempts FROM refresh_queue WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(attempts)
    }

    /// Pending entries that could be claimed right now
    pub fn available_count(&self) -> QueueResult<u64> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM refresh_queue WHERE state = ?1 AND available_at <= ?2",
                params![EntryState::Pending.to_db_string(), now_timestamp()],
                |row| row.get(0),
            )
        })?;
        Ok(count as u64)
    }

    pub fn stats(&self) -> QueueResult<QueueStats> {
        let stats = self.db.with_conn(|conn| {
            let count_state = |state: EntryState| -> rusqlite::Result<u64> {
                conn.query_row(
                    "SELECT COUNT(*) FROM refresh_queue WHERE state = ?1",
                    params![state.to_db_string()],
                    |row| row.get::<_, i64>(0),
                )
                .map(|count| count as u64)
            };
            let pending = count_state(EntryState::Pending)?;
            let in_flight = count_state(EntryState::InFlight)?;
            let permanent_failures: i64 =
                conn.query_row("SELECT COUNT(*) FROM permanent_failures", [], |row| {
                    row.get(0)
                })?;
            Ok::<_, rusqlite::Error>(QueueStats {
                pending,
                in_flight,
                permanent_failures: permanent_failures as u64,
            })
        })?;
        Ok(stats)
    }

    /// All recorded permanent failures, most recent first
    pub fn permanent_failures(&self) -> QueueResult<Vec<PermanentFailure>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT url, attempts, error, failed_at FROM permanent_failures
                 ORDER BY failed_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, rusqlite::Error>(rows)
        })?;

        Ok(rows
            .into_iter()
            .map(|(url, attempts, error, failed_at)| PermanentFailure {
                url,
                attempts,
                error,
                failed_at: parse_timestamp(&failed_at).unwrap_or_else(Utc::now),
            })
            .collect())
    }

    /// Forgets a permanent failure, e.g. after the URL later succeeded
    pub fn clear_permanent_failure(&self, url: &str) -> QueueResult<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM permanent_failures WHERE url = ?1", params![url])
        })?;
        Ok(removed > 0)
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
