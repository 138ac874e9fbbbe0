//! SQLite plumbing shared by both store strategies.
//!
//! # Storage layout
//!
//! | table           | column             | type    | description                              |
//! |-----------------|--------------------|---------|------------------------------------------|
//! | `project_rules` | `id`               | INTEGER | autoincrement primary key                |
//! |                 | `category`         | TEXT    | free-text classification                 |
//! |                 | `rule_content`     | TEXT    | rule text injected into prompts          |
//! |                 | `priority`         | INTEGER | higher sorts first (default 1)           |
//! |                 | `is_active`        | INTEGER | boolean gate (default 1)                 |
//! |                 | `created_at`       | TEXT    | creation time                            |
//! | `issue_history` | `id`               | INTEGER | autoincrement primary key                |
//! |                 | `task_signature`   | TEXT    | first 50 characters of `error_pattern`   |
//! |                 | `error_pattern`    | TEXT    | problem description                      |
//! |                 | `root_cause`       | TEXT    | root cause, empty for ingested records   |
//! |                 | `solution_summary` | TEXT    | fix summary                              |
//! |                 | `embedding`        | BLOB    | little-endian f32 vector, NULL if absent |
//! |                 | `occurred_at`      | TEXT    | RFC-3339 creation time (UTC)             |
//!
//! All blocking work runs on Tokio's blocking pool against a single shared
//! connection. Every operation installs a SQLite progress handler bound to
//! the caller's [`CancellationToken`], so a cancelled call aborts its own
//! statement and nobody else's.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use hunter_types::Experience;
use rusqlite::{Connection, OptionalExtension as _, Row, Transaction, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec;
use crate::error::MemoryError;
use crate::signature::task_signature;

/// VM instructions between cancellation checks.
const PROGRESS_OPS: i32 = 1_000;

pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS project_rules (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        category     TEXT    NOT NULL,
        rule_content TEXT    NOT NULL,
        priority     INTEGER NOT NULL DEFAULT 1,
        is_active    INTEGER NOT NULL DEFAULT 1,
        created_at   TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_rules_category ON project_rules(category);

    CREATE TABLE IF NOT EXISTS issue_history (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        task_signature   TEXT NOT NULL DEFAULT '',
        error_pattern    TEXT NOT NULL DEFAULT '',
        root_cause       TEXT NOT NULL DEFAULT '',
        solution_summary TEXT NOT NULL DEFAULT '',
        embedding        BLOB,
        occurred_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
";

pub(crate) fn init_schema(conn: &Connection) -> Result<(), MemoryError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Open `path` (or an in-memory database for `":memory:"`) and apply the
/// base schema. File databases use WAL journaling.
pub(crate) fn open_connection(path: &str) -> Result<Connection, MemoryError> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        let conn = Connection::open(path)?;
        // journal_mode returns a row, so it cannot go through execute_batch.
        let mode: Option<String> = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .optional()?;
        debug!(path, journal_mode = ?mode, "opened SQLite database");
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn
    };
    init_schema(&conn)?;
    Ok(conn)
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored timestamp. Accepts RFC 3339 as written by this crate and
/// SQLite's `CURRENT_TIMESTAMP` form; anything else maps to the Unix epoch.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|t| t.and_utc()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc()))
        .unwrap_or_else(|e| {
            debug!(raw, error = %e, "unparseable timestamp");
            DateTime::<Utc>::default()
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Experience rows
// ─────────────────────────────────────────────────────────────────────────────

/// Columns selected by [`experience_from_row`], in order.
pub(crate) const EXPERIENCE_COLUMNS: &str =
    "id, task_signature, error_pattern, root_cause, solution_summary, embedding, occurred_at";

/// Map a row selected with [`EXPERIENCE_COLUMNS`] (optionally prefixed by a
/// table alias). The embedding is returned raw so callers decide how to
/// treat a corrupt blob.
pub(crate) fn experience_from_row(row: &Row<'_>) -> rusqlite::Result<(Experience, Option<Vec<u8>>)> {
    let occurred_at: String = row.get(6)?;
    let experience = Experience {
        id: row.get(0)?,
        task_signature: row.get(1)?,
        error_pattern: row.get(2)?,
        root_cause: row.get(3)?,
        solution_summary: row.get(4)?,
        embedding: None,
        similarity: None,
        occurred_at: parse_timestamp(&occurred_at),
    };
    Ok((experience, row.get(5)?))
}

/// Attach a decoded embedding, logging and dropping a corrupt one.
pub(crate) fn with_embedding(mut experience: Experience, blob: Option<Vec<u8>>) -> Experience {
    match codec::decode_column(blob.as_deref()) {
        Ok(vector) => experience.embedding = vector,
        Err(e) => warn!(id = experience.id, error = %e, "ignoring corrupt embedding"),
    }
    experience
}

/// A validated experience ready to insert.
#[derive(Debug, Clone)]
pub(crate) struct NewExperience {
    pub signature: String,
    pub pattern: String,
    pub cause: String,
    pub solution: String,
    pub embedding: Option<Vec<f32>>,
}

impl NewExperience {
    /// Reject a record with no text at all and derive its signature.
    /// An empty cause alone is fine.
    pub fn prepare(
        pattern: &str,
        cause: &str,
        solution: &str,
        vector: Option<&[f32]>,
    ) -> Result<Self, MemoryError> {
        if pattern.is_empty() && cause.is_empty() && solution.is_empty() {
            return Err(MemoryError::EmptyExperience);
        }
        Ok(Self {
            signature: task_signature(pattern),
            pattern: pattern.to_string(),
            cause: cause.to_string(),
            solution: solution.to_string(),
            embedding: vector.filter(|v| !v.is_empty()).map(<[f32]>::to_vec),
        })
    }

    /// Insert into `issue_history`, returning the new row id.
    pub fn insert(&self, conn: &Connection) -> Result<i64, MemoryError> {
        conn.execute(
            "INSERT INTO issue_history
                 (task_signature, error_pattern, root_cause, solution_summary, embedding, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.signature,
                self.pattern,
                self.cause,
                self.solution,
                codec::encode_column(self.embedding.as_deref()),
                now_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared connection handle
// ─────────────────────────────────────────────────────────────────────────────

/// Progress handler bound to a cancellation token for the lifetime of one
/// operation.
struct CancelWatch<'c>(&'c Connection);

impl<'c> CancelWatch<'c> {
    fn install(conn: &'c Connection, cancel: &CancellationToken) -> Self {
        let token = AssertUnwindSafe(cancel.clone());
        conn.progress_handler(PROGRESS_OPS, Some(move || token.is_cancelled()));
        Self(conn)
    }
}

impl Drop for CancelWatch<'_> {
    fn drop(&mut self) {
        self.0.progress_handler(0, None::<fn() -> bool>);
    }
}

/// A single SQLite connection shared across tasks.
///
/// `None` in the slot means the store has been closed.
pub(crate) struct Db {
    slot: Arc<Mutex<Option<Connection>>>,
}

impl Db {
    pub fn new(conn: Connection) -> Self {
        Self { slot: Arc::new(Mutex::new(Some(conn))) }
    }

    /// Run a read-only closure on the blocking pool.
    ///
    /// Returns [`MemoryError::Cancelled`] as soon as `cancel` fires; the
    /// detached statement is aborted by the progress handler.
    pub async fn read<T, F>(&self, cancel: &CancellationToken, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, MemoryError> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }
        let slot = Arc::clone(&self.slot);
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let guard = slot.lock().map_err(|_| MemoryError::Poisoned)?;
            let conn = guard.as_ref().ok_or(MemoryError::Closed)?;
            let _watch = CancelWatch::install(conn, &token);
            f(conn).map_err(|e| if token.is_cancelled() { MemoryError::Cancelled } else { e })
        });
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MemoryError::Cancelled),
            joined = task => joined?,
        }
    }

    /// Run `f` inside a transaction on the blocking pool.
    ///
    /// The token is checked once more immediately before commit; a cancelled
    /// write is rolled back, so the result always tells the truth about
    /// whether the commit happened.
    pub async fn write<T, F>(&self, cancel: &CancellationToken, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T, MemoryError> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(MemoryError::Cancelled);
        }
        let slot = Arc::clone(&self.slot);
        let token = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let guard = slot.lock().map_err(|_| MemoryError::Poisoned)?;
            let conn = guard.as_ref().ok_or(MemoryError::Closed)?;
            let watch = CancelWatch::install(conn, &token);
            let tx = conn.unchecked_transaction()?;
            let result = f(&tx);
            // ROLLBACK and COMMIT must not be interrupted.
            drop(watch);
            match result {
                Ok(value) if !token.is_cancelled() => {
                    tx.commit()?;
                    Ok(value)
                }
                Ok(_) => {
                    tx.rollback()?;
                    Err(MemoryError::Cancelled)
                }
                Err(e) => {
                    tx.rollback()?;
                    Err(if token.is_cancelled() { MemoryError::Cancelled } else { e })
                }
            }
        })
        .await?
    }

    /// Close the connection. Later operations fail with [`MemoryError::Closed`].
    pub fn close(&self) {
        let conn = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                warn!("connection lock poisoned; dropping store without an orderly close");
                return;
            }
        };
        if let Some(conn) = conn
            && let Err((_, e)) = conn.close()
        {
            warn!(error = %e, "error while closing SQLite connection");
        }
    }
}
