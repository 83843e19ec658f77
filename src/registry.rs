//! SQLite destination registry.
//!
//! Single source of truth for what has been submitted. Keyed by alias, one
//! row per submission. WAL mode so a monitoring process can read while the
//! launcher writes; every launcher write is a single per-alias statement, so
//! stopping the loop between polls never leaves the registry half-written.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Error, Result};
use crate::model::{Alias, BatchId, JobHandle, JobState, SubmissionRecord};

/// Registry backend. Owns the SQLite connection.
pub struct Registry {
    conn: Connection,
}

impl Registry {
    /// Open or create a registry database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let registry = Self { conn };
        registry.init()?;
        Ok(registry)
    }

    /// Create an in-memory registry (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let registry = Self { conn };
        registry.init()?;
        Ok(registry)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for concurrent readers
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS submissions (
                alias           TEXT PRIMARY KEY,
                batch           TEXT,
                handle          TEXT,
                state           TEXT NOT NULL DEFAULT 'pending',
                error           TEXT,
                poll_failures   INTEGER NOT NULL DEFAULT 0,
                submitted_at    TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                completed_at    TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_submissions_state ON submissions(state);
            CREATE INDEX IF NOT EXISTS idx_submissions_batch ON submissions(batch)
                WHERE batch IS NOT NULL;
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert a new record. Rejects an alias that already has a row.
    pub fn insert(&mut self, record: &SubmissionRecord) -> Result<()> {
        match self.conn.execute(
            "INSERT INTO submissions (
                alias, batch, handle, state, error, poll_failures,
                submitted_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.alias.as_str(),
                record.batch.map(|b| b.0.to_string()),
                record.handle.as_ref().map(|h| h.as_str()),
                record.state.to_string(),
                record.error,
                record.poll_failures,
                record.submitted_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
            ],
        ) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AliasExists(record.alias.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace a record. One atomic statement — the explicit
    /// overwrite path.
    pub fn upsert(&mut self, record: &SubmissionRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO submissions (
                alias, batch, handle, state, error, poll_failures,
                submitted_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.alias.as_str(),
                record.batch.map(|b| b.0.to_string()),
                record.handle.as_ref().map(|h| h.as_str()),
                record.state.to_string(),
                record.error,
                record.poll_failures,
                record.submitted_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Update a record's state. Returns the previous state.
    pub fn update_state(&mut self, alias: &Alias, new_state: JobState) -> Result<JobState> {
        let old_state = self.get_state(alias)?;

        if !old_state.can_transition_to(new_state) {
            return Err(Error::InvalidTransition {
                alias: alias.clone(),
                from: old_state,
                to: new_state,
            });
        }

        let now = Utc::now().to_rfc3339();
        let completed_at = if new_state.is_terminal() {
            Some(now.clone())
        } else {
            None
        };

        self.conn.execute(
            "UPDATE submissions SET state = ?1, updated_at = ?2,
             completed_at = COALESCE(?3, completed_at) WHERE alias = ?4",
            params![new_state.to_string(), now, completed_at, alias.as_str()],
        )?;

        Ok(old_state)
    }

    /// Mark a record finished.
    pub fn complete(&mut self, alias: &Alias) -> Result<()> {
        self.update_state(alias, JobState::Finished)?;
        Ok(())
    }

    /// Mark a record failed with the captured error. The write is one
    /// guarded statement: the state check rides in the WHERE clause, so a
    /// concurrent reader never observes a half-finalized row.
    pub fn fail(&mut self, alias: &Alias, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE submissions SET state = 'failed', error = ?1,
             updated_at = ?2, completed_at = ?2
             WHERE alias = ?3 AND state IN ('pending', 'running')",
            params![error, now, alias.as_str()],
        )?;

        if updated == 0 {
            let from = self.get_state(alias)?;
            return Err(Error::InvalidTransition {
                alias: alias.clone(),
                from,
                to: JobState::Failed,
            });
        }
        Ok(())
    }

    /// Clear the poll-failure count after a successful probe, so the retry
    /// budget only ever counts consecutive failures.
    pub fn reset_poll_failures(&mut self, alias: &Alias) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE submissions SET poll_failures = 0, updated_at = ?1 WHERE alias = ?2",
            params![now, alias.as_str()],
        )?;
        Ok(())
    }

    /// Increment the poll-failure count. Returns the new count.
    pub fn increment_poll_failures(&mut self, alias: &Alias) -> Result<u32> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE submissions SET poll_failures = poll_failures + 1, updated_at = ?1
             WHERE alias = ?2",
            params![now, alias.as_str()],
        )?;

        let failures: u32 = self
            .conn
            .query_row(
                "SELECT poll_failures FROM submissions WHERE alias = ?1",
                params![alias.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(alias.clone()))?;

        Ok(failures)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Get a record by alias.
    pub fn get(&self, alias: &Alias) -> Result<SubmissionRecord> {
        self.conn
            .query_row(
                "SELECT * FROM submissions WHERE alias = ?1",
                params![alias.as_str()],
                |row| Ok(row_to_record(row)),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(alias.clone()))?
            .map_err(|e| Error::Other(format!("failed to parse record: {e}")))
    }

    /// Does a record exist under this alias?
    pub fn contains(&self, alias: &Alias) -> Result<bool> {
        let n: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE alias = ?1",
            params![alias.as_str()],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// All aliases in the registry, sorted.
    pub fn list_aliases(&self) -> Result<Vec<Alias>> {
        let mut stmt = self
            .conn
            .prepare("SELECT alias FROM submissions ORDER BY alias ASC")?;
        let aliases = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(aliases.into_iter().map(Alias).collect())
    }

    /// List records in a given state, oldest submission first.
    pub fn list_by_state(&self, state: JobState) -> Result<Vec<SubmissionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM submissions WHERE state = ?1 ORDER BY submitted_at ASC, alias ASC",
        )?;
        collect_records(stmt.query_map(params![state.to_string()], |row| Ok(row_to_record(row)))?)
    }

    /// List non-terminal records — the outstanding jobs the launcher must
    /// poll. Derived from storage, not memory, so a resumed or re-entrant
    /// launch never double-counts capacity.
    pub fn list_active(&self) -> Result<Vec<SubmissionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM submissions WHERE state IN ('pending', 'running')
             ORDER BY submitted_at ASC, alias ASC",
        )?;
        collect_records(stmt.query_map([], |row| Ok(row_to_record(row)))?)
    }

    /// Count of non-terminal records.
    pub fn count_active(&self) -> Result<usize> {
        let n: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE state IN ('pending', 'running')",
            [],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    fn get_state(&self, alias: &Alias) -> Result<JobState> {
        let state_str: String = self
            .conn
            .query_row(
                "SELECT state FROM submissions WHERE alias = ?1",
                params![alias.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(alias.clone()))?;

        parse_state(&state_str)
    }
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<std::result::Result<SubmissionRecord, String>>>,
) -> Result<Vec<SubmissionRecord>> {
    let mut result = Vec::new();
    for row in rows {
        result.push(row?.map_err(|e| Error::Other(format!("parse error: {e}")))?);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Row parsing helpers
// ---------------------------------------------------------------------------

fn row_to_record(row: &rusqlite::Row) -> std::result::Result<SubmissionRecord, String> {
    let batch_str: Option<String> = row.get(1).map_err(|e| e.to_string())?;
    let handle_str: Option<String> = row.get(2).map_err(|e| e.to_string())?;
    let state_str: String = row.get(3).map_err(|e| e.to_string())?;
    let submitted_str: String = row.get(6).map_err(|e| e.to_string())?;
    let updated_str: String = row.get(7).map_err(|e| e.to_string())?;
    let completed_str: Option<String> = row.get(8).map_err(|e| e.to_string())?;

    Ok(SubmissionRecord {
        alias: Alias(row.get(0).map_err(|e| e.to_string())?),
        batch: batch_str
            .map(|s| s.parse().map(BatchId))
            .transpose()
            .map_err(|e: uuid::Error| e.to_string())?,
        handle: handle_str.map(JobHandle),
        state: parse_state(&state_str).map_err(|e| e.to_string())?,
        error: row.get(4).map_err(|e| e.to_string())?,
        poll_failures: row.get(5).map_err(|e| e.to_string())?,
        submitted_at: parse_timestamp(&submitted_str)?,
        updated_at: parse_timestamp(&updated_str)?,
        completed_at: completed_str.and_then(|s| s.parse().ok()),
    })
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    s.parse().map_err(|_| format!("invalid timestamp: {s}"))
}

fn parse_state(s: &str) -> Result<JobState> {
    match s {
        "pending" => Ok(JobState::Pending),
        "running" => Ok(JobState::Running),
        "finished" => Ok(JobState::Finished),
        "failed" => Ok(JobState::Failed),
        _ => Err(Error::Other(format!("unknown state: {s}"))),
    }
}
