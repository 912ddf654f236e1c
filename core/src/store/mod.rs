//! SQLite persistence layer.
//!
//! RULE: only store/ talks to the database.
//! The matchers, tuner and aggregator see it through the traits in
//! source.rs; they never execute SQL directly.

use crate::{
    error::{ResonanceError, ResonanceResult},
    event::AuditLogEntry,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

mod records;
mod results;

pub struct MatchStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl MatchStore {
    pub fn open(path: &str) -> ResonanceResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // SQLite answers with the mode it settled on; :memory: stays "memory".
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            log::debug!("store {path}: journal_mode={mode}");
        }
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ResonanceResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn journal_mode(&self) -> ResonanceResult<String> {
        Ok(self.conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?)
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ResonanceResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_records.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_matching.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_weights_leaderboard.sql"))?;
        Ok(())
    }

    // ── Audit log ──────────────────────────────────────────────

    pub fn audit_log(&self) -> ResonanceResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, event_type, payload, recorded_at
             FROM audit_log ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(AuditLogEntry {
                    id:          Some(row.get(0)?),
                    job_id:      row.get(1)?,
                    event_type:  row.get(2)?,
                    payload:     row.get(3)?,
                    recorded_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> ResonanceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ResonanceError::Other(anyhow::anyhow!("bad timestamp '{raw}': {e}")))
}
