//! Session persistence
//!
//! One row per participant holds the current session snapshot. Saves are
//! compare-and-swap on `version`; superseded sessions move to
//! `archived_sessions`.

mod schema;

pub use schema::*;

use crate::state_machine::Session;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode session: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Version conflict for {participant_id}: expected {expected}, found {found:?}")]
    VersionConflict {
        participant_id: String,
        expected: u64,
        found: Option<u64>,
    },
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// A panic while holding the lock cannot leave a half-applied statement
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Session Operations ====================

    /// Load the current session for a participant
    pub fn load_session(&self, participant_id: &str) -> DbResult<Option<Session>> {
        let conn = self.conn();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM sessions WHERE participant_id = ?1",
                params![participant_id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|json| serde_json::from_str(&json).map_err(DbError::from))
            .transpose()
    }

    /// Save a snapshot whose `version` is the last version read.
    ///
    /// Returns the new version. Version 0 means the row must not exist yet.
    pub fn save_session(&self, session: &Session) -> DbResult<u64> {
        let expected = session.version;
        let next_version = expected + 1;

        let mut stored = session.clone();
        stored.version = next_version;
        let data = serde_json::to_string(&stored)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let found: Option<i64> = tx
            .query_row(
                "SELECT version FROM sessions WHERE participant_id = ?1",
                params![session.participant_id],
                |row| row.get(0),
            )
            .optional()?;
        let found = found.map(from_sql_version);

        match found {
            None if expected == 0 => {
                tx.execute(
                    "INSERT INTO sessions (participant_id, state, vacancy_ref, data, version, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        session.participant_id,
                        session.state.name(),
                        session.vacancy_ref,
                        data,
                        to_sql_version(next_version),
                        session.created_at.to_rfc3339(),
                        session.updated_at.to_rfc3339(),
                    ],
                )?;
            }
            Some(current) if current == expected => {
                tx.execute(
                    "UPDATE sessions
                     SET state = ?2, vacancy_ref = ?3, data = ?4, version = ?5, created_at = ?6, updated_at = ?7
                     WHERE participant_id = ?1 AND version = ?8",
                    params![
                        session.participant_id,
                        session.state.name(),
                        session.vacancy_ref,
                        data,
                        to_sql_version(next_version),
                        session.created_at.to_rfc3339(),
                        session.updated_at.to_rfc3339(),
                        to_sql_version(expected),
                    ],
                )?;
            }
            found => {
                return Err(DbError::VersionConflict {
                    participant_id: session.participant_id.clone(),
                    expected,
                    found,
                });
            }
        }

        tx.commit()?;
        Ok(next_version)
    }

    /// Sessions that need timers re-armed or calls re-issued after a restart
    pub fn list_resumable(&self) -> DbResult<Vec<Session>> {
        let conn = self.conn();
        let placeholders = RESUMABLE_STATES
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT data FROM sessions WHERE state IN ({placeholders})
             AND (state != 'idle' OR vacancy_ref IS NOT NULL) ORDER BY updated_at"
        ))?;

        let rows = stmt.query_map(rusqlite::params_from_iter(RESUMABLE_STATES.iter()), |row| {
            row.get::<_, String>(0)
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let json = row?;
            match serde_json::from_str::<Session>(&json) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable session row"),
            }
        }
        Ok(sessions)
    }

    // ==================== Archive Operations ====================

    /// Archive a superseded session
    pub fn archive_session(&self, session: &Session) -> DbResult<()> {
        let data = serde_json::to_string(session)?;
        self.conn().execute(
            "INSERT INTO archived_sessions (participant_id, vacancy_ref, final_state, data, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.participant_id,
                session.vacancy_ref,
                session.state.name(),
                data,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Archived sessions for a participant, newest first
    pub fn list_archived(&self, participant_id: &str) -> DbResult<Vec<ArchivedSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT participant_id, vacancy_ref, final_state, data, archived_at
             FROM archived_sessions WHERE participant_id = ?1
             ORDER BY archived_at DESC, id DESC",
        )?;

        let rows = stmt.query_map(params![participant_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut archived = Vec::new();
        for row in rows {
            let (participant_id, vacancy_ref, final_state, data, archived_at) = row?;
            archived.push(ArchivedSession {
                participant_id,
                vacancy_ref,
                final_state,
                session: serde_json::from_str(&data)?,
                archived_at: parse_datetime(&archived_at),
            });
        }
        Ok(archived)
    }
}

fn to_sql_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn from_sql_version(version: i64) -> u64 {
    u64::try_from(version).unwrap_or_default()
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
