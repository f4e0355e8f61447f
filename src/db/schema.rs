//! Database schema and types

use crate::state_machine::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    participant_id TEXT PRIMARY KEY,
    state TEXT NOT NULL DEFAULT 'idle',
    vacancy_ref TEXT,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state);

CREATE TABLE IF NOT EXISTS archived_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    participant_id TEXT NOT NULL,
    vacancy_ref TEXT,
    final_state TEXT NOT NULL,
    data TEXT NOT NULL,
    archived_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_archived_participant ON archived_sessions(participant_id, archived_at DESC);
";

/// States holding an armed timer or an in-flight call that a restart would lose.
/// Idle only counts once a vacancy is known, since the candidate lookup is pending.
pub const RESUMABLE_STATES: &[&str] = &[
    "idle",
    "collecting_profile",
    "awaiting_resume",
    "loading_questions",
    "answering_question",
    "between_questions",
];

/// A session superseded by a new `/start`
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedSession {
    pub participant_id: String,
    pub vacancy_ref: Option<String>,
    pub final_state: String,
    pub session: Session,
    pub archived_at: DateTime<Utc>,
}

impl ArchivedSession {
    pub fn new(session: Session, archived_at: DateTime<Utc>) -> Self {
        Self {
            participant_id: session.participant_id.clone(),
            vacancy_ref: session.vacancy_ref.clone(),
            final_state: session.state.name().to_string(),
            session,
            archived_at,
        }
    }
}
