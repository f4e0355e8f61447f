//! API request and response types

use serde::Serialize;

/// Response for an accepted inbound event
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub queued: bool,
}

/// Response with a session snapshot
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: serde_json::Value,
    /// Short state name, e.g. `answering_question`
    pub state: &'static str,
}

/// Response with archived sessions, newest first
#[derive(Debug, Serialize)]
pub struct ArchivedListResponse {
    pub sessions: Vec<serde_json::Value>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
