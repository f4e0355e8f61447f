//! Backend Gateway: the candidate-tracking service
//!
//! The core only sees the typed results below; HTTP details, timeouts and
//! payload shapes stay inside the implementation.

mod http;

pub use http::HttpBackendGateway;

use crate::state_machine::{CandidateProfile, CandidateStatus, Question, ScreeningKickoff};
use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to the backend
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Backend request timed out")]
    Timeout,
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One committed interview slot, as reported to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSubmission {
    pub candidate_ref: String,
    pub question_id: String,
    /// Answer text, or `skipped` for a timed-out slot
    pub content: String,
    pub elapsed_secs: u64,
}

/// Calls the core makes against the candidate-tracking backend
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Look up an existing candidate by participant id
    async fn find_candidate(&self, participant_id: &str) -> Result<Option<String>, GatewayError>;

    async fn register_candidate(&self, profile: &CandidateProfile) -> Result<String, GatewayError>;

    async fn start_screening(
        &self,
        candidate_ref: &str,
        vacancy_ref: &str,
    ) -> Result<ScreeningKickoff, GatewayError>;

    async fn get_status(
        &self,
        candidate_ref: &str,
        vacancy_ref: &str,
    ) -> Result<CandidateStatus, GatewayError>;

    async fn list_questions(&self, vacancy_ref: &str) -> Result<Vec<Question>, GatewayError>;

    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<(), GatewayError>;

    async fn advance_interview(&self, candidate_ref: &str, vacancy_ref: &str)
        -> Result<(), GatewayError>;
}
