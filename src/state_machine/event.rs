//! Events that can occur in a session

use super::state::{Question, SlotToken};
use crate::faq::QuickTopic;
use serde::{Deserialize, Serialize};

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // Participant events
    UserText {
        text: String,
    },
    UserDocument {
        document: DocumentMeta,
    },
    ButtonPressed {
        action: Action,
    },
    Command {
        command: Command,
    },

    // Timer events
    QuestionTimerFired {
        token: SlotToken,
    },
    PacingElapsed {
        token: SlotToken,
    },
    RegistrationExpired {
        token: SlotToken,
    },

    // Collaborator events
    BackendReply {
        reply: BackendReply,
    },
}

impl Event {
    pub fn text(text: impl Into<String>) -> Self {
        Event::UserText { text: text.into() }
    }

    pub fn button(action: Action) -> Self {
        Event::ButtonPressed { action }
    }

    pub fn command(command: Command) -> Self {
        Event::Command { command }
    }

    pub fn reply(reply: BackendReply) -> Self {
        Event::BackendReply { reply }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Event::UserText { .. } => "user_text",
            Event::UserDocument { .. } => "user_document",
            Event::ButtonPressed { .. } => "button_pressed",
            Event::Command { .. } => "command",
            Event::QuestionTimerFired { .. } => "question_timer_fired",
            Event::PacingElapsed { .. } => "pacing_elapsed",
            Event::RegistrationExpired { .. } => "registration_expired",
            Event::BackendReply { .. } => "backend_reply",
        }
    }
}

/// Metadata of an uploaded document, as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub file_name: String,
    pub size_bytes: u64,
    /// Transport-side handle used to fetch the bytes
    pub file_ref: String,
}

/// Button actions offered by outbound controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StartInterview,
    NotReady,
    Quick(QuickTopic),
}

impl Action {
    /// Parse the callback payload attached to a button
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "start_interview" => Some(Action::StartInterview),
            "not_ready" => Some(Action::NotReady),
            other => QuickTopic::parse(other).map(Action::Quick),
        }
    }

    pub fn callback_data(&self) -> &'static str {
        match self {
            Action::StartInterview => "start_interview",
            Action::NotReady => "not_ready",
            Action::Quick(topic) => topic.callback_data(),
        }
    }
}

/// Slash commands normalised by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start {
        vacancy_ref: Option<String>,
        /// Handle the transport already knows for the participant
        handle: Option<String>,
    },
    Resume,
    Questions,
    Unknown(String),
}

impl Command {
    /// Parse `/name args...`; returns `None` for plain text
    pub fn parse(text: &str, handle: Option<&str>) -> Option<Self> {
        let trimmed = text.trim();
        let rest = trimmed.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        // Commands may be addressed as /start@botname
        let name = name.split('@').next().unwrap_or_default();

        let command = match name {
            "start" => Command::Start {
                vacancy_ref: parts.next().map(str::to_string),
                handle: handle.map(str::to_string),
            },
            "resume" => Command::Resume,
            "questions" => Command::Questions,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }
}

// ============================================================================
// Backend Replies
// ============================================================================

/// Canonical candidate status reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    ScreeningOk,
    ScreeningFailed,
    InterviewOk,
    InterviewFailed,
    /// Empty or unrecognised status: no process started yet
    Unknown,
}

impl CandidateStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "screening_ok" => CandidateStatus::ScreeningOk,
            "screening_failed" => CandidateStatus::ScreeningFailed,
            "interview_ok" => CandidateStatus::InterviewOk,
            "interview_failed" => CandidateStatus::InterviewFailed,
            _ => CandidateStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::ScreeningOk => "screening_ok",
            CandidateStatus::ScreeningFailed => "screening_failed",
            CandidateStatus::InterviewOk => "interview_ok",
            CandidateStatus::InterviewFailed => "interview_failed",
            CandidateStatus::Unknown => "unknown",
        }
    }
}

/// Outcome of the screening kick-off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScreeningKickoff {
    /// The backend decided synchronously
    Decided {
        passed: bool,
        #[serde(default)]
        feedback: Option<String>,
    },
    /// Decision must be polled from the status endpoint
    Pending,
}

/// Why a status fetch was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPurpose {
    /// Waiting for the screening decision
    Screening,
    /// Waiting for the interview outcome
    Outcome,
    /// Re-deriving state after `/resume`
    Resume,
    /// A known candidate followed a new `/start` link
    Returning,
}

impl StatusPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusPurpose::Screening => "screening",
            StatusPurpose::Outcome => "outcome",
            StatusPurpose::Resume => "resume",
            StatusPurpose::Returning => "returning",
        }
    }
}

/// Why a resume handoff failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    StorageUnavailable,
    Failed,
}

/// Results of collaborator calls, fed back through the session queue
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply {
    CandidateLookup {
        candidate_ref: Option<String>,
    },
    CandidateLookupFailed,
    CandidateRegistered {
        candidate_ref: String,
    },
    RegistrationFailed,
    ResumeStored {
        storage_key: String,
    },
    ResumeRejected {
        reason: UploadFailure,
    },
    ScreeningStarted {
        kickoff: ScreeningKickoff,
    },
    ScreeningStartFailed,
    Status {
        purpose: StatusPurpose,
        attempt: u32,
        status: CandidateStatus,
    },
    StatusUnavailable {
        purpose: StatusPurpose,
        attempt: u32,
    },
    QuestionsLoaded {
        questions: Vec<Question>,
    },
    QuestionsUnavailable,
    InterviewAdvanced,
    AdvanceFailed,
}

impl BackendReply {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendReply::CandidateLookup { .. } => "candidate_lookup",
            BackendReply::CandidateLookupFailed => "candidate_lookup_failed",
            BackendReply::CandidateRegistered { .. } => "candidate_registered",
            BackendReply::RegistrationFailed => "registration_failed",
            BackendReply::ResumeStored { .. } => "resume_stored",
            BackendReply::ResumeRejected { .. } => "resume_rejected",
            BackendReply::ScreeningStarted { .. } => "screening_started",
            BackendReply::ScreeningStartFailed => "screening_start_failed",
            BackendReply::Status { .. } => "status",
            BackendReply::StatusUnavailable { .. } => "status_unavailable",
            BackendReply::QuestionsLoaded { .. } => "questions_loaded",
            BackendReply::QuestionsUnavailable => "questions_unavailable",
            BackendReply::InterviewAdvanced => "interview_advanced",
            BackendReply::AdvanceFailed => "advance_failed",
        }
    }
}
