//! Session state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Slot Tokens and Stamps
// ============================================================================

/// Opaque value identifying one opened slot (or one armed deadline).
///
/// A timer carries the token that was current when it was scheduled; once the
/// session rotates its token the timer is inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotToken(Uuid);

impl SlotToken {
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arrival metadata attached to every event by the runtime.
///
/// Carrying the clock reading and a fresh nonce on the event keeps the
/// transition function pure: the same (session, event, stamp) always yields
/// the same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub at: DateTime<Utc>,
    pub nonce: Uuid,
}

impl Stamp {
    pub fn new(at: DateTime<Utc>, nonce: Uuid) -> Self {
        Self { at, nonce }
    }

    pub fn now() -> Self {
        Self::new(Utc::now(), Uuid::new_v4())
    }

    /// The token minted by this stamp
    pub fn token(&self) -> SlotToken {
        SlotToken::from_uuid(self.nonce)
    }
}

// ============================================================================
// Profile
// ============================================================================

/// Fields collected during registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    Phone,
    Handle,
    City,
}

/// Registration sub-steps, visited strictly in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStep {
    Name,
    Phone,
    Handle,
    City,
    /// Profile handed to the backend, waiting for a candidate reference
    Submitting,
}

// ============================================================================
// Interview Content
// ============================================================================

/// One interview question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub content: String,
    pub time_limit_secs: u64,
}

impl Question {
    pub fn new(id: impl Into<String>, content: impl Into<String>, time_limit_secs: u64) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            time_limit_secs,
        }
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }
}

/// Resolution of one question slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    Text { content: String, elapsed_secs: u64 },
    /// The slot expired; the full time limit is recorded as elapsed
    Skipped { elapsed_secs: u64 },
}

impl Answer {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Answer::Skipped { .. })
    }

    pub fn elapsed_secs(&self) -> u64 {
        match self {
            Answer::Text { elapsed_secs, .. } | Answer::Skipped { elapsed_secs } => *elapsed_secs,
        }
    }

    /// Content reported to the backend
    pub fn submitted_content(&self) -> &str {
        match self {
            Answer::Text { content, .. } => content,
            Answer::Skipped { .. } => "skipped",
        }
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Workflow stage of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// No vacancy selected yet
    #[default]
    Idle,

    CollectingProfile {
        step: ProfileStep,
    },

    AwaitingResume {
        /// A document is being handed to blob storage
        #[serde(default)]
        uploading: bool,
    },

    /// Screening requested, waiting for the backend decision
    AwaitingScreeningDecision,

    /// Screening passed, waiting for the participant to start
    AwaitingInterviewReadiness,

    /// Live question list requested from the backend
    LoadingQuestions,

    AnsweringQuestion {
        slot: usize,
    },

    /// Previous slot committed, next one opens after the pacing delay
    BetweenQuestions {
        next_slot: usize,
    },

    /// Every slot resolved, waiting for the interview outcome
    Completed,

    Passed,
    Rejected,

    /// Registration was not finished before its deadline
    Abandoned,
}

impl SessionState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Passed | SessionState::Rejected | SessionState::Abandoned
        )
    }

    /// Registration stages covered by the registration deadline
    pub fn is_registering(&self) -> bool {
        matches!(
            self,
            SessionState::CollectingProfile { .. } | SessionState::AwaitingResume { .. }
        )
    }

    /// Snake-case name used in logs and API payloads
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::CollectingProfile { .. } => "collecting_profile",
            SessionState::AwaitingResume { .. } => "awaiting_resume",
            SessionState::AwaitingScreeningDecision => "awaiting_screening_decision",
            SessionState::AwaitingInterviewReadiness => "awaiting_interview_readiness",
            SessionState::LoadingQuestions => "loading_questions",
            SessionState::AnsweringQuestion { .. } => "answering_question",
            SessionState::BetweenQuestions { .. } => "between_questions",
            SessionState::Completed => "completed",
            SessionState::Passed => "passed",
            SessionState::Rejected => "rejected",
            SessionState::Abandoned => "abandoned",
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Everything stored for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub participant_id: String,
    pub state: SessionState,
    /// Set when the session starts, never changed afterwards
    pub vacancy_ref: Option<String>,
    /// Assigned once the backend accepts the registration
    pub candidate_ref: Option<String>,
    #[serde(default)]
    pub profile: BTreeMap<ProfileField, String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    pub active_slot: Option<usize>,
    pub slot_token: Option<SlotToken>,
    pub slot_opened_at: Option<DateTime<Utc>>,
    /// Token of the armed registration deadline, if any
    #[serde(default)]
    pub deadline_token: Option<SlotToken>,
    #[serde(default)]
    pub resume_key: Option<String>,
    /// Bumped on every persisted transition; guards concurrent writers
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A session that has not selected a vacancy yet
    pub fn new(participant_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            participant_id: participant_id.into(),
            state: SessionState::Idle,
            vacancy_ref: None,
            candidate_ref: None,
            profile: BTreeMap::new(),
            questions: Vec::new(),
            answers: Vec::new(),
            active_slot: None,
            slot_token: None,
            slot_opened_at: None,
            deadline_token: None,
            resume_key: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A fresh session for a vacancy, carrying over the storage version so the
    /// store's version guard still applies to the replacement row
    pub fn started(previous: &Session, vacancy_ref: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut session = Session::new(previous.participant_id.clone(), now);
        session.vacancy_ref = Some(vacancy_ref.into());
        session.version = previous.version;
        session
    }

    /// The question behind the open slot
    pub fn active_question(&self) -> Option<&Question> {
        self.active_slot.and_then(|slot| self.questions.get(slot))
    }

    pub fn profile_value(&self, field: ProfileField) -> Option<&str> {
        self.profile.get(&field).map(String::as_str)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| !a.is_skipped()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_skipped()).count()
    }
}
