//! Effects produced by state transitions

use super::event::{DocumentMeta, Event, StatusPurpose};
use super::state::{Session, SlotToken};
use crate::faq::QuickTopic;
use serde::Serialize;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist the new session snapshot
    PersistSession,

    /// Move a superseded session into the archive
    ArchiveSession { previous: Box<Session> },

    /// Send a message to the participant
    Deliver { message: Outbound },

    /// Arm a one-shot timer
    ScheduleTimer { timer: TimerSpec },

    /// Drop a timer that became irrelevant (best effort)
    CancelTimer { token: SlotToken },

    /// Check whether the participant is already a known candidate
    LookupCandidate,

    RegisterCandidate { profile: CandidateProfile },

    /// Hand the resume document to blob storage
    StoreResume {
        document: DocumentMeta,
        vacancy_ref: String,
    },

    StartScreening {
        candidate_ref: String,
        vacancy_ref: String,
    },

    /// Fetch the candidate status after `delay`
    PollStatus {
        purpose: StatusPurpose,
        attempt: u32,
        delay: Duration,
        candidate_ref: String,
        vacancy_ref: String,
    },

    LoadQuestions { vacancy_ref: String },

    /// Report a committed slot; failures never roll back the commit
    SubmitAnswer {
        candidate_ref: String,
        question_id: String,
        content: String,
        elapsed_secs: u64,
    },

    AdvanceInterview {
        candidate_ref: String,
        vacancy_ref: String,
    },

    /// Answer an out-of-band question without touching session state
    AnswerQuickQuestion {
        topic: QuickTopic,
        candidate_ref: Option<String>,
        vacancy_ref: Option<String>,
    },
}

impl Effect {
    pub fn say(text: impl Into<String>) -> Self {
        Effect::Deliver {
            message: Outbound::text(text),
        }
    }

    pub fn say_with(text: impl Into<String>, controls: Controls) -> Self {
        Effect::Deliver {
            message: Outbound::with_controls(text, controls),
        }
    }

    pub fn schedule(token: SlotToken, delay: Duration, kind: TimerKind) -> Self {
        Effect::ScheduleTimer {
            timer: TimerSpec { token, delay, kind },
        }
    }
}

/// Outbound chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outbound {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controls: Option<Controls>,
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: None,
        }
    }

    pub fn with_controls(text: impl Into<String>, controls: Controls) -> Self {
        Self {
            text: text.into(),
            controls: Some(controls),
        }
    }
}

/// Button sets attached to outbound messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Controls {
    InterviewReadiness,
    QuickQuestions,
}

impl Controls {
    /// (label, callback data) pairs, one button per row
    pub fn buttons(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Controls::InterviewReadiness => &[
                ("I'm ready for the interview", "start_interview"),
                ("Not ready yet", "not_ready"),
            ],
            Controls::QuickQuestions => &[
                ("What is my status?", "q_status"),
                ("When will I hear back?", "q_timing"),
                ("How can I contact you?", "q_contact"),
                ("Close", "q_close"),
            ],
        }
    }
}

/// Profile handed to `register_candidate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateProfile {
    pub participant_id: String,
    pub full_name: Option<String>,
    pub phone: String,
    pub handle: Option<String>,
    pub city: String,
}

/// What a timer delivers when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    QuestionExpiry,
    Pacing,
    RegistrationDeadline,
}

/// A one-shot timer carrying the token it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    pub token: SlotToken,
    pub delay: Duration,
    pub kind: TimerKind,
}

impl TimerSpec {
    /// The event delivered into the session queue on expiry
    pub fn fired_event(&self) -> Event {
        match self.kind {
            TimerKind::QuestionExpiry => Event::QuestionTimerFired { token: self.token },
            TimerKind::Pacing => Event::PacingElapsed { token: self.token },
            TimerKind::RegistrationDeadline => Event::RegistrationExpired { token: self.token },
        }
    }
}
