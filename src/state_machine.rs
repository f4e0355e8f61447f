//! Interview session state machine
//!
//! Pure transitions over a [`Session`] snapshot. Events in, new snapshot and
//! effects out; the runtime owns every side effect.

pub mod context;
mod effect;
pub mod event;
pub mod messages;
mod race;
pub mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use context::{InterviewContext, QuestionSource};
pub use effect::{CandidateProfile, Controls, Effect, Outbound, TimerKind, TimerSpec};
pub use event::{
    Action, BackendReply, CandidateStatus, Command, DocumentMeta, Event, ScreeningKickoff,
    StatusPurpose, UploadFailure,
};
pub use state::{
    Answer, ProfileField, ProfileStep, Question, Session, SessionState, SlotToken, Stamp,
};
pub use transition::transition;
