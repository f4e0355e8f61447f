//! Arbitration between an answer and the timeout for the open question slot.
//!
//! Both outcomes funnel through the session queue, so they are never applied
//! concurrently. What remains is deciding which one counts: the first event that
//! still finds the slot open commits it, and the commit rotates the slot token so
//! any timer armed for that slot becomes inert.

use super::effect::{TimerKind, TimerSpec};
use super::state::{Answer, Question, Session, SessionState, SlotToken, Stamp};
use chrono::{DateTime, Utc};

/// How an answer or timeout relates to the open slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotResolution {
    /// The event resolves the slot with this answer
    Commit { slot: usize, answer: Answer },
    /// The answer arrived after the slot's time limit
    Late { slot: usize },
    /// The event targets a slot that is no longer open
    Stale,
}

/// The slot that is currently open and not yet resolved
fn open_question(session: &Session) -> Option<(usize, &Question)> {
    let SessionState::AnsweringQuestion { slot } = session.state else {
        return None;
    };
    if session.active_slot != Some(slot) || session.answers.len() != slot {
        return None;
    }
    session.questions.get(slot).map(|q| (slot, q))
}

/// Resolve a text answer received at `at`
pub fn resolve_answer(session: &Session, content: &str, at: DateTime<Utc>) -> SlotResolution {
    let Some((slot, question)) = open_question(session) else {
        return SlotResolution::Stale;
    };
    let Some(opened_at) = session.slot_opened_at else {
        return SlotResolution::Stale;
    };

    let elapsed = at.signed_duration_since(opened_at);
    let limit_ms = i64::try_from(question.time_limit_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    if elapsed.num_milliseconds() > limit_ms {
        return SlotResolution::Late { slot };
    }

    SlotResolution::Commit {
        slot,
        answer: Answer::Text {
            content: content.to_string(),
            elapsed_secs: u64::try_from(elapsed.num_seconds()).unwrap_or(0),
        },
    }
}

/// Resolve a question timer carrying `token`
pub fn resolve_timeout(session: &Session, token: SlotToken) -> SlotResolution {
    if session.slot_token != Some(token) {
        return SlotResolution::Stale;
    }
    match open_question(session) {
        Some((slot, question)) => SlotResolution::Commit {
            slot,
            answer: Answer::Skipped {
                elapsed_secs: question.time_limit_secs,
            },
        },
        None => SlotResolution::Stale,
    }
}

/// Record `answer` for `slot` and rotate the token.
///
/// Returns false (leaving the session untouched) if the slot was already
/// resolved.
pub fn commit(session: &mut Session, slot: usize, answer: Answer, stamp: Stamp) -> bool {
    if session.active_slot != Some(slot) || session.answers.len() != slot {
        return false;
    }
    session.answers.push(answer);
    session.active_slot = None;
    session.slot_opened_at = None;
    session.slot_token = Some(stamp.token());
    true
}

/// Open `slot` with a fresh token and return the expiry timer to arm
pub fn open(session: &mut Session, slot: usize, stamp: Stamp) -> Option<TimerSpec> {
    let delay = session.questions.get(slot)?.time_limit();
    let token = stamp.token();
    session.state = SessionState::AnsweringQuestion { slot };
    session.active_slot = Some(slot);
    session.slot_token = Some(token);
    session.slot_opened_at = Some(stamp.at);
    Some(TimerSpec {
        token,
        delay,
        kind: TimerKind::QuestionExpiry,
    })
}
