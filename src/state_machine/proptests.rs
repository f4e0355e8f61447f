//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::context::DEFAULT_PHONE_PATTERN;
use super::*;
use crate::faq::QuickTopic;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Test Helpers
// ============================================================================

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

fn test_context(pacing: bool) -> InterviewContext {
    let ctx = InterviewContext::new(DEFAULT_PHONE_PATTERN).unwrap();
    if pacing {
        ctx
    } else {
        ctx.with_pacing_delay(Duration::ZERO)
    }
}

fn stamp(offset_ms: i64, nonce: u128) -> Stamp {
    Stamp::new(
        base_time() + chrono::Duration::milliseconds(offset_ms),
        Uuid::from_u128(nonce),
    )
}

fn token(n: u128) -> SlotToken {
    SlotToken::from_uuid(Uuid::from_u128(n))
}

/// A session with `limits.len()` questions and slot `slot` open
fn interviewing(limits: &[u64], slot: usize) -> Session {
    let mut session = Session::new("42", base_time());
    session.vacancy_ref = Some("V1".into());
    session.candidate_ref = Some("cand-1".into());
    session.questions = limits
        .iter()
        .enumerate()
        .map(|(i, limit)| Question::new(format!("q{i}"), format!("Question {i}"), *limit))
        .collect();
    session.answers = (0..slot)
        .map(|i| Answer::Text {
            content: format!("a{i}"),
            elapsed_secs: 1,
        })
        .collect();
    session.state = SessionState::AnsweringQuestion { slot };
    session.active_slot = Some(slot);
    session.slot_token = Some(token(1));
    session.slot_opened_at = Some(base_time());
    session
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_limits() -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(1u64..120, 1..6)
}

fn arb_interviewing() -> impl Strategy<Value = Session> {
    arb_limits().prop_flat_map(|limits| {
        let len = limits.len();
        (Just(limits), 0..len).prop_map(|(limits, slot)| interviewing(&limits, slot))
    })
}

fn arb_terminal_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Passed),
        Just(SessionState::Rejected),
        Just(SessionState::Abandoned),
    ]
}

fn arb_status() -> impl Strategy<Value = CandidateStatus> {
    prop_oneof![
        Just(CandidateStatus::ScreeningOk),
        Just(CandidateStatus::ScreeningFailed),
        Just(CandidateStatus::InterviewOk),
        Just(CandidateStatus::InterviewFailed),
        Just(CandidateStatus::Unknown),
    ]
}

fn arb_purpose() -> impl Strategy<Value = StatusPurpose> {
    prop_oneof![
        Just(StatusPurpose::Screening),
        Just(StatusPurpose::Outcome),
        Just(StatusPurpose::Resume),
        Just(StatusPurpose::Returning),
    ]
}

/// Events a participant or collaborator can produce, commands excluded
fn arb_non_command_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,30}".prop_map(Event::text),
        ("[a-z]{1,8}\\.(pdf|docx|txt)", 1u64..10_000_000).prop_map(|(file_name, size_bytes)| {
            Event::UserDocument {
                document: DocumentMeta {
                    file_name,
                    size_bytes,
                    file_ref: "f-1".into(),
                },
            }
        }),
        Just(Event::button(Action::StartInterview)),
        Just(Event::button(Action::NotReady)),
        (0u128..4).prop_map(|n| Event::QuestionTimerFired { token: token(n) }),
        (0u128..4).prop_map(|n| Event::PacingElapsed { token: token(n) }),
        (0u128..4).prop_map(|n| Event::RegistrationExpired { token: token(n) }),
        (arb_purpose(), 1u32..5, arb_status()).prop_map(|(purpose, attempt, status)| {
            Event::reply(BackendReply::Status {
                purpose,
                attempt,
                status,
            })
        }),
        Just(Event::reply(BackendReply::InterviewAdvanced)),
        Just(Event::reply(BackendReply::ResumeStored {
            storage_key: "42/V1".into()
        })),
        Just(Event::reply(BackendReply::CandidateLookup {
            candidate_ref: None
        })),
    ]
}

/// Steps in a race between answers and timers for the open slot
#[derive(Debug, Clone)]
enum RaceStep {
    /// Answer after waiting this many milliseconds
    Answer(i64),
    /// The timer for the current token fires after this many milliseconds
    CurrentTimer(i64),
    /// A timer from an earlier slot fires
    StaleTimer(u128),
    /// The pacing timer for the current token fires
    Pacing,
}

fn arb_race_step() -> impl Strategy<Value = RaceStep> {
    prop_oneof![
        (0i64..150_000).prop_map(RaceStep::Answer),
        (0i64..150_000).prop_map(RaceStep::CurrentTimer),
        (1000u128..1010).prop_map(RaceStep::StaleTimer),
        Just(RaceStep::Pacing),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Same session, event and stamp always produce the same result
    #[test]
    fn prop_transition_is_deterministic(session in arb_interviewing(), event in arb_non_command_event(), offset in 0i64..200_000) {
        let ctx = test_context(true);
        let a = transition(&session, &ctx, event.clone(), stamp(offset, 7));
        let b = transition(&session, &ctx, event, stamp(offset, 7));
        match (a, b) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.session, b.session);
                prop_assert_eq!(a.effects, b.effects);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            _ => prop_assert!(false, "outcomes diverged"),
        }
    }

    /// Terminal sessions never change state except through `/start`
    #[test]
    fn prop_terminal_states_absorb(state in arb_terminal_state(), event in arb_non_command_event()) {
        let mut session = interviewing(&[60], 0);
        session.state = state.clone();
        session.active_slot = None;

        let result = transition(&session, &test_context(true), event, stamp(1000, 7)).unwrap();
        prop_assert_eq!(&result.session, &session);
        for effect in &result.effects {
            prop_assert!(matches!(effect, Effect::Deliver { .. }), "unexpected effect {:?}", effect);
        }
    }

    /// Version bookkeeping belongs to the store, never to transitions
    #[test]
    fn prop_transitions_keep_version(mut session in arb_interviewing(), version in 0u64..100, event in arb_non_command_event()) {
        session.version = version;
        if let Ok(result) = transition(&session, &test_context(false), event, stamp(500, 7)) {
            prop_assert_eq!(result.session.version, version);
        }
    }

    /// A changed snapshot is always persisted, before any other effect runs
    #[test]
    fn prop_state_changes_persist(session in arb_interviewing(), event in arb_non_command_event(), offset in 0i64..200_000) {
        if let Ok(result) = transition(&session, &test_context(true), event, stamp(offset, 7)) {
            if result.session != session {
                prop_assert_eq!(result.effects.first(), Some(&Effect::PersistSession));
            }
            prop_assert!(!result.effects.iter().skip(1).any(|e| *e == Effect::PersistSession));
        }
    }

    /// Timers carrying a token other than the slot's are inert
    #[test]
    fn prop_stale_timer_is_noop(session in arb_interviewing(), n in 2u128..1000) {
        let result = transition(
            &session,
            &test_context(true),
            Event::QuestionTimerFired { token: token(n) },
            stamp(500, 7),
        ).unwrap();
        prop_assert!(result.is_noop());
        prop_assert_eq!(result.session, session);
    }

    /// An answer after the limit never commits and keeps the slot open
    #[test]
    fn prop_late_answer_never_commits(limits in arb_limits(), extra_ms in 1i64..60_000) {
        let session = interviewing(&limits, 0);
        let limit_ms = i64::try_from(limits[0] * 1000).unwrap();
        let result = transition(
            &session,
            &test_context(true),
            Event::text("too late"),
            stamp(limit_ms + extra_ms, 7),
        ).unwrap();
        prop_assert_eq!(&result.session, &session);
        prop_assert!(result.effects.contains(&Effect::say(messages::ANSWER_TOO_LATE)));
    }

    /// An answer within the limit commits exactly the open slot
    #[test]
    fn prop_timely_answer_commits(session in arb_interviewing(), fraction in 0.0f64..=1.0) {
        let slot = session.answers.len();
        let limit_ms = session.questions[slot].time_limit_secs * 1000;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let at = (limit_ms as f64 * fraction) as u64;
        let result = transition(
            &session,
            &test_context(true),
            Event::text("my answer"),
            stamp(i64::try_from(at).unwrap(), 7),
        ).unwrap();
        prop_assert_eq!(result.session.answers.len(), slot + 1);
        let committed = matches!(
            &result.session.answers[slot],
            Answer::Text { content, .. } if content == "my answer"
        );
        prop_assert!(committed, "answer not committed: {:?}", result.session.answers[slot]);
        prop_assert_ne!(result.session.slot_token, session.slot_token);
    }

    /// Whatever the interleaving, each slot commits at most once, answers stay
    /// in slot order and every commit is reported exactly once
    #[test]
    fn prop_each_slot_commits_once(
        limits in arb_limits(),
        steps in proptest::collection::vec(arb_race_step(), 1..40),
        pacing in any::<bool>(),
    ) {
        let ctx = test_context(pacing);
        let mut session = interviewing(&limits, 0);
        let mut now_ms = 0i64;
        let mut submitted = Vec::new();

        for (i, step) in steps.into_iter().enumerate() {
            let nonce = 100 + i as u128;
            let event = match step {
                RaceStep::Answer(wait) => {
                    now_ms += wait;
                    Event::text(format!("answer {i}"))
                }
                RaceStep::CurrentTimer(wait) => {
                    now_ms += wait;
                    match session.slot_token {
                        Some(token) => Event::QuestionTimerFired { token },
                        None => continue,
                    }
                }
                RaceStep::StaleTimer(n) => Event::QuestionTimerFired { token: token(n) },
                RaceStep::Pacing => match session.slot_token {
                    Some(token) => Event::PacingElapsed { token },
                    None => continue,
                },
            };

            let before = session.answers.len();
            let result = transition(&session, &ctx, event, stamp(now_ms, nonce)).unwrap();
            let after = result.session.answers.len();
            prop_assert!(after == before || after == before + 1);
            prop_assert!(after <= limits.len());

            for effect in &result.effects {
                if let Effect::SubmitAnswer { question_id, .. } = effect {
                    submitted.push(question_id.clone());
                }
            }
            session = result.session;
        }

        let unique: HashSet<_> = submitted.iter().collect();
        prop_assert_eq!(unique.len(), submitted.len());
        prop_assert_eq!(submitted.len(), session.answers.len());
        for (i, id) in submitted.iter().enumerate() {
            prop_assert_eq!(id, &format!("q{i}"));
        }
        if session.answers.len() == limits.len() {
            prop_assert_eq!(session.state, SessionState::Completed);
        }
    }

    /// Quick questions never touch session state
    #[test]
    fn prop_quick_questions_are_stateless(session in arb_interviewing(), topic in prop_oneof![
        Just(QuickTopic::Status),
        Just(QuickTopic::Timing),
        Just(QuickTopic::Contact),
        Just(QuickTopic::Close),
    ]) {
        let result = transition(
            &session,
            &test_context(true),
            Event::button(Action::Quick(topic)),
            stamp(500, 7),
        ).unwrap();
        prop_assert_eq!(result.session, session);
        prop_assert!(!result.effects.contains(&Effect::PersistSession));
    }

    /// Only the phone pattern gates the phone sub-step
    #[test]
    fn prop_phone_step_accepts_only_valid_numbers(digits in "[0-9]{5,12}") {
        let mut session = Session::new("42", base_time());
        session.vacancy_ref = Some("V1".into());
        session.state = SessionState::CollectingProfile { step: ProfileStep::Phone };

        let phone = format!("+7{digits}");
        let result = transition(&session, &test_context(true), Event::text(phone.as_str()), stamp(0, 7)).unwrap();
        if digits.len() == 10 {
            prop_assert_eq!(result.session.profile_value(ProfileField::Phone), Some(phone.as_str()));
            prop_assert_eq!(result.session.state, SessionState::CollectingProfile { step: ProfileStep::Handle });
        } else {
            prop_assert_eq!(result.session.state, SessionState::CollectingProfile { step: ProfileStep::Phone });
            prop_assert!(result.effects.contains(&Effect::say(messages::INVALID_PHONE)));
        }
    }
}
