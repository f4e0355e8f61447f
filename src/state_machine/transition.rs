//! Pure state transition function
//!
//! Every participant event is evaluated here against the current session
//! snapshot. Nothing in this module performs I/O: the clock reading and fresh
//! token material arrive on the [`Stamp`], and side effects are returned as
//! [`Effect`]s for the runtime to execute.

use super::context::{InterviewContext, QuestionSource};
use super::effect::{CandidateProfile, Controls, Effect, TimerKind};
use super::event::{
    Action, BackendReply, CandidateStatus, Command, DocumentMeta, Event, ScreeningKickoff,
    StatusPurpose, UploadFailure,
};
use super::messages;
use super::race::{self, SlotResolution};
use super::state::{Answer, ProfileField, ProfileStep, Question, Session, SessionState, Stamp};
use crate::faq::QuickTopic;
use std::time::Duration;
use thiserror::Error;

/// Profile value meaning "not provided"
const NOT_PROVIDED: &str = "-";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    /// The session as it was, with no effects yet
    pub fn unchanged(session: &Session) -> Self {
        Self::new(session.clone())
    }

    fn persisted(session: Session) -> Self {
        Self::new(session).with_effect(Effect::PersistSession)
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    fn say(self, text: impl Into<String>) -> Self {
        self.with_effect(Effect::say(text))
    }

    /// The event left no trace at all (stale timer, duplicate press)
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Unexpected {event} in state {state}")]
    UnexpectedEvent {
        state: &'static str,
        event: &'static str,
    },
    #[error("Session has no {0}")]
    MissingField(&'static str),
}

type Transition = Result<TransitionResult, TransitionError>;

/// Pure transition function
///
/// Given the same session, context, event and stamp this always yields the same
/// result.
pub fn transition(
    session: &Session,
    ctx: &InterviewContext,
    event: Event,
    stamp: Stamp,
) -> Transition {
    match (&session.state, event) {
        // ============================================================
        // Commands and Quick Questions (any state)
        // ============================================================
        (_, Event::Command { command }) => on_command(session, ctx, command, stamp),

        (_, Event::ButtonPressed {
            action: Action::Quick(topic),
        }) => Ok(quick_question(session, topic)),

        // ============================================================
        // Terminal States
        // ============================================================
        (state, Event::UserText { .. } | Event::UserDocument { .. }) if state.is_terminal() => {
            Ok(TransitionResult::unchanged(session).say(messages::closed(session)))
        }

        (state, _) if state.is_terminal() => Ok(TransitionResult::unchanged(session)),

        // ============================================================
        // Registration
        // ============================================================
        (SessionState::Idle, Event::UserText { .. }) => {
            let text = if session.vacancy_ref.is_some() {
                messages::ONE_MOMENT
            } else {
                messages::START_WITHOUT_VACANCY
            };
            Ok(TransitionResult::unchanged(session).say(text))
        }

        (SessionState::CollectingProfile { step }, Event::UserText { text }) => {
            on_profile_text(session, ctx, *step, &text, stamp)
        }

        (SessionState::CollectingProfile { step }, Event::UserDocument { .. }) => {
            Ok(TransitionResult::unchanged(session)
                .say(messages::FINISH_REGISTRATION_FIRST)
                .say(profile_prompt(*step)))
        }

        (
            SessionState::AwaitingResume { uploading: true },
            Event::UserText { .. } | Event::UserDocument { .. },
        ) => Ok(TransitionResult::unchanged(session).say(messages::UPLOAD_IN_PROGRESS)),

        (SessionState::AwaitingResume { .. }, Event::UserText { .. }) => {
            Ok(TransitionResult::unchanged(session).say(messages::RESUME_NOT_TEXT))
        }

        (SessionState::AwaitingResume { .. }, Event::UserDocument { document }) => {
            on_resume_document(session, ctx, document, stamp)
        }

        (_, Event::RegistrationExpired { token }) => {
            if session.state.is_registering() && session.deadline_token == Some(token) {
                let mut next = touched(session, stamp);
                next.state = SessionState::Abandoned;
                next.deadline_token = None;
                Ok(TransitionResult::persisted(next).say(messages::ABANDONED))
            } else {
                Ok(TransitionResult::unchanged(session))
            }
        }

        // ============================================================
        // Screening and Readiness
        // ============================================================
        (SessionState::AwaitingScreeningDecision, Event::UserText { .. }) => {
            Ok(TransitionResult::unchanged(session).say(messages::SCREENING_IN_PROGRESS))
        }

        (
            SessionState::AwaitingInterviewReadiness,
            Event::ButtonPressed {
                action: Action::StartInterview,
            },
        ) => start_interview(session, ctx, stamp),

        (
            SessionState::AwaitingInterviewReadiness,
            Event::ButtonPressed {
                action: Action::NotReady,
            },
        ) => Ok(TransitionResult::unchanged(session).say(messages::NOT_READY)),

        (SessionState::AwaitingInterviewReadiness, Event::UserText { .. }) => {
            Ok(TransitionResult::unchanged(session).with_effect(Effect::say_with(
                messages::PRESS_READY,
                Controls::InterviewReadiness,
            )))
        }

        // ============================================================
        // Interview Loop
        // ============================================================
        (SessionState::LoadingQuestions, Event::UserText { .. }) => {
            Ok(TransitionResult::unchanged(session).say(messages::PREPARING_QUESTIONS))
        }

        (SessionState::AnsweringQuestion { .. }, Event::UserText { text }) => {
            match race::resolve_answer(session, &text, stamp.at) {
                SlotResolution::Commit { slot, answer } => {
                    commit_slot(session, ctx, slot, &answer, stamp)
                }
                SlotResolution::Late { .. } => {
                    Ok(TransitionResult::unchanged(session).say(messages::ANSWER_TOO_LATE))
                }
                SlotResolution::Stale => Ok(TransitionResult::unchanged(session)),
            }
        }

        (SessionState::AnsweringQuestion { .. }, Event::QuestionTimerFired { token }) => {
            match race::resolve_timeout(session, token) {
                SlotResolution::Commit { slot, answer } => {
                    commit_slot(session, ctx, slot, &answer, stamp)
                }
                SlotResolution::Late { .. } | SlotResolution::Stale => {
                    Ok(TransitionResult::unchanged(session))
                }
            }
        }

        (SessionState::BetweenQuestions { next_slot }, Event::PacingElapsed { token })
            if session.slot_token == Some(token) && session.answers.len() == *next_slot =>
        {
            let mut result = TransitionResult::persisted(touched(session, stamp));
            open_or_complete(&mut result, *next_slot, stamp)?;
            Ok(result)
        }

        (SessionState::BetweenQuestions { .. }, Event::UserText { .. }) => {
            Ok(TransitionResult::unchanged(session).say(messages::WAIT_FOR_NEXT_QUESTION))
        }

        (SessionState::Completed, Event::UserText { .. }) => {
            Ok(TransitionResult::unchanged(session).say(messages::RESULTS_PENDING))
        }

        // ============================================================
        // Collaborator Replies
        // ============================================================
        (_, Event::BackendReply { reply }) => on_reply(session, ctx, reply, stamp),

        // ============================================================
        // Redirects and Stale Events
        // ============================================================
        (_, Event::UserDocument { .. }) => {
            Ok(TransitionResult::unchanged(session).say(messages::DOCUMENT_NOT_EXPECTED))
        }

        // Stale timers, duplicate button presses
        (
            _,
            Event::UserText { .. }
            | Event::ButtonPressed { .. }
            | Event::QuestionTimerFired { .. }
            | Event::PacingElapsed { .. },
        ) => Ok(TransitionResult::unchanged(session)),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn on_command(
    session: &Session,
    ctx: &InterviewContext,
    command: Command,
    stamp: Stamp,
) -> Transition {
    match command {
        Command::Start {
            vacancy_ref: Some(vacancy_ref),
            handle,
        } => Ok(start_session(session, vacancy_ref, handle.as_deref(), stamp)),
        Command::Start {
            vacancy_ref: None, ..
        } => Ok(TransitionResult::unchanged(session).say(messages::START_WITHOUT_VACANCY)),
        Command::Resume => on_resume(session, ctx),
        Command::Questions => Ok(TransitionResult::unchanged(session).with_effect(
            Effect::say_with(messages::QUICK_MENU, Controls::QuickQuestions),
        )),
        Command::Unknown(_) => Ok(TransitionResult::unchanged(session).say(messages::HELP)),
    }
}

/// Replace the current session with a fresh one for `vacancy_ref`
fn start_session(
    session: &Session,
    vacancy_ref: String,
    handle: Option<&str>,
    stamp: Stamp,
) -> TransitionResult {
    let mut next = Session::started(session, vacancy_ref, stamp.at);
    if let Some(handle) = handle.map(str::trim).filter(|h| !h.is_empty()) {
        next.profile
            .insert(ProfileField::Handle, normalize_handle(handle));
    }

    let mut effects = vec![Effect::PersistSession];
    if session.state != SessionState::Idle || session.vacancy_ref.is_some() {
        effects.push(Effect::ArchiveSession {
            previous: Box::new(session.clone()),
        });
    }
    effects.extend(
        [session.slot_token, session.deadline_token]
            .into_iter()
            .flatten()
            .map(|token| Effect::CancelTimer { token }),
    );
    effects.push(Effect::LookupCandidate);

    TransitionResult::new(next).with_effects(effects)
}

fn on_resume(session: &Session, ctx: &InterviewContext) -> Transition {
    let result = TransitionResult::unchanged(session);
    match &session.state {
        SessionState::Passed | SessionState::Rejected | SessionState::Abandoned => {
            Ok(result.say(messages::closed(session)))
        }
        SessionState::Idle => match (&session.vacancy_ref, &session.candidate_ref) {
            (None, _) => Ok(result.say(messages::NO_ACTIVE_PROCESS)),
            (Some(_), None) => Ok(result
                .say(messages::ONE_MOMENT)
                .with_effect(Effect::LookupCandidate)),
            (Some(_), Some(_)) => Ok(result.with_effect(poll(
                session,
                StatusPurpose::Returning,
                1,
                Duration::ZERO,
            )?)),
        },
        SessionState::CollectingProfile { step } => Ok(result.say(profile_prompt(*step))),
        SessionState::AwaitingResume { uploading: true } => {
            Ok(result.say(messages::UPLOAD_IN_PROGRESS))
        }
        SessionState::AwaitingResume { uploading: false } => {
            Ok(result.say(messages::ask_resume(ctx.max_resume_bytes)))
        }
        SessionState::LoadingQuestions => Ok(result.say(messages::PREPARING_QUESTIONS)),
        SessionState::AnsweringQuestion { .. } | SessionState::BetweenQuestions { .. } => {
            Ok(result.say(messages::INTERVIEW_IN_PROGRESS))
        }
        SessionState::AwaitingScreeningDecision
        | SessionState::AwaitingInterviewReadiness
        | SessionState::Completed => Ok(result.with_effect(poll(
            session,
            StatusPurpose::Resume,
            1,
            Duration::ZERO,
        )?)),
    }
}

fn quick_question(session: &Session, topic: QuickTopic) -> TransitionResult {
    let result = TransitionResult::unchanged(session);
    match topic {
        QuickTopic::Close => result.say(messages::MENU_CLOSED),
        topic => result.with_effect(Effect::AnswerQuickQuestion {
            topic,
            candidate_ref: session.candidate_ref.clone(),
            vacancy_ref: session.vacancy_ref.clone(),
        }),
    }
}

// ============================================================================
// Registration
// ============================================================================

fn begin_registration(session: &Session, ctx: &InterviewContext, stamp: Stamp) -> TransitionResult {
    let mut next = touched(session, stamp);
    let token = stamp.token();
    next.state = SessionState::CollectingProfile {
        step: ProfileStep::Name,
    };
    next.deadline_token = Some(token);
    TransitionResult::persisted(next)
        .say(messages::WELCOME)
        .with_effect(Effect::schedule(
            token,
            ctx.registration_timeout,
            TimerKind::RegistrationDeadline,
        ))
}

fn on_profile_text(
    session: &Session,
    ctx: &InterviewContext,
    step: ProfileStep,
    text: &str,
    stamp: Stamp,
) -> Transition {
    let value = text.trim();
    if value.is_empty() {
        return Ok(TransitionResult::unchanged(session).say(profile_prompt(step)));
    }

    let mut next = touched(session, stamp);
    let next_step = match step {
        ProfileStep::Name => {
            if value != NOT_PROVIDED {
                next.profile.insert(ProfileField::Name, value.to_string());
            }
            ProfileStep::Phone
        }
        ProfileStep::Phone => {
            if !ctx.is_valid_phone(value) {
                return Ok(TransitionResult::unchanged(session).say(messages::INVALID_PHONE));
            }
            next.profile.insert(ProfileField::Phone, value.to_string());
            if next.profile.contains_key(&ProfileField::Handle) {
                ProfileStep::City
            } else {
                ProfileStep::Handle
            }
        }
        ProfileStep::Handle => {
            if value != NOT_PROVIDED {
                next.profile
                    .insert(ProfileField::Handle, normalize_handle(value));
            }
            ProfileStep::City
        }
        ProfileStep::City => {
            next.profile.insert(ProfileField::City, value.to_string());
            ProfileStep::Submitting
        }
        ProfileStep::Submitting => {
            return Ok(TransitionResult::unchanged(session).say(messages::SAVING_PROFILE));
        }
    };

    next.state = SessionState::CollectingProfile { step: next_step };
    if next_step == ProfileStep::Submitting {
        let profile = candidate_profile(&next)?;
        Ok(TransitionResult::persisted(next).with_effect(Effect::RegisterCandidate { profile }))
    } else {
        Ok(TransitionResult::persisted(next).say(messages::accepted(profile_prompt(next_step))))
    }
}

fn on_resume_document(
    session: &Session,
    ctx: &InterviewContext,
    document: DocumentMeta,
    stamp: Stamp,
) -> Transition {
    if !ctx.accepts_file_name(&document.file_name) {
        return Ok(TransitionResult::unchanged(session)
            .say(messages::wrong_format(&ctx.accepted_extensions)));
    }
    if document.size_bytes > ctx.max_resume_bytes {
        return Ok(TransitionResult::unchanged(session)
            .say(messages::too_large(document.size_bytes, ctx.max_resume_bytes)));
    }

    let vacancy_ref = required(session.vacancy_ref.as_deref(), "vacancy_ref")?;
    let mut next = touched(session, stamp);
    next.state = SessionState::AwaitingResume { uploading: true };
    Ok(TransitionResult::persisted(next)
        .say(messages::UPLOADING_RESUME)
        .with_effect(Effect::StoreResume {
            document,
            vacancy_ref,
        }))
}

/// Known candidate without a process for this vacancy: only the resume is missing
fn await_resume(session: &Session, ctx: &InterviewContext, stamp: Stamp) -> TransitionResult {
    let mut next = touched(session, stamp);
    let token = stamp.token();
    next.state = SessionState::AwaitingResume { uploading: false };
    next.deadline_token = Some(token);
    TransitionResult::persisted(next)
        .say(messages::ask_resume(ctx.max_resume_bytes))
        .with_effect(Effect::schedule(
            token,
            ctx.registration_timeout,
            TimerKind::RegistrationDeadline,
        ))
}

fn resume_stored(session: &Session, storage_key: String, stamp: Stamp) -> Transition {
    let candidate_ref = required(session.candidate_ref.as_deref(), "candidate_ref")?;
    let vacancy_ref = required(session.vacancy_ref.as_deref(), "vacancy_ref")?;

    let mut next = touched(session, stamp);
    next.resume_key = Some(storage_key);
    next.state = SessionState::AwaitingScreeningDecision;
    let deadline = next.deadline_token.take();
    let confirmation = messages::profile_confirmed(&next);

    Ok(TransitionResult::persisted(next)
        .with_effects(deadline.map(|token| Effect::CancelTimer { token }))
        .say(confirmation)
        .say(messages::SCREENING_IN_PROGRESS)
        .with_effect(Effect::StartScreening {
            candidate_ref,
            vacancy_ref,
        }))
}

// ============================================================================
// Interview
// ============================================================================

fn start_interview(session: &Session, ctx: &InterviewContext, stamp: Stamp) -> Transition {
    match &ctx.question_source {
        QuestionSource::Static(questions) => begin_interview(session, ctx, questions.clone(), stamp),
        QuestionSource::Live => {
            let vacancy_ref = required(session.vacancy_ref.as_deref(), "vacancy_ref")?;
            let mut next = touched(session, stamp);
            next.state = SessionState::LoadingQuestions;
            Ok(TransitionResult::persisted(next)
                .say(messages::PREPARING_QUESTIONS)
                .with_effect(Effect::LoadQuestions { vacancy_ref }))
        }
    }
}

fn begin_interview(
    session: &Session,
    ctx: &InterviewContext,
    questions: Vec<Question>,
    stamp: Stamp,
) -> Transition {
    let mut next = touched(session, stamp);
    next.questions = questions
        .into_iter()
        .map(|q| ctx.normalize_question(q))
        .collect();
    next.answers.clear();

    let mut result = TransitionResult::persisted(next).say(messages::interview_starting());
    open_or_complete(&mut result, 0, stamp)?;
    Ok(result)
}

/// Open `slot`, or complete the interview once every slot is resolved
fn open_or_complete(
    result: &mut TransitionResult,
    slot: usize,
    stamp: Stamp,
) -> Result<(), TransitionError> {
    let session = &mut result.session;
    let text = session
        .questions
        .get(slot)
        .map(|q| messages::question(slot, session.questions.len(), q));

    match (text, race::open(session, slot, stamp)) {
        (Some(text), Some(timer)) => {
            result.effects.push(Effect::say(text));
            result.effects.push(Effect::ScheduleTimer { timer });
            Ok(())
        }
        _ => complete(result),
    }
}

fn complete(result: &mut TransitionResult) -> Result<(), TransitionError> {
    let session = &mut result.session;
    session.state = SessionState::Completed;
    session.active_slot = None;
    session.slot_opened_at = None;

    let summary = messages::interview_summary(session);
    let candidate_ref = required(session.candidate_ref.as_deref(), "candidate_ref")?;
    let vacancy_ref = required(session.vacancy_ref.as_deref(), "vacancy_ref")?;

    result.effects.push(Effect::say(summary));
    result.effects.push(Effect::AdvanceInterview {
        candidate_ref,
        vacancy_ref,
    });
    Ok(())
}

/// Commit a resolved slot and move on (pacing, next slot or completion)
fn commit_slot(
    session: &Session,
    ctx: &InterviewContext,
    slot: usize,
    answer: &Answer,
    stamp: Stamp,
) -> Transition {
    let Some(question_id) = session.questions.get(slot).map(|q| q.id.clone()) else {
        return Ok(TransitionResult::unchanged(session));
    };
    let candidate_ref = required(session.candidate_ref.as_deref(), "candidate_ref")?;

    let mut next = touched(session, stamp);
    if !race::commit(&mut next, slot, answer.clone(), stamp) {
        return Ok(TransitionResult::unchanged(session));
    }

    let mut result = TransitionResult::persisted(next);
    if answer.is_skipped() {
        result = result.say(messages::TIME_UP);
    } else {
        // The expiry timer would be discarded by token anyway
        result = result
            .with_effects(session.slot_token.map(|token| Effect::CancelTimer { token }))
            .say(messages::ANSWER_ACCEPTED);
    }
    result = result.with_effect(Effect::SubmitAnswer {
        candidate_ref,
        question_id,
        content: answer.submitted_content().to_string(),
        elapsed_secs: answer.elapsed_secs(),
    });

    let next_slot = slot + 1;
    if next_slot >= result.session.questions.len() {
        complete(&mut result)?;
    } else if ctx.pacing_delay.is_zero() {
        open_or_complete(&mut result, next_slot, stamp)?;
    } else {
        result.session.state = SessionState::BetweenQuestions { next_slot };
        // Token rotated by the commit
        let token = stamp.token();
        result = result.with_effect(Effect::schedule(token, ctx.pacing_delay, TimerKind::Pacing));
    }
    Ok(result)
}

// ============================================================================
// Collaborator Replies
// ============================================================================

fn on_reply(
    session: &Session,
    ctx: &InterviewContext,
    reply: BackendReply,
    stamp: Stamp,
) -> Transition {
    let awaiting_lookup = session.vacancy_ref.is_some() && session.candidate_ref.is_none();

    match (&session.state, reply) {
        (
            SessionState::Idle,
            BackendReply::CandidateLookup {
                candidate_ref: Some(candidate_ref),
            },
        ) if awaiting_lookup => {
            let mut next = touched(session, stamp);
            next.candidate_ref = Some(candidate_ref);
            let effect = poll(&next, StatusPurpose::Returning, 1, Duration::ZERO)?;
            Ok(TransitionResult::persisted(next).with_effect(effect))
        }

        (
            SessionState::Idle,
            BackendReply::CandidateLookup {
                candidate_ref: None,
            }
            | BackendReply::CandidateLookupFailed,
        ) if awaiting_lookup => Ok(begin_registration(session, ctx, stamp)),

        (
            SessionState::CollectingProfile {
                step: ProfileStep::Submitting,
            },
            BackendReply::CandidateRegistered { candidate_ref },
        ) => {
            let mut next = touched(session, stamp);
            next.candidate_ref = Some(candidate_ref);
            next.state = SessionState::AwaitingResume { uploading: false };
            Ok(TransitionResult::persisted(next).say(messages::ask_resume(ctx.max_resume_bytes)))
        }

        (
            SessionState::CollectingProfile {
                step: ProfileStep::Submitting,
            },
            BackendReply::RegistrationFailed,
        ) => {
            let mut next = touched(session, stamp);
            next.state = SessionState::CollectingProfile {
                step: ProfileStep::City,
            };
            Ok(TransitionResult::persisted(next).say(messages::registration_retry()))
        }

        (SessionState::AwaitingResume { uploading: true }, BackendReply::ResumeStored { storage_key }) => {
            resume_stored(session, storage_key, stamp)
        }

        (SessionState::AwaitingResume { uploading: true }, BackendReply::ResumeRejected { reason }) => {
            let mut next = touched(session, stamp);
            next.state = SessionState::AwaitingResume { uploading: false };
            let text = match reason {
                UploadFailure::StorageUnavailable => messages::STORAGE_UNAVAILABLE,
                UploadFailure::Failed => messages::UPLOAD_FAILED,
            };
            Ok(TransitionResult::persisted(next).say(text))
        }

        (SessionState::AwaitingScreeningDecision, BackendReply::ScreeningStarted { kickoff }) => {
            match kickoff {
                ScreeningKickoff::Decided { passed: true, .. } => {
                    Ok(invite(session, ctx, messages::GOOD_NEWS, stamp))
                }
                ScreeningKickoff::Decided {
                    passed: false,
                    feedback,
                } => Ok(finish(
                    session,
                    SessionState::Rejected,
                    messages::screening_rejected(feedback.as_deref()),
                    stamp,
                )),
                ScreeningKickoff::Pending => Ok(TransitionResult::unchanged(session).with_effect(
                    poll(session, StatusPurpose::Screening, 1, ctx.status_poll_interval)?,
                )),
            }
        }

        (SessionState::AwaitingScreeningDecision, BackendReply::ScreeningStartFailed) => {
            Ok(TransitionResult::unchanged(session).say(messages::SCREENING_KICKOFF_FAILED))
        }

        (
            _,
            BackendReply::Status {
                purpose,
                attempt,
                status,
            },
        ) => on_status(session, ctx, purpose, attempt, status, stamp),

        (_, BackendReply::StatusUnavailable { purpose, .. }) => {
            let result = TransitionResult::unchanged(session);
            if status_applies(session, purpose) {
                Ok(result.say(messages::CONNECTION_PROBLEM))
            } else {
                Ok(result)
            }
        }

        (SessionState::LoadingQuestions, BackendReply::QuestionsLoaded { questions }) => {
            begin_interview(session, ctx, questions, stamp)
        }

        (SessionState::LoadingQuestions, BackendReply::QuestionsUnavailable) => {
            let mut next = touched(session, stamp);
            next.state = SessionState::AwaitingInterviewReadiness;
            Ok(TransitionResult::persisted(next).with_effect(Effect::say_with(
                messages::QUESTIONS_UNAVAILABLE,
                Controls::InterviewReadiness,
            )))
        }

        (SessionState::Completed, BackendReply::InterviewAdvanced) => {
            Ok(TransitionResult::unchanged(session).with_effect(poll(
                session,
                StatusPurpose::Outcome,
                1,
                ctx.status_poll_interval,
            )?))
        }

        (SessionState::Completed, BackendReply::AdvanceFailed) => {
            Ok(TransitionResult::unchanged(session).say(messages::RESULTS_SUBMIT_FAILED))
        }

        (state, reply) => Err(TransitionError::UnexpectedEvent {
            state: state.name(),
            event: reply.kind(),
        }),
    }
}

/// Whether the current state still awaits a status fetched for `purpose`
fn status_applies(session: &Session, purpose: StatusPurpose) -> bool {
    match purpose {
        StatusPurpose::Screening => session.state == SessionState::AwaitingScreeningDecision,
        StatusPurpose::Outcome => session.state == SessionState::Completed,
        StatusPurpose::Resume => matches!(
            session.state,
            SessionState::AwaitingScreeningDecision
                | SessionState::AwaitingInterviewReadiness
                | SessionState::Completed
        ),
        StatusPurpose::Returning => {
            session.state == SessionState::Idle
                && session.vacancy_ref.is_some()
                && session.candidate_ref.is_some()
        }
    }
}

fn on_status(
    session: &Session,
    ctx: &InterviewContext,
    purpose: StatusPurpose,
    attempt: u32,
    status: CandidateStatus,
    stamp: Stamp,
) -> Transition {
    if !status_applies(session, purpose) {
        return Ok(TransitionResult::unchanged(session));
    }

    match (purpose, status) {
        (_, CandidateStatus::InterviewOk) => Ok(finish(
            session,
            SessionState::Passed,
            messages::PASSED,
            stamp,
        )),

        (_, CandidateStatus::InterviewFailed) => Ok(finish(
            session,
            SessionState::Rejected,
            messages::INTERVIEW_REJECTED,
            stamp,
        )),

        (_, CandidateStatus::ScreeningFailed) => {
            let text = if session.state == SessionState::Completed {
                messages::INTERVIEW_REJECTED.to_string()
            } else {
                messages::screening_rejected(None)
            };
            Ok(finish(session, SessionState::Rejected, text, stamp))
        }

        (StatusPurpose::Screening, CandidateStatus::ScreeningOk) => {
            Ok(invite(session, ctx, messages::GOOD_NEWS, stamp))
        }

        (StatusPurpose::Screening | StatusPurpose::Outcome, CandidateStatus::Unknown)
        | (StatusPurpose::Outcome, CandidateStatus::ScreeningOk) => {
            poll_again(session, ctx, purpose, attempt)
        }

        (StatusPurpose::Resume, CandidateStatus::ScreeningOk)
            if session.state == SessionState::Completed =>
        {
            readvance(session)
        }

        (StatusPurpose::Resume | StatusPurpose::Returning, CandidateStatus::ScreeningOk) => {
            Ok(invite(session, ctx, messages::WELCOME_BACK, stamp))
        }

        (StatusPurpose::Resume, CandidateStatus::Unknown) => match session.state {
            SessionState::AwaitingScreeningDecision => {
                let candidate_ref = required(session.candidate_ref.as_deref(), "candidate_ref")?;
                let vacancy_ref = required(session.vacancy_ref.as_deref(), "vacancy_ref")?;
                Ok(TransitionResult::unchanged(session)
                    .say(messages::SCREENING_RESTARTED)
                    .with_effect(Effect::StartScreening {
                        candidate_ref,
                        vacancy_ref,
                    }))
            }
            SessionState::Completed => readvance(session),
            _ => Ok(TransitionResult::unchanged(session).say(messages::NO_ACTIVE_PROCESS)),
        },

        (StatusPurpose::Returning, CandidateStatus::Unknown) => Ok(await_resume(session, ctx, stamp)),
    }
}

fn poll_again(
    session: &Session,
    ctx: &InterviewContext,
    purpose: StatusPurpose,
    attempt: u32,
) -> Transition {
    let result = TransitionResult::unchanged(session);
    if attempt < ctx.status_poll_max_attempts {
        Ok(result.with_effect(poll(session, purpose, attempt + 1, ctx.status_poll_interval)?))
    } else {
        Ok(result.say(messages::DECISION_PENDING))
    }
}

/// Re-issue `advance_interview` for a completed interview
fn readvance(session: &Session) -> Transition {
    let candidate_ref = required(session.candidate_ref.as_deref(), "candidate_ref")?;
    let vacancy_ref = required(session.vacancy_ref.as_deref(), "vacancy_ref")?;
    Ok(TransitionResult::unchanged(session)
        .say(messages::RESULTS_PENDING)
        .with_effect(Effect::AdvanceInterview {
            candidate_ref,
            vacancy_ref,
        }))
}

fn invite(
    session: &Session,
    ctx: &InterviewContext,
    lead: &str,
    stamp: Stamp,
) -> TransitionResult {
    let mut next = touched(session, stamp);
    next.state = SessionState::AwaitingInterviewReadiness;
    let count = match &ctx.question_source {
        QuestionSource::Static(questions) => Some(questions.len()),
        QuestionSource::Live => None,
    };
    TransitionResult::persisted(next)
        .say(lead)
        .with_effect(Effect::say_with(
            messages::invitation(count),
            Controls::InterviewReadiness,
        ))
}

/// Move into a terminal outcome
fn finish(
    session: &Session,
    outcome: SessionState,
    text: impl Into<String>,
    stamp: Stamp,
) -> TransitionResult {
    let mut next = touched(session, stamp);
    next.state = outcome;
    next.active_slot = None;
    next.slot_opened_at = None;
    let deadline = next.deadline_token.take();
    TransitionResult::persisted(next)
        .with_effects(deadline.map(|token| Effect::CancelTimer { token }))
        .say(text)
}

// ============================================================================
// Helpers
// ============================================================================

fn touched(session: &Session, stamp: Stamp) -> Session {
    let mut next = session.clone();
    next.updated_at = stamp.at;
    next
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, TransitionError> {
    value
        .map(str::to_string)
        .ok_or(TransitionError::MissingField(field))
}

fn poll(
    session: &Session,
    purpose: StatusPurpose,
    attempt: u32,
    delay: Duration,
) -> Result<Effect, TransitionError> {
    Ok(Effect::PollStatus {
        purpose,
        attempt,
        delay,
        candidate_ref: required(session.candidate_ref.as_deref(), "candidate_ref")?,
        vacancy_ref: required(session.vacancy_ref.as_deref(), "vacancy_ref")?,
    })
}

fn candidate_profile(session: &Session) -> Result<CandidateProfile, TransitionError> {
    Ok(CandidateProfile {
        participant_id: session.participant_id.clone(),
        full_name: session.profile_value(ProfileField::Name).map(str::to_string),
        phone: required(session.profile_value(ProfileField::Phone), "phone")?,
        handle: session
            .profile_value(ProfileField::Handle)
            .map(str::to_string),
        city: required(session.profile_value(ProfileField::City), "city")?,
    })
}

fn profile_prompt(step: ProfileStep) -> &'static str {
    match step {
        ProfileStep::Name => messages::ASK_NAME,
        ProfileStep::Phone => messages::ASK_PHONE,
        ProfileStep::Handle => messages::ASK_HANDLE,
        ProfileStep::City => messages::ASK_CITY,
        ProfileStep::Submitting => messages::SAVING_PROFILE,
    }
}

fn normalize_handle(raw: &str) -> String {
    let handle = raw.trim();
    if handle.starts_with('@') {
        handle.to_string()
    } else {
        format!("@{handle}")
    }
}
