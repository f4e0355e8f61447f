//! Per-participant session runtime
//!
//! One task per participant drains the event queue, so events for the same
//! participant are evaluated strictly one at a time against the latest
//! snapshot. Collaborator calls run as background tasks and report back
//! through the same queue as `BackendReply` events.

use super::timers::TimerRegistry;
use super::traits::{Collaborators, SessionStore, StoreError};
use super::{RuntimeRegistry, SseEvent};

use crate::backend::AnswerSubmission;
use crate::state_machine::{
    messages, transition, BackendReply, CandidateProfile, DocumentMeta, Effect, Event,
    InterviewContext, Outbound, ProfileField, ProfileStep, Session, SessionState, SlotToken,
    Stamp, StatusPurpose, TimerKind, UploadFailure,
};
use crate::storage::StorageError;
use crate::transport::TransportError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Generic session runtime that can work with any store implementation
pub struct SessionRuntime<S>
where
    S: SessionStore + Clone + 'static,
{
    session: Session,
    context: Arc<InterviewContext>,
    store: S,
    collaborators: Collaborators,
    timers: TimerRegistry,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    registry: Option<RuntimeRegistry>,
    /// Background calls whose `BackendReply` has not arrived yet
    pending_replies: usize,
}

impl<S> SessionRuntime<S>
where
    S: SessionStore + Clone + 'static,
{
    pub fn new(
        session: Session,
        context: Arc<InterviewContext>,
        store: S,
        collaborators: Collaborators,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
    ) -> Self {
        Self {
            session,
            context,
            store,
            collaborators,
            timers: TimerRegistry::new(),
            event_rx,
            event_tx,
            broadcast_tx,
            registry: None,
            pending_replies: 0,
        }
    }

    /// Let the runtime remove itself from `registry` once its session settles
    pub(crate) fn with_registry(mut self, registry: RuntimeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn run(mut self) {
        let participant_id = self.session.participant_id.clone();
        tracing::info!(%participant_id, state = self.session.state.name(), "Starting session runtime");

        for effect in self.recovery_effects(Utc::now()) {
            if let Err(e) = self.execute_effect(effect).await {
                tracing::error!(%participant_id, error = %e, "Failed to recover session");
            }
        }

        // The document reference of an interrupted upload is gone
        if self.session.state == (SessionState::AwaitingResume { uploading: true }) {
            let reply = BackendReply::ResumeRejected {
                reason: UploadFailure::Failed,
            };
            if let Err(e) = self.process_event(Event::reply(reply)).await {
                tracing::error!(%participant_id, error = %e, "Failed to reset interrupted upload");
            }
        }

        while let Some(event) = self.event_rx.recv().await {
            if let Err(e) = self.process_event(event).await {
                tracing::warn!(%participant_id, error = %e, "Error handling event");
                let _ = self.broadcast_tx.send(SseEvent::Error { message: e });
            }
            if self.is_settled() {
                self.retire().await;
            }
        }

        tracing::info!(%participant_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), String> {
        if let Some(token) = fired_token(&event) {
            self.timers.fired(token);
        }
        if matches!(event, Event::BackendReply { .. }) {
            self.pending_replies = self.pending_replies.saturating_sub(1);
        }

        let kind = event.kind();
        let result = transition(&self.session, &self.context, event, Stamp::now())
            .map_err(|e| e.to_string())?;
        if result.is_noop() {
            tracing::debug!(participant_id = %self.session.participant_id, event = kind, "Event ignored");
            return Ok(());
        }

        let previous = std::mem::replace(&mut self.session, result.session);
        if previous.state != self.session.state {
            tracing::info!(
                participant_id = %self.session.participant_id,
                from = previous.state.name(),
                to = self.session.state.name(),
                event = kind,
                "State transition"
            );
        }

        // PersistSession always leads, so a failed save means nothing else ran
        for effect in result.effects {
            if effect == Effect::PersistSession {
                if let Err(e) = self.persist().await {
                    self.roll_back(previous, &e).await;
                    return Err(e.to_string());
                }
                continue;
            }
            self.execute_effect(effect).await?;
        }
        Ok(())
    }

    /// Save the snapshot; on success adopt the stored version and announce the state
    async fn persist(&mut self) -> Result<(), StoreError> {
        self.session.version = self.store.save(&self.session).await?;
        let state = serde_json::to_value(&self.session.state).unwrap_or(Value::Null);
        let _ = self.broadcast_tx.send(SseEvent::StateChange { state });
        Ok(())
    }

    /// Return to the last stored snapshot after a failed save
    async fn roll_back(&mut self, previous: Session, error: &StoreError) {
        let participant_id = previous.participant_id.clone();
        tracing::error!(
            %participant_id,
            error = %error,
            attempted = self.session.state.name(),
            "Failed to persist session, keeping last stored snapshot"
        );

        self.session = match error {
            StoreError::VersionConflict { .. } => match self.store.load(&participant_id).await {
                Ok(Some(stored)) => stored,
                _ => previous,
            },
            StoreError::Backend(_) => previous,
        };
        self.deliver(Outbound::text(messages::CONNECTION_PROBLEM)).await;
    }

    async fn deliver(&self, message: Outbound) {
        let participant_id = &self.session.participant_id;
        match self.collaborators.transport.deliver(participant_id, &message).await {
            Ok(message_id) => {
                tracing::debug!(%participant_id, %message_id, "Message delivered");
            }
            Err(e) => tracing::warn!(%participant_id, error = %e, "Message delivery failed"),
        }
        let message = serde_json::to_value(&message).unwrap_or(Value::Null);
        let _ = self.broadcast_tx.send(SseEvent::Message { message });
    }

    /// Terminal, with nothing armed, in flight or watching
    fn is_settled(&self) -> bool {
        self.registry.is_some()
            && self.session.state.is_terminal()
            && self.pending_replies == 0
            && self.timers.is_empty()
            && self.broadcast_tx.receiver_count() == 0
    }

    /// Drop out of the registry; the next event for this participant starts a
    /// fresh runtime from the stored snapshot
    async fn retire(&mut self) {
        let Some(registry) = self.registry.clone() else {
            return;
        };
        let mut runtimes = registry.write().await;
        if !self.event_rx.is_empty() {
            return;
        }

        let participant_id = &self.session.participant_id;
        if runtimes
            .get(participant_id)
            .is_some_and(|handle| handle.event_tx.same_channel(&self.event_tx))
        {
            runtimes.remove(participant_id);
        }
        // Anything already queued is still drained before the loop ends
        self.event_rx.close();
        tracing::info!(
            %participant_id,
            state = self.session.state.name(),
            "Retiring settled session runtime"
        );
    }

    /// Effects that put a freshly loaded session back in motion
    fn recovery_effects(&self, now: DateTime<Utc>) -> Vec<Effect> {
        let session = &self.session;
        let mut effects = Vec::new();

        match &session.state {
            SessionState::Idle => match (&session.vacancy_ref, &session.candidate_ref) {
                (Some(_), None) => effects.push(Effect::LookupCandidate),
                (Some(vacancy_ref), Some(candidate_ref)) => effects.push(Effect::PollStatus {
                    purpose: StatusPurpose::Returning,
                    attempt: 1,
                    delay: Duration::ZERO,
                    candidate_ref: candidate_ref.clone(),
                    vacancy_ref: vacancy_ref.clone(),
                }),
                (None, _) => {}
            },
            SessionState::AnsweringQuestion { .. } => {
                if let (Some(token), Some(question), Some(opened_at)) = (
                    session.slot_token,
                    session.active_question(),
                    session.slot_opened_at,
                ) {
                    let delay = remaining(question.time_limit(), opened_at, now);
                    effects.push(Effect::schedule(token, delay, TimerKind::QuestionExpiry));
                }
            }
            SessionState::BetweenQuestions { .. } => {
                if let Some(token) = session.slot_token {
                    effects.push(Effect::schedule(
                        token,
                        self.context.pacing_delay,
                        TimerKind::Pacing,
                    ));
                }
            }
            SessionState::LoadingQuestions => {
                if let Some(vacancy_ref) = session.vacancy_ref.clone() {
                    effects.push(Effect::LoadQuestions { vacancy_ref });
                }
            }
            SessionState::CollectingProfile {
                step: ProfileStep::Submitting,
            } => {
                if let Some(profile) = submitted_profile(session) {
                    effects.push(Effect::RegisterCandidate { profile });
                }
            }
            _ => {}
        }

        if session.state.is_registering() {
            if let Some(token) = session.deadline_token {
                let delay = remaining(self.context.registration_timeout, session.created_at, now);
                effects.push(Effect::schedule(token, delay, TimerKind::RegistrationDeadline));
            }
        }

        effects
    }

    /// Execute an effect against the store, timers and collaborators
    #[allow(clippy::too_many_lines)] // One arm per effect
    async fn execute_effect(&mut self, effect: Effect) -> Result<(), String> {
        let participant_id = self.session.participant_id.clone();
        match effect {
            Effect::PersistSession => self.persist().await.map_err(|e| e.to_string()),

            Effect::ArchiveSession { previous } => {
                self.store.archive(&previous).await.map_err(|e| e.to_string())?;
                tracing::info!(
                    %participant_id,
                    vacancy_ref = ?previous.vacancy_ref,
                    final_state = previous.state.name(),
                    "Archived previous session"
                );
                Ok(())
            }

            Effect::Deliver { message } => {
                self.deliver(message).await;
                Ok(())
            }

            Effect::ScheduleTimer { timer } => {
                self.timers.schedule(timer, self.event_tx.clone());
                tracing::debug!(%participant_id, armed = self.timers.len(), "Timer armed");
                Ok(())
            }

            Effect::CancelTimer { token } => {
                self.timers.cancel(token);
                Ok(())
            }

            Effect::LookupCandidate => {
                let backend = self.collaborators.backend.clone();
                self.reply_with(async move {
                    match backend.find_candidate(&participant_id).await {
                        Ok(candidate_ref) => BackendReply::CandidateLookup { candidate_ref },
                        Err(e) => {
                            tracing::warn!(%participant_id, error = %e, "Candidate lookup failed");
                            BackendReply::CandidateLookupFailed
                        }
                    }
                });
                Ok(())
            }

            Effect::RegisterCandidate { profile } => {
                let backend = self.collaborators.backend.clone();
                self.reply_with(async move {
                    match backend.register_candidate(&profile).await {
                        Ok(candidate_ref) => {
                            tracing::info!(%participant_id, %candidate_ref, "Candidate registered");
                            BackendReply::CandidateRegistered { candidate_ref }
                        }
                        Err(e) => {
                            tracing::warn!(%participant_id, error = %e, "Candidate registration failed");
                            BackendReply::RegistrationFailed
                        }
                    }
                });
                Ok(())
            }

            Effect::StoreResume {
                document,
                vacancy_ref,
            } => {
                let collaborators = self.collaborators.clone();
                self.reply_with(async move {
                    match store_resume(&collaborators, &document, &participant_id, &vacancy_ref).await {
                        Ok(storage_key) => BackendReply::ResumeStored { storage_key },
                        Err(StorageError::Unavailable) => {
                            tracing::warn!(%participant_id, "Blob storage unavailable");
                            BackendReply::ResumeRejected {
                                reason: UploadFailure::StorageUnavailable,
                            }
                        }
                        Err(e) => {
                            tracing::warn!(%participant_id, error = %e, "Resume upload failed");
                            BackendReply::ResumeRejected {
                                reason: UploadFailure::Failed,
                            }
                        }
                    }
                });
                Ok(())
            }

            Effect::StartScreening {
                candidate_ref,
                vacancy_ref,
            } => {
                let backend = self.collaborators.backend.clone();
                self.reply_with(async move {
                    match backend.start_screening(&candidate_ref, &vacancy_ref).await {
                        Ok(kickoff) => BackendReply::ScreeningStarted { kickoff },
                        Err(e) => {
                            tracing::warn!(%candidate_ref, %vacancy_ref, error = %e, "Screening kick-off failed");
                            BackendReply::ScreeningStartFailed
                        }
                    }
                });
                Ok(())
            }

            Effect::PollStatus {
                purpose,
                attempt,
                delay,
                candidate_ref,
                vacancy_ref,
            } => {
                let backend = self.collaborators.backend.clone();
                self.reply_with(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match backend.get_status(&candidate_ref, &vacancy_ref).await {
                        Ok(status) => {
                            tracing::debug!(
                                %candidate_ref,
                                purpose = purpose.as_str(),
                                attempt,
                                status = status.as_str(),
                                "Status fetched"
                            );
                            BackendReply::Status {
                                purpose,
                                attempt,
                                status,
                            }
                        }
                        Err(e) => {
                            tracing::warn!(%candidate_ref, purpose = purpose.as_str(), attempt, error = %e, "Status fetch failed");
                            BackendReply::StatusUnavailable { purpose, attempt }
                        }
                    }
                });
                Ok(())
            }

            Effect::LoadQuestions { vacancy_ref } => {
                let backend = self.collaborators.backend.clone();
                self.reply_with(async move {
                    match backend.list_questions(&vacancy_ref).await {
                        Ok(questions) => BackendReply::QuestionsLoaded { questions },
                        Err(e) => {
                            tracing::warn!(%vacancy_ref, error = %e, "Loading questions failed");
                            BackendReply::QuestionsUnavailable
                        }
                    }
                });
                Ok(())
            }

            Effect::SubmitAnswer {
                candidate_ref,
                question_id,
                content,
                elapsed_secs,
            } => {
                let backend = self.collaborators.backend.clone();
                let submission = AnswerSubmission {
                    candidate_ref,
                    question_id,
                    content,
                    elapsed_secs,
                };
                tokio::spawn(async move {
                    if let Err(e) = backend.submit_answer(&submission).await {
                        tracing::warn!(
                            candidate_ref = %submission.candidate_ref,
                            question_id = %submission.question_id,
                            error = %e,
                            "Answer submission failed"
                        );
                    }
                });
                Ok(())
            }

            Effect::AdvanceInterview {
                candidate_ref,
                vacancy_ref,
            } => {
                let backend = self.collaborators.backend.clone();
                self.reply_with(async move {
                    match backend.advance_interview(&candidate_ref, &vacancy_ref).await {
                        Ok(()) => BackendReply::InterviewAdvanced,
                        Err(e) => {
                            tracing::warn!(%candidate_ref, %vacancy_ref, error = %e, "Advancing interview failed");
                            BackendReply::AdvanceFailed
                        }
                    }
                });
                Ok(())
            }

            Effect::AnswerQuickQuestion {
                topic,
                candidate_ref,
                vacancy_ref,
            } => {
                let collaborators = self.collaborators.clone();
                let broadcast_tx = self.broadcast_tx.clone();
                tokio::spawn(async move {
                    let Some(text) = collaborators
                        .responder
                        .respond(
                            collaborators.backend.as_ref(),
                            topic,
                            candidate_ref.as_deref(),
                            vacancy_ref.as_deref(),
                        )
                        .await
                    else {
                        return;
                    };
                    let message = Outbound::text(text);
                    if let Err(e) = collaborators.transport.deliver(&participant_id, &message).await {
                        tracing::warn!(%participant_id, error = %e, "Quick answer delivery failed");
                    }
                    let message = serde_json::to_value(&message).unwrap_or(Value::Null);
                    let _ = broadcast_tx.send(SseEvent::Message { message });
                });
                Ok(())
            }
        }
    }

    /// Run a collaborator call in the background and queue its reply
    fn reply_with<F>(&mut self, call: F)
    where
        F: std::future::Future<Output = BackendReply> + Send + 'static,
    {
        self.pending_replies += 1;
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let reply = call.await;
            let _ = event_tx.send(Event::reply(reply)).await;
        });
    }
}

/// Fetch the document into a scoped temporary file and hand its bytes to storage
async fn store_resume(
    collaborators: &Collaborators,
    document: &DocumentMeta,
    participant_id: &str,
    vacancy_ref: &str,
) -> Result<String, StorageError> {
    if !collaborators.storage.is_available() {
        return Err(StorageError::Unavailable);
    }

    // Removed on drop, whatever the outcome
    let scratch = tempfile::NamedTempFile::new()?;
    collaborators
        .transport
        .fetch_document(&document.file_ref, scratch.path())
        .await
        .map_err(|e| match e {
            TransportError::Io(io) => StorageError::Io(io),
            other => StorageError::Upload(other.to_string()),
        })?;
    let bytes = tokio::fs::read(scratch.path()).await?;

    tracing::info!(
        participant_id,
        file_name = %document.file_name,
        size = bytes.len(),
        "Handing resume to blob storage"
    );
    collaborators
        .storage
        .store(bytes, participant_id, vacancy_ref)
        .await
}

fn fired_token(event: &Event) -> Option<SlotToken> {
    match event {
        Event::QuestionTimerFired { token }
        | Event::PacingElapsed { token }
        | Event::RegistrationExpired { token } => Some(*token),
        _ => None,
    }
}

/// Time left of `total` counted from `since`; zero once elapsed
fn remaining(total: Duration, since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let elapsed = (now - since).to_std().unwrap_or_default();
    total.saturating_sub(elapsed)
}

fn submitted_profile(session: &Session) -> Option<CandidateProfile> {
    Some(CandidateProfile {
        participant_id: session.participant_id.clone(),
        full_name: session.profile_value(ProfileField::Name).map(str::to_string),
        phone: session.profile_value(ProfileField::Phone)?.to_string(),
        handle: session.profile_value(ProfileField::Handle).map(str::to_string),
        city: session.profile_value(ProfileField::City)?.to_string(),
    })
}

/// Timer specs a freshly loaded session would re-arm; used by tests
#[cfg(test)]
pub(crate) fn recovery_timers(effects: &[Effect]) -> Vec<crate::state_machine::TimerSpec> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::ScheduleTimer { timer } => Some(*timer),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
impl<S> SessionRuntime<S>
where
    S: SessionStore + Clone + 'static,
{
    pub(crate) fn recovery_plan(&self, now: DateTime<Utc>) -> Vec<Effect> {
        self.recovery_effects(now)
    }
}
