//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{SessionRuntime, SseEvent};
use crate::backend::{AnswerSubmission, BackendGateway, GatewayError};
use crate::db::ArchivedSession;
use crate::faq::QuickResponder;
use crate::state_machine::context::DEFAULT_PHONE_PATTERN;
use crate::state_machine::{
    CandidateProfile, CandidateStatus, Event, InterviewContext, Outbound, Question,
    QuestionSource, ScreeningKickoff, Session, SessionState,
};
use crate::storage::{storage_key, BlobStorage, StorageError};
use crate::transport::{MessageTransport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// In-Memory Session Store
// ============================================================================

/// Session store with the same compare-and-swap rules as the database
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    archived: Mutex<Vec<ArchivedSession>>,
    failing_saves: AtomicUsize,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session, bypassing the version check; returns the stored copy
    pub fn insert(&self, mut session: Session) -> Session {
        session.version += 1;
        self.sessions
            .lock()
            .unwrap()
            .insert(session.participant_id.clone(), session.clone());
        session
    }

    /// Make the next `count` saves fail with a backend error
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn get(&self, participant_id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(participant_id).cloned()
    }

    pub fn archived(&self) -> Vec<Session> {
        self.archived
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.session.clone())
            .collect()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, participant_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.get(participant_id))
    }

    async fn save(&self, session: &Session) -> Result<u64, StoreError> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Backend("database is locked".into()));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let found = sessions.get(&session.participant_id).map(|s| s.version);
        if found.unwrap_or(0) != session.version {
            return Err(StoreError::VersionConflict {
                participant_id: session.participant_id.clone(),
            });
        }
        let mut stored = session.clone();
        stored.version += 1;
        let version = stored.version;
        sessions.insert(stored.participant_id.clone(), stored);
        Ok(version)
    }

    async fn archive(&self, session: &Session) -> Result<(), StoreError> {
        self.archived
            .lock()
            .unwrap()
            .push(ArchivedSession::new(session.clone(), chrono::Utc::now()));
        Ok(())
    }

    async fn list_archived(&self, participant_id: &str) -> Result<Vec<ArchivedSession>, StoreError> {
        Ok(self
            .archived
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|a| a.participant_id == participant_id)
            .cloned()
            .collect())
    }

    async fn list_resumable(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| crate::db::RESUMABLE_STATES.contains(&s.state.name()))
            .filter(|s| s.state != SessionState::Idle || s.vacancy_ref.is_some())
            .cloned()
            .collect())
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

/// Backend returning queued results, falling back to a happy-path default
#[derive(Default)]
pub struct MockBackend {
    candidates: Mutex<VecDeque<Result<Option<String>, GatewayError>>>,
    registrations: Mutex<VecDeque<Result<String, GatewayError>>>,
    kickoffs: Mutex<VecDeque<Result<ScreeningKickoff, GatewayError>>>,
    statuses: Mutex<VecDeque<Result<CandidateStatus, GatewayError>>>,
    questions: Mutex<VecDeque<Result<Vec<Question>, GatewayError>>>,
    fail_submissions: Mutex<bool>,
    /// Record of calls made
    pub registered: Mutex<Vec<CandidateProfile>>,
    pub status_requests: Mutex<Vec<(String, String)>>,
    pub submissions: Mutex<Vec<AnswerSubmission>>,
    pub advanced: Mutex<Vec<(String, String)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_candidate(&self, result: Result<Option<String>, GatewayError>) {
        self.candidates.lock().unwrap().push_back(result);
    }

    pub fn queue_registration(&self, result: Result<String, GatewayError>) {
        self.registrations.lock().unwrap().push_back(result);
    }

    pub fn queue_kickoff(&self, result: Result<ScreeningKickoff, GatewayError>) {
        self.kickoffs.lock().unwrap().push_back(result);
    }

    pub fn queue_status(&self, result: Result<CandidateStatus, GatewayError>) {
        self.statuses.lock().unwrap().push_back(result);
    }

    pub fn queue_questions(&self, result: Result<Vec<Question>, GatewayError>) {
        self.questions.lock().unwrap().push_back(result);
    }

    pub fn fail_submissions(&self) {
        *self.fail_submissions.lock().unwrap() = true;
    }

    pub fn status_calls(&self) -> Vec<(String, String)> {
        self.status_requests.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<AnswerSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn advance_calls(&self) -> Vec<(String, String)> {
        self.advanced.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendGateway for MockBackend {
    async fn find_candidate(&self, _participant_id: &str) -> Result<Option<String>, GatewayError> {
        self.candidates.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn register_candidate(&self, profile: &CandidateProfile) -> Result<String, GatewayError> {
        self.registered.lock().unwrap().push(profile.clone());
        self.registrations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("cand-1".to_string()))
    }

    async fn start_screening(
        &self,
        _candidate_ref: &str,
        _vacancy_ref: &str,
    ) -> Result<ScreeningKickoff, GatewayError> {
        self.kickoffs.lock().unwrap().pop_front().unwrap_or(Ok(ScreeningKickoff::Decided {
            passed: true,
            feedback: None,
        }))
    }

    async fn get_status(
        &self,
        candidate_ref: &str,
        vacancy_ref: &str,
    ) -> Result<CandidateStatus, GatewayError> {
        self.status_requests
            .lock()
            .unwrap()
            .push((candidate_ref.to_string(), vacancy_ref.to_string()));
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(CandidateStatus::Unknown))
    }

    async fn list_questions(&self, _vacancy_ref: &str) -> Result<Vec<Question>, GatewayError> {
        self.questions.lock().unwrap().pop_front().unwrap_or(Ok(vec![]))
    }

    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<(), GatewayError> {
        self.submissions.lock().unwrap().push(submission.clone());
        if *self.fail_submissions.lock().unwrap() {
            return Err(GatewayError::Unavailable("submission rejected".into()));
        }
        Ok(())
    }

    async fn advance_interview(
        &self,
        candidate_ref: &str,
        vacancy_ref: &str,
    ) -> Result<(), GatewayError> {
        self.advanced
            .lock()
            .unwrap()
            .push((candidate_ref.to_string(), vacancy_ref.to_string()));
        Ok(())
    }
}

// ============================================================================
// Mock Blob Storage
// ============================================================================

pub struct MockStorage {
    available: bool,
    rejects_uploads: bool,
    pub stored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            available: true,
            rejects_uploads: false,
            stored: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Configured, but every upload fails
    pub fn rejecting() -> Self {
        Self {
            rejects_uploads: true,
            ..Self::new()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.stored.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }
}

#[async_trait]
impl BlobStorage for MockStorage {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        participant_id: &str,
        vacancy_ref: &str,
    ) -> Result<String, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        if self.rejects_uploads {
            return Err(StorageError::Upload("bucket refused the object".into()));
        }
        let key = storage_key(participant_id, vacancy_ref);
        self.stored.lock().unwrap().push((key.clone(), bytes));
        Ok(key)
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

#[derive(Default)]
pub struct MockTransport {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    pub delivered: Mutex<Vec<(String, Outbound)>>,
    /// Scratch paths documents were downloaded to
    pub fetched_to: Mutex<Vec<PathBuf>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, file_ref: impl Into<String>, bytes: &[u8]) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(file_ref.into(), bytes.to_vec());
        self
    }

    pub fn texts(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    pub fn saw(&self, text: &str) -> bool {
        self.texts().iter().any(|t| t.contains(text))
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn deliver(&self, participant_id: &str, message: &Outbound) -> Result<String, TransportError> {
        let mut delivered = self.delivered.lock().unwrap();
        delivered.push((participant_id.to_string(), message.clone()));
        Ok(format!("msg-{}", delivered.len()))
    }

    async fn fetch_document(&self, file_ref: &str, dest: &Path) -> Result<u64, TransportError> {
        let bytes = self
            .documents
            .lock()
            .unwrap()
            .get(file_ref)
            .cloned()
            .ok_or_else(|| TransportError::Fetch(format!("unknown file {file_ref}")))?;
        self.fetched_to.lock().unwrap().push(dest.to_path_buf());
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

pub const TEST_PARTICIPANT: &str = "42";

pub fn test_questions() -> Vec<Question> {
    vec![
        Question::new("q1", "Tell us about yourself", 60),
        Question::new("q2", "Why do you want this job?", 60),
    ]
}

/// Fast polling, no pacing, two static questions
pub fn test_context() -> InterviewContext {
    InterviewContext::new(DEFAULT_PHONE_PATTERN)
        .unwrap()
        .with_pacing_delay(Duration::ZERO)
        .with_status_polling(Duration::from_millis(10), 3)
        .with_question_source(QuestionSource::Static(test_questions()))
}

/// Helper for building test runtimes with minimal boilerplate
pub struct TestRuntime {
    pub store: Arc<InMemorySessionStore>,
    pub backend: Arc<MockBackend>,
    pub storage: Arc<MockStorage>,
    pub transport: Arc<MockTransport>,
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_rx: broadcast::Receiver<SseEvent>,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

pub struct TestRuntimeBuilder {
    context: InterviewContext,
    session: Option<Session>,
    backend: MockBackend,
    storage: MockStorage,
    transport: MockTransport,
}

impl TestRuntime {
    pub fn builder() -> TestRuntimeBuilder {
        TestRuntimeBuilder {
            context: test_context(),
            session: None,
            backend: MockBackend::new(),
            storage: MockStorage::new(),
            transport: MockTransport::new().with_document("f-1", b"%PDF-1.4 resume"),
        }
    }

    pub async fn send(&self, event: Event) {
        self.event_tx.send(event).await.expect("Failed to send event");
    }

    /// Wait for a persisted state of the given type
    pub async fn wait_for_state(&mut self, expected_type: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.broadcast_rx.recv()).await {
                Ok(Ok(SseEvent::StateChange { state })) => {
                    if state.get("type").and_then(|v| v.as_str()) == Some(expected_type) {
                        return true;
                    }
                }
                _ => continue,
            }
        }
        false
    }

    /// Poll `check` until it holds or the timeout elapses
    pub async fn eventually(&self, timeout: Duration, check: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check(self)
    }

    pub fn session(&self) -> Session {
        self.store.get(TEST_PARTICIPANT).expect("session was persisted")
    }
}

impl TestRuntimeBuilder {
    pub fn context(mut self, context: InterviewContext) -> Self {
        self.context = context;
        self
    }

    /// Start from a stored session instead of a fresh one
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn backend(mut self, backend: MockBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn storage(mut self, storage: MockStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn build(self) -> TestRuntime {
        let store = Arc::new(InMemorySessionStore::new());
        let session = match self.session {
            Some(seed) => store.insert(seed),
            None => Session::new(TEST_PARTICIPANT, chrono::Utc::now()),
        };

        let backend = Arc::new(self.backend);
        let storage = Arc::new(self.storage);
        let transport = Arc::new(self.transport);
        let collaborators = Collaborators {
            backend: backend.clone(),
            storage: storage.clone(),
            transport: transport.clone(),
            responder: Arc::new(QuickResponder::default()),
        };

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(128);

        let runtime = SessionRuntime::new(
            session,
            Arc::new(self.context),
            store.clone(),
            collaborators,
            event_rx,
            event_tx.clone(),
            broadcast_tx,
        );
        let handle = tokio::spawn(async move {
            runtime.run().await;
        });

        TestRuntime {
            store,
            backend,
            storage,
            transport,
            event_tx,
            broadcast_rx,
            _runtime_handle: handle,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faq::QuickTopic;
    use crate::state_machine::{
        messages, Action, Answer, Command, DocumentMeta, ProfileField, ProfileStep,
        SessionState, SlotToken,
    };
    use chrono::Utc;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(3);

    fn start() -> Event {
        Event::command(Command::Start {
            vacancy_ref: Some("V1".into()),
            handle: None,
        })
    }

    fn resume_document() -> Event {
        Event::UserDocument {
            document: DocumentMeta {
                file_name: "cv.pdf".into(),
                size_bytes: 1024,
                file_ref: "f-1".into(),
            },
        }
    }

    /// A registered candidate waiting for their resume
    fn awaiting_resume() -> Session {
        let mut session = Session::new(TEST_PARTICIPANT, Utc::now());
        session.vacancy_ref = Some("V1".into());
        session.candidate_ref = Some("cand-1".into());
        session.profile.insert(ProfileField::Phone, "+79991234567".into());
        session.profile.insert(ProfileField::City, "Kazan".into());
        session.state = SessionState::AwaitingResume { uploading: false };
        session
    }

    #[tokio::test]
    async fn test_in_memory_store_compare_and_swap() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new("7", Utc::now());
        session.version = store.save(&session).await.unwrap();
        assert_eq!(session.version, 1);

        let stale = Session::new("7", Utc::now());
        assert!(matches!(
            store.save(&stale).await,
            Err(StoreError::VersionConflict { .. })
        ));
        assert_eq!(store.save(&session).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_full_happy_path() {
        let mut rt = TestRuntime::builder().build();
        rt.backend.queue_status(Ok(CandidateStatus::InterviewOk));

        rt.send(start()).await;
        assert!(rt.wait_for_state("collecting_profile", WAIT).await);

        for text in ["Alice Smith", "+7 999 123-45-67", "alice", "Kazan"] {
            rt.send(Event::text(text)).await;
        }
        assert!(rt.wait_for_state("awaiting_resume", WAIT).await);
        let registered = rt.backend.registered.lock().unwrap().clone();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].handle.as_deref(), Some("@alice"));

        rt.send(resume_document()).await;
        assert!(rt.wait_for_state("awaiting_interview_readiness", WAIT).await);
        assert_eq!(rt.storage.keys(), vec!["42/V1".to_string()]);

        rt.send(Event::button(Action::StartInterview)).await;
        rt.send(Event::text("I am a developer")).await;
        rt.send(Event::text("I like the product")).await;
        assert!(rt.wait_for_state("passed", WAIT).await);

        let session = rt.session();
        assert_eq!(session.answers.len(), 2);
        assert!(session.deadline_token.is_none());
        assert!(rt.eventually(WAIT, |rt| rt.backend.submitted().len() == 2).await);
        assert_eq!(rt.backend.advance_calls(), vec![("cand-1".into(), "V1".into())]);
        assert!(rt.transport.saw("Question 1 of 2"));
        assert!(rt.transport.saw(messages::PASSED));
    }

    #[tokio::test]
    async fn test_registration_failure_returns_to_city() {
        let mut rt = TestRuntime::builder().build();
        rt.backend
            .queue_registration(Err(GatewayError::Unavailable("down".into())));

        rt.send(start()).await;
        assert!(rt.wait_for_state("collecting_profile", WAIT).await);
        for text in ["Alice Smith", "+79991234567", "alice", "Kazan"] {
            rt.send(Event::text(text)).await;
        }
        assert!(
            rt.eventually(WAIT, |rt| rt.transport.saw(messages::CONNECTION_PROBLEM))
                .await
        );
        assert_eq!(
            rt.session().state,
            SessionState::CollectingProfile {
                step: ProfileStep::City
            }
        );

        // Second attempt uses the default registration result
        rt.send(Event::text("Kazan")).await;
        assert!(
            rt.eventually(WAIT, |rt| rt.session().state
                == SessionState::AwaitingResume { uploading: false })
                .await
        );
        assert_eq!(rt.session().candidate_ref.as_deref(), Some("cand-1"));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_stored_state_and_allows_retry() {
        let mut session = awaiting_resume();
        session.state = SessionState::AwaitingInterviewReadiness;
        let mut rt = TestRuntime::builder().session(session).build();
        rt.store.fail_next_saves(1);

        rt.send(Event::button(Action::StartInterview)).await;
        assert!(
            rt.eventually(WAIT, |rt| rt.transport.saw(messages::CONNECTION_PROBLEM))
                .await
        );
        assert_eq!(rt.session().state, SessionState::AwaitingInterviewReadiness);
        assert!(!rt.transport.saw("Question 1 of 2"));

        // The runtime kept the stored snapshot, so the retry saves cleanly
        rt.send(Event::button(Action::StartInterview)).await;
        assert!(rt.wait_for_state("answering_question", WAIT).await);
        assert!(rt.transport.saw("Question 1 of 2"));
        assert_eq!(rt.session().active_slot, Some(0));
    }

    #[tokio::test]
    async fn test_live_questions_come_from_backend() {
        let context = test_context().with_question_source(QuestionSource::Live);
        let mut session = awaiting_resume();
        session.state = SessionState::AwaitingInterviewReadiness;
        let backend = MockBackend::new();
        backend.queue_questions(Ok(vec![Question::new("L1", "Live question", 60)]));
        backend.queue_status(Ok(CandidateStatus::InterviewFailed));
        let mut rt = TestRuntime::builder()
            .context(context)
            .session(session)
            .backend(backend)
            .build();

        rt.send(Event::button(Action::StartInterview)).await;
        assert!(rt.wait_for_state("answering_question", WAIT).await);
        rt.send(Event::text("My answer")).await;
        assert!(rt.wait_for_state("rejected", WAIT).await);

        let session = rt.session();
        assert_eq!(session.questions.len(), 1);
        assert_eq!(session.questions[0].id, "L1");
        assert!(rt.transport.saw("Live question"));
    }

    #[tokio::test]
    async fn test_registration_deadline_abandons_session() {
        let context = test_context().with_registration_timeout(Duration::from_millis(50));
        let mut rt = TestRuntime::builder().context(context).build();

        rt.send(start()).await;
        assert!(rt.wait_for_state("abandoned", WAIT).await);
        assert!(rt.transport.saw(messages::ABANDONED));

        // Terminal: later text only repeats the closure
        rt.send(Event::text("Alice")).await;
        assert!(rt.eventually(WAIT, |rt| rt.transport.texts().len() >= 3).await);
        assert_eq!(rt.session().state, SessionState::Abandoned);
    }

    #[tokio::test]
    async fn test_unavailable_storage_keeps_waiting_for_resume() {
        let mut rt = TestRuntime::builder()
            .session(awaiting_resume())
            .storage(MockStorage::unavailable())
            .build();

        rt.send(resume_document()).await;
        assert!(rt.wait_for_state("awaiting_resume", WAIT).await);
        assert!(rt.eventually(WAIT, |rt| rt.transport.saw(messages::STORAGE_UNAVAILABLE)).await);
        assert!(rt
            .eventually(WAIT, |rt| rt.session().state
                == SessionState::AwaitingResume { uploading: false })
            .await);
        assert!(rt.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn test_pending_screening_polls_until_decided() {
        let backend = MockBackend::new();
        backend.queue_kickoff(Ok(ScreeningKickoff::Pending));
        backend.queue_status(Ok(CandidateStatus::Unknown));
        backend.queue_status(Ok(CandidateStatus::ScreeningFailed));
        let mut rt = TestRuntime::builder()
            .session(awaiting_resume())
            .backend(backend)
            .build();

        rt.send(resume_document()).await;
        assert!(rt.wait_for_state("rejected", WAIT).await);
        assert_eq!(rt.backend.status_calls().len(), 2);
        assert!(rt.transport.saw(messages::SCREENING_REJECTED));
    }

    #[tokio::test]
    async fn test_restart_rearms_expired_question() {
        let opened = Utc::now() - chrono::Duration::seconds(120);
        let mut session = Session::new(TEST_PARTICIPANT, opened);
        session.vacancy_ref = Some("V1".into());
        session.candidate_ref = Some("cand-1".into());
        session.questions = vec![Question::new("q1", "Only question", 60)];
        session.state = SessionState::AnsweringQuestion { slot: 0 };
        session.active_slot = Some(0);
        session.slot_token = Some(SlotToken::from_uuid(Uuid::from_u128(9)));
        session.slot_opened_at = Some(opened);

        let mut rt = TestRuntime::builder().session(session).build();
        assert!(rt.wait_for_state("completed", WAIT).await);

        let stored = rt.session();
        assert_eq!(stored.answers, vec![Answer::Skipped { elapsed_secs: 60 }]);
        assert!(rt.transport.saw(messages::TIME_UP));
        assert!(rt.eventually(WAIT, |rt| rt.backend.submitted().len() == 1).await);
        assert_eq!(rt.backend.submitted()[0].content, "skipped");
    }

    #[tokio::test]
    async fn test_submission_failure_never_rolls_back() {
        let backend = MockBackend::new();
        backend.fail_submissions();
        let mut session = Session::new(TEST_PARTICIPANT, Utc::now());
        session.vacancy_ref = Some("V1".into());
        session.candidate_ref = Some("cand-1".into());
        session.state = SessionState::AwaitingInterviewReadiness;
        let mut rt = TestRuntime::builder().session(session).backend(backend).build();

        rt.send(Event::button(Action::StartInterview)).await;
        rt.send(Event::text("first")).await;
        rt.send(Event::text("second")).await;
        assert!(rt.wait_for_state("completed", WAIT).await);
        assert_eq!(rt.session().answered_count(), 2);
    }

    #[tokio::test]
    async fn test_quick_question_leaves_session_alone() {
        let mut session = awaiting_resume();
        session.state = SessionState::AwaitingInterviewReadiness;
        let backend = MockBackend::new();
        backend.queue_status(Ok(CandidateStatus::ScreeningOk));
        let rt = TestRuntime::builder().session(session).backend(backend).build();
        let before = rt.session();

        rt.send(Event::button(Action::Quick(QuickTopic::Status))).await;
        assert!(rt.eventually(WAIT, |rt| rt.transport.saw("Resume approved")).await);
        assert_eq!(rt.session(), before);
    }

    #[tokio::test]
    async fn test_returning_candidate_skips_registration() {
        let backend = MockBackend::new();
        backend.queue_candidate(Ok(Some("cand-9".into())));
        backend.queue_status(Ok(CandidateStatus::Unknown));
        let mut rt = TestRuntime::builder().backend(backend).build();

        rt.send(start()).await;
        assert!(rt.wait_for_state("awaiting_resume", WAIT).await);
        let session = rt.session();
        assert_eq!(session.candidate_ref.as_deref(), Some("cand-9"));
        assert!(session.deadline_token.is_some());
        assert!(rt.backend.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restart_resets_interrupted_upload() {
        let mut session = awaiting_resume();
        session.state = SessionState::AwaitingResume { uploading: true };
        let rt = TestRuntime::builder().session(session).build();

        assert!(rt
            .eventually(WAIT, |rt| rt.session().state
                == SessionState::AwaitingResume { uploading: false })
            .await);
        assert!(rt.transport.saw(messages::UPLOAD_FAILED));
    }

    #[tokio::test]
    async fn test_restart_reissues_registration() {
        let mut session = awaiting_resume();
        session.candidate_ref = None;
        session.state = SessionState::CollectingProfile {
            step: ProfileStep::Submitting,
        };
        let mut rt = TestRuntime::builder().session(session).build();

        assert!(rt.wait_for_state("awaiting_resume", WAIT).await);
        assert_eq!(rt.session().candidate_ref.as_deref(), Some("cand-1"));
    }

    #[tokio::test]
    async fn test_restart_reissues_candidate_lookup() {
        let mut session = Session::new(TEST_PARTICIPANT, Utc::now());
        session.vacancy_ref = Some("V1".into());
        let mut rt = TestRuntime::builder().session(session).build();

        // The lookup finds nobody, so registration begins without any user input
        assert!(rt.wait_for_state("collecting_profile", WAIT).await);
        assert!(rt.session().deadline_token.is_some());
    }
}
