//! Runtime for driving participant sessions
//!
//! The manager owns one [`SessionRuntime`] per participant. Handles give the
//! API layer a queue to push events into and a broadcast channel to watch.

mod executor;
mod timers;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::db::ArchivedSession;
use crate::state_machine::{Event, InterviewContext, Session};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Live runtimes by participant; settled runtimes remove themselves
pub(crate) type RuntimeRegistry = Arc<RwLock<HashMap<String, SessionHandle>>>;

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        session: serde_json::Value,
    },
    /// An outbound message as delivered to the participant
    Message {
        message: serde_json::Value,
    },
    StateChange {
        /// Full state as JSON object (e.g., `{"type":"answering_question","slot":2}`)
        state: serde_json::Value,
    },
    Error {
        message: String,
    },
}

/// Manager for all session runtimes
pub struct RuntimeManager<S = DatabaseSessionStore>
where
    S: SessionStore + Clone + 'static,
{
    store: S,
    context: Arc<InterviewContext>,
    collaborators: Collaborators,
    runtimes: RuntimeRegistry,
}

impl<S> RuntimeManager<S>
where
    S: SessionStore + Clone + 'static,
{
    pub fn new(store: S, context: InterviewContext, collaborators: Collaborators) -> Self {
        Self {
            store,
            context: Arc::new(context),
            collaborators,
            runtimes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create the runtime for a participant
    pub async fn get_or_create(&self, participant_id: &str) -> Result<SessionHandle, String> {
        // Check if already running
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(participant_id) {
                return Ok(handle.clone());
            }
        }

        let mut runtimes = self.runtimes.write().await;
        // Another caller may have started it while we waited for the lock
        if let Some(handle) = runtimes.get(participant_id) {
            return Ok(handle.clone());
        }

        let session = self
            .store
            .load(participant_id)
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_else(|| Session::new(participant_id, Utc::now()));

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);

        let runtime = SessionRuntime::new(
            session,
            self.context.clone(),
            self.store.clone(),
            self.collaborators.clone(),
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
        )
        .with_registry(self.runtimes.clone());

        // Start runtime in background
        let id = participant_id.to_string();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(participant_id = %id, "Session runtime finished");
        });

        let handle = SessionHandle {
            event_tx,
            broadcast_tx,
        };
        runtimes.insert(participant_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Send an event to a participant's session
    pub async fn send_event(&self, participant_id: &str, event: Event) -> Result<(), String> {
        let handle = self.get_or_create(participant_id).await?;
        let Err(mpsc::error::SendError(event)) = handle.event_tx.send(event).await else {
            return Ok(());
        };

        // The runtime retired after we picked up its handle
        tracing::debug!(%participant_id, "Runtime retired mid-send, starting a fresh one");
        self.get_or_create(participant_id)
            .await?
            .event_tx
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }

    /// Subscribe to session updates
    pub async fn subscribe(
        &self,
        participant_id: &str,
    ) -> Result<broadcast::Receiver<SseEvent>, String> {
        let handle = self.get_or_create(participant_id).await?;
        Ok(handle.broadcast_tx.subscribe())
    }

    /// Latest persisted snapshot; a participant never seen is `Idle`
    pub async fn snapshot(&self, participant_id: &str) -> Result<Session, String> {
        Ok(self
            .store
            .load(participant_id)
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_else(|| Session::new(participant_id, Utc::now())))
    }

    /// Start runtimes for sessions whose timers or calls a restart interrupted
    pub async fn resume_pending(&self) -> Result<usize, String> {
        let sessions = self
            .store
            .list_resumable()
            .await
            .map_err(|e| e.to_string())?;
        let count = sessions.len();
        for session in sessions {
            tracing::info!(
                participant_id = %session.participant_id,
                state = session.state.name(),
                "Resuming session after restart"
            );
            self.get_or_create(&session.participant_id).await?;
        }
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) async fn is_running(&self, participant_id: &str) -> bool {
        self.runtimes.read().await.contains_key(participant_id)
    }

    /// Sessions a `/start` superseded, newest first
    pub async fn archived(&self, participant_id: &str) -> Result<Vec<ArchivedSession>, String> {
        self.store
            .list_archived(participant_id)
            .await
            .map_err(|e| e.to_string())
    }
}
