//! Trait abstractions for runtime I/O
//!
//! The executor only talks to these seams, so tests swap in the in-memory
//! implementations from `testing`.

use crate::backend::BackendGateway;
use crate::db::{ArchivedSession, Database, DbError};
use crate::faq::QuickResponder;
use crate::state_machine::Session;
use crate::storage::BlobStorage;
use crate::transport::MessageTransport;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer saved a newer snapshot first
    #[error("Session {participant_id} was modified concurrently")]
    VersionConflict { participant_id: String },
    #[error("Session store failure: {0}")]
    Backend(String),
}

/// Durable session snapshots
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, participant_id: &str) -> Result<Option<Session>, StoreError>;

    /// Compare-and-swap on `session.version`; returns the stored version
    async fn save(&self, session: &Session) -> Result<u64, StoreError>;

    async fn archive(&self, session: &Session) -> Result<(), StoreError>;

    /// Superseded sessions of a participant, newest first
    async fn list_archived(&self, participant_id: &str) -> Result<Vec<ArchivedSession>, StoreError>;

    /// Sessions a restart must revisit
    async fn list_resumable(&self) -> Result<Vec<Session>, StoreError>;
}

/// Everything outside the process a session runtime talks to
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn BackendGateway>,
    pub storage: Arc<dyn BlobStorage>,
    pub transport: Arc<dyn MessageTransport>,
    pub responder: Arc<QuickResponder>,
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load(&self, participant_id: &str) -> Result<Option<Session>, StoreError> {
        (**self).load(participant_id).await
    }

    async fn save(&self, session: &Session) -> Result<u64, StoreError> {
        (**self).save(session).await
    }

    async fn archive(&self, session: &Session) -> Result<(), StoreError> {
        (**self).archive(session).await
    }

    async fn list_archived(&self, participant_id: &str) -> Result<Vec<ArchivedSession>, StoreError> {
        (**self).list_archived(participant_id).await
    }

    async fn list_resumable(&self) -> Result<Vec<Session>, StoreError> {
        (**self).list_resumable().await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `SessionStore`
#[derive(Clone)]
pub struct DatabaseSessionStore {
    db: Database,
}

impl DatabaseSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::VersionConflict { participant_id, .. } => {
                StoreError::VersionConflict { participant_id }
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
impl SessionStore for DatabaseSessionStore {
    async fn load(&self, participant_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.db.load_session(participant_id)?)
    }

    async fn save(&self, session: &Session) -> Result<u64, StoreError> {
        Ok(self.db.save_session(session)?)
    }

    async fn archive(&self, session: &Session) -> Result<(), StoreError> {
        Ok(self.db.archive_session(session)?)
    }

    async fn list_archived(&self, participant_id: &str) -> Result<Vec<ArchivedSession>, StoreError> {
        Ok(self.db.list_archived(participant_id)?)
    }

    async fn list_resumable(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.db.list_resumable()?)
    }
}
