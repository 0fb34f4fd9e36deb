//! Session persistence contract.

use crate::implementation::domain::{Session, SessionId};
use crate::task::domain::{GuardedUpdate, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for session repository operations.
pub type SessionRepositoryResult<T> = Result<T, SessionRepositoryError>;

/// Session persistence contract.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Stores a new session.
    async fn store(&self, session: &Session) -> SessionRepositoryResult<()>;

    /// Persists the outcome fields of a session owned by the caller.
    async fn update(&self, session: &Session) -> SessionRepositoryResult<()>;

    /// Sets `handed_off_at = at` when it still equals `expected`.
    ///
    /// Lets exactly one monitor claim a session for a pipeline launch.
    async fn claim_handoff(
        &self,
        id: SessionId,
        expected: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<GuardedUpdate>;

    /// Stamps `launched_at` once the claimed launch stored its execution.
    async fn record_launch(&self, id: SessionId, at: DateTime<Utc>) -> SessionRepositoryResult<()>;

    /// Finds a session by identifier.
    async fn find_by_id(&self, id: SessionId) -> SessionRepositoryResult<Option<Session>>;

    /// Lists the sessions of a task, oldest first.
    async fn list_by_task(&self, task_id: TaskId) -> SessionRepositoryResult<Vec<Session>>;

    /// Lists completed implementation sessions with a change set that no
    /// monitor has claimed, together with sessions claimed before
    /// `stale_before` whose launch was never recorded, oldest first.
    async fn list_awaiting_pipeline(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> SessionRepositoryResult<Vec<Session>>;
}

/// Errors returned by session repositories.
#[derive(Debug, Clone, Error)]
pub enum SessionRepositoryError {
    /// A session with the same identifier already exists.
    #[error("duplicate session identifier: {0}")]
    DuplicateSession(SessionId),
    /// The session does not exist.
    #[error("session not found: {0}")]
    NotFound(SessionId),
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SessionRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
