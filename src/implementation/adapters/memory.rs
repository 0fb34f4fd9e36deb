//! In-memory session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::implementation::{
    domain::{Session, SessionId},
    ports::{SessionRepository, SessionRepositoryError, SessionRepositoryResult},
};
use crate::task::domain::{GuardedUpdate, TaskId};

/// Thread-safe in-memory session repository.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemorySessionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> SessionRepositoryError {
    SessionRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn store(&self, session: &Session) -> SessionRepositoryResult<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if sessions.contains_key(&session.id()) {
            return Err(SessionRepositoryError::DuplicateSession(session.id()));
        }
        sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &Session) -> SessionRepositoryResult<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let stored = sessions
            .get_mut(&session.id())
            .ok_or(SessionRepositoryError::NotFound(session.id()))?;
        let handed_off_at = stored.handed_off_at();
        let launched_at = stored.launched_at();
        stored.clone_from(session);
        if let Some(at) = handed_off_at {
            stored.mark_handed_off(at);
        }
        if let Some(at) = launched_at {
            stored.mark_launched(at);
        }
        Ok(())
    }

    async fn claim_handoff(
        &self,
        id: SessionId,
        expected: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<GuardedUpdate> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let stored = sessions
            .get_mut(&id)
            .ok_or(SessionRepositoryError::NotFound(id))?;
        if stored.handed_off_at() != expected {
            return Ok(GuardedUpdate::Conflict);
        }
        stored.mark_handed_off(at);
        Ok(GuardedUpdate::Applied)
    }

    async fn record_launch(&self, id: SessionId, at: DateTime<Utc>) -> SessionRepositoryResult<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let stored = sessions
            .get_mut(&id)
            .ok_or(SessionRepositoryError::NotFound(id))?;
        stored.mark_launched(at);
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> SessionRepositoryResult<Option<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(&id).cloned())
    }

    async fn list_by_task(&self, task_id: TaskId) -> SessionRepositoryResult<Vec<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        let mut matching: Vec<Session> = sessions
            .values()
            .filter(|session| session.task_id() == Some(task_id))
            .cloned()
            .collect();
        matching.sort_by_key(Session::started_at);
        Ok(matching)
    }

    async fn list_awaiting_pipeline(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> SessionRepositoryResult<Vec<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        let mut matching: Vec<Session> = sessions
            .values()
            .filter(|session| {
                session.is_awaiting_pipeline() || session.is_orphaned_handoff(stale_before)
            })
            .cloned()
            .collect();
        matching.sort_by_key(Session::started_at);
        matching.truncate(limit);
        Ok(matching)
    }
}
