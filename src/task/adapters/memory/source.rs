//! In-memory repository for task sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{GuardedUpdate, SyncGuard, SyncStatus, TaskSource, TaskSourceId},
    ports::{TaskSourceRepository, TaskSourceRepositoryError, TaskSourceRepositoryResult},
};

/// Thread-safe in-memory task source repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskSourceRepository {
    sources: Arc<RwLock<HashMap<TaskSourceId, TaskSource>>>,
}

impl InMemoryTaskSourceRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> TaskSourceRepositoryError {
    TaskSourceRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl TaskSourceRepository for InMemoryTaskSourceRepository {
    async fn store(&self, source: &TaskSource) -> TaskSourceRepositoryResult<()> {
        let mut sources = self.sources.write().map_err(poisoned)?;
        if sources.contains_key(&source.id()) {
            return Err(TaskSourceRepositoryError::DuplicateSource(source.id()));
        }
        sources.insert(source.id(), source.clone());
        Ok(())
    }

    async fn update_guarded(
        &self,
        source: &TaskSource,
        guard: &SyncGuard,
    ) -> TaskSourceRepositoryResult<GuardedUpdate> {
        let mut sources = self.sources.write().map_err(poisoned)?;
        let stored = sources
            .get_mut(&source.id())
            .ok_or(TaskSourceRepositoryError::NotFound(source.id()))?;
        if !stored.matches_guard(guard) {
            return Ok(GuardedUpdate::Conflict);
        }
        stored.clone_from(source);
        Ok(GuardedUpdate::Applied)
    }

    async fn find_by_id(&self, id: TaskSourceId) -> TaskSourceRepositoryResult<Option<TaskSource>> {
        let sources = self.sources.read().map_err(poisoned)?;
        Ok(sources.get(&id).cloned())
    }

    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
        changed_before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> TaskSourceRepositoryResult<Vec<TaskSource>> {
        let sources = self.sources.read().map_err(poisoned)?;
        let mut matching: Vec<TaskSource> = sources
            .values()
            .filter(|source| source.sync_status() == status)
            .filter(|source| {
                changed_before.is_none_or(|cutoff| source.sync().changed_at() < cutoff)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|source| source.sync().changed_at());
        matching.truncate(limit);
        Ok(matching)
    }
}
