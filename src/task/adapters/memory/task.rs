//! In-memory repository for tasks.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{GuardedUpdate, IssueKey, StatusGuard, Task, TaskId, TaskSourceId},
    ports::{AxisQuery, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, Task>,
    issue_index: HashMap<(TaskSourceId, IssueKey), TaskId>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::Persistence`] if the lock is poisoned.
    pub fn len(&self) -> TaskRepositoryResult<usize> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.tasks.len())
    }

    /// Returns `true` when no task is stored.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::Persistence`] if the lock is poisoned.
    pub fn is_empty(&self) -> TaskRepositoryResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> TaskRepositoryError {
    TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }

        let key = (task.source_id(), task.issue_key().clone());
        if state.issue_index.contains_key(&key) {
            return Err(TaskRepositoryError::DuplicateIssueKey {
                source_id: key.0,
                issue_key: key.1,
            });
        }

        state.issue_index.insert(key, task.id());
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn update_remote_fields(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let stored = state
            .tasks
            .get_mut(&task.id())
            .ok_or(TaskRepositoryError::NotFound(task.id()))?;
        stored.adopt_remote_fields(task);
        Ok(())
    }

    async fn update_guarded(
        &self,
        task: &Task,
        guard: &StatusGuard,
    ) -> TaskRepositoryResult<GuardedUpdate> {
        let mut state = self.state.write().map_err(poisoned)?;
        let stored = state
            .tasks
            .get_mut(&task.id())
            .ok_or(TaskRepositoryError::NotFound(task.id()))?;
        if !stored.matches_guard(guard) {
            return Ok(GuardedUpdate::Conflict);
        }
        stored.adopt_axis(task, guard.axis);
        Ok(GuardedUpdate::Applied)
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_by_issue_key(
        &self,
        source_id: TaskSourceId,
        issue_key: &IssueKey,
    ) -> TaskRepositoryResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        let task = state
            .issue_index
            .get(&(source_id, issue_key.clone()))
            .and_then(|task_id| state.tasks.get(task_id))
            .cloned();
        Ok(task)
    }

    async fn list_by_axis(&self, query: AxisQuery) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut matching: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.axis_status(query.axis) == query.status)
            .filter(|task| {
                query
                    .changed_before
                    .is_none_or(|cutoff| task.axis_changed_at(query.axis) < cutoff)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|task| task.axis_changed_at(query.axis));
        matching.truncate(query.limit);
        Ok(matching)
    }

    async fn list_by_source(&self, source_id: TaskSourceId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.source_id() == source_id)
            .cloned()
            .collect();
        tasks.sort_by_key(Task::created_at);
        Ok(tasks)
    }
}
