//! Repository ports for task and task-source persistence.
//!
//! Status advancement is a conditional write: the caller passes the guard it
//! read and the repository applies the change only if the stored row still
//! matches, reporting [`GuardedUpdate::Conflict`] otherwise.

use crate::task::domain::{
    AxisStatus, GuardedUpdate, IssueKey, StatusGuard, SyncGuard, SyncStatus, Task, TaskAxis,
    TaskId, TaskSource, TaskSourceId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Selection of tasks in one axis status, oldest change first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisQuery {
    /// Axis to inspect.
    pub axis: TaskAxis,
    /// Status the axis must be in.
    pub status: AxisStatus,
    /// Only include tasks whose axis changed strictly before this instant.
    pub changed_before: Option<DateTime<Utc>>,
    /// Maximum number of tasks returned.
    pub limit: usize,
}

impl AxisQuery {
    /// Selects up to `limit` tasks with `axis` in `status`.
    #[must_use]
    pub const fn new(axis: TaskAxis, status: AxisStatus, limit: usize) -> Self {
        Self {
            axis,
            status,
            changed_before: None,
            limit,
        }
    }

    /// Restricts the selection to axes unchanged since `cutoff`.
    #[must_use]
    pub const fn changed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.changed_before = Some(cutoff);
        self
    }
}

/// Task persistence contract.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the identifier
    /// exists or [`TaskRepositoryError::DuplicateIssueKey`] when the source
    /// already has a task for the issue key.
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Writes the upstream-mirrored fields (title, description, remote
    /// status, URL) without touching any status axis.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn update_remote_fields(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Writes the axis named by `guard` if the stored axis still matches it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn update_guarded(
        &self,
        task: &Task,
        guard: &StatusGuard,
    ) -> TaskRepositoryResult<GuardedUpdate>;

    /// Finds a task by internal identifier.
    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Finds the task created for `issue_key` within a source.
    async fn find_by_issue_key(
        &self,
        source_id: TaskSourceId,
        issue_key: &IssueKey,
    ) -> TaskRepositoryResult<Option<Task>>;

    /// Lists tasks matching `query`, oldest axis change first.
    async fn list_by_axis(&self, query: AxisQuery) -> TaskRepositoryResult<Vec<Task>>;

    /// Lists every task of a source.
    async fn list_by_source(&self, source_id: TaskSourceId) -> TaskRepositoryResult<Vec<Task>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The source already has a task for this issue.
    #[error("task source {source_id} already has a task for {issue_key}")]
    DuplicateIssueKey {
        /// Owning task source.
        source_id: TaskSourceId,
        /// Conflicting issue key.
        issue_key: IssueKey,
    },

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

/// Result type for task source repository operations.
pub type TaskSourceRepositoryResult<T> = Result<T, TaskSourceRepositoryError>;

/// Task source persistence contract.
#[async_trait]
pub trait TaskSourceRepository: Send + Sync {
    /// Stores a new task source.
    ///
    /// # Errors
    ///
    /// Returns [`TaskSourceRepositoryError::DuplicateSource`] when the
    /// identifier already exists.
    async fn store(&self, source: &TaskSource) -> TaskSourceRepositoryResult<()>;

    /// Writes the sync axis if the stored axis still matches `guard`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskSourceRepositoryError::NotFound`] when the source does
    /// not exist.
    async fn update_guarded(
        &self,
        source: &TaskSource,
        guard: &SyncGuard,
    ) -> TaskSourceRepositoryResult<GuardedUpdate>;

    /// Finds a source by identifier.
    async fn find_by_id(&self, id: TaskSourceId) -> TaskSourceRepositoryResult<Option<TaskSource>>;

    /// Lists sources in `status`, oldest change first, optionally restricted
    /// to those unchanged since `changed_before`.
    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
        changed_before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> TaskSourceRepositoryResult<Vec<TaskSource>>;
}

/// Errors returned by task source repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskSourceRepositoryError {
    /// A source with the same identifier already exists.
    #[error("duplicate task source identifier: {0}")]
    DuplicateSource(TaskSourceId),

    /// The source was not found.
    #[error("task source not found: {0}")]
    NotFound(TaskSourceId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskSourceRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
