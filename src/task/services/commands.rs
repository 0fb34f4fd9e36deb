//! Imperative UI commands and read-only status queries.
//!
//! Commands only enqueue work; the stage workers pick it up. Repeating a
//! command while the work is queued or running is a no-op.

use crate::clock;
use crate::events::{EngineEvent, EventSink};
use crate::task::{
    domain::{
        AdvancedEvaluationPolicy, AxisStatus, EvaluationKind, GuardedUpdate, IssueKey,
        RemoteStatus, StageFailure, SyncStatus, Task, TaskAxis, TaskDomainError, TaskId,
        TaskSource, TaskSourceId, Verdict,
    },
    ports::{
        TaskRepository, TaskRepositoryError, TaskSourceRepository, TaskSourceRepositoryError,
    },
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Attempts made before a request contended by concurrent writers gives up.
const MAX_REQUEST_ATTEMPTS: usize = 3;

/// Outcome of an enqueue command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The work was queued by this call.
    Enqueued,
    /// The work was already queued or running; nothing changed.
    AlreadyInFlight,
}

/// Service-level errors for task commands and queries.
#[derive(Debug, Error)]
pub enum TaskCommandError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Task repository operation failed.
    #[error(transparent)]
    Tasks(#[from] TaskRepositoryError),
    /// Task source repository operation failed.
    #[error(transparent)]
    Sources(#[from] TaskSourceRepositoryError),
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The task source does not exist.
    #[error("task source not found: {0}")]
    SourceNotFound(TaskSourceId),
    /// Concurrent writers kept changing the row.
    #[error("{entity} kept changing concurrently; request abandoned")]
    Contended {
        /// Description of the contended row.
        entity: String,
    },
}

/// Result type for task command operations.
pub type TaskCommandResult<T> = Result<T, TaskCommandError>;

/// Read-only view of one task axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisView {
    /// Axis described.
    pub axis: TaskAxis,
    /// Current status.
    pub status: AxisStatus,
    /// When the status last changed.
    pub changed_at: DateTime<Utc>,
    /// Sweeper requeues since the last request.
    pub requeue_count: u32,
    /// Retained failure, if the axis failed.
    pub failure: Option<StageFailure>,
    /// Verdict of a completed evaluation axis.
    pub verdict: Option<Verdict>,
}

/// Read-only view of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusView {
    /// Task identifier.
    pub task_id: TaskId,
    /// Source the task came from.
    pub source_id: TaskSourceId,
    /// Issue identity.
    pub issue_key: IssueKey,
    /// Task title.
    pub title: String,
    /// Upstream open/closed state.
    pub remote_status: RemoteStatus,
    /// Simple evaluation, advanced evaluation and implementation axes.
    pub axes: Vec<AxisView>,
    /// Latest change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TaskStatusView {
    fn from_task(task: &Task) -> Self {
        let axes = TaskAxis::ALL
            .into_iter()
            .map(|axis| AxisView {
                axis,
                status: task.axis_status(axis),
                changed_at: task.axis_changed_at(axis),
                requeue_count: task.axis_requeue_count(axis),
                failure: task.axis_failure(axis).cloned(),
                verdict: match axis {
                    TaskAxis::SimpleEvaluation => task.simple_evaluation().result(),
                    TaskAxis::AdvancedEvaluation => task.advanced_evaluation().result(),
                    TaskAxis::Implementation => None,
                }
                .map(|result| result.verdict),
            })
            .collect();
        Self {
            task_id: task.id(),
            source_id: task.source_id(),
            issue_key: task.issue_key().clone(),
            title: task.title().to_owned(),
            remote_status: task.remote_status(),
            axes,
            updated_at: task.updated_at(),
        }
    }

    /// Returns the view of `axis`.
    #[must_use]
    pub fn axis(&self, axis: TaskAxis) -> Option<&AxisView> {
        self.axes.iter().find(|view| view.axis == axis)
    }
}

/// Read-only view of a task source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatusView {
    /// Source identifier.
    pub source_id: TaskSourceId,
    /// Display name.
    pub name: String,
    /// Tracker kind.
    pub kind: &'static str,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// When the last sync finished.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Error of the last failed sync.
    pub last_error: Option<String>,
    /// Number of tasks synced from the source.
    pub task_count: usize,
}

/// Enqueue commands and status queries exposed to the UI layer.
#[derive(Clone)]
pub struct TaskCommandService<T, S, C>
where
    T: TaskRepository,
    S: TaskSourceRepository,
    C: Clock + Send + Sync,
{
    tasks: Arc<T>,
    sources: Arc<S>,
    clock: Arc<C>,
    events: Arc<dyn EventSink>,
    policy: AdvancedEvaluationPolicy,
}

impl<T, S, C> TaskCommandService<T, S, C>
where
    T: TaskRepository,
    S: TaskSourceRepository,
    C: Clock + Send + Sync,
{
    /// Creates a command service using the default advanced-evaluation policy.
    #[must_use]
    pub fn new(tasks: Arc<T>, sources: Arc<S>, clock: Arc<C>, events: Arc<dyn EventSink>) -> Self {
        Self {
            tasks,
            sources,
            clock,
            events,
            policy: AdvancedEvaluationPolicy::default(),
        }
    }

    /// Sets the advanced-evaluation policy enforced by
    /// [`Self::request_implementation`].
    #[must_use]
    pub const fn with_policy(mut self, policy: AdvancedEvaluationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Queues a sync of `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCommandError::SourceNotFound`] for an unknown source,
    /// or a repository error.
    pub async fn request_sync(&self, source_id: TaskSourceId) -> TaskCommandResult<RequestOutcome> {
        for _ in 0..MAX_REQUEST_ATTEMPTS {
            let mut source = self.load_source(source_id).await?;
            let guard = source.sync_guard();
            if !source.request_sync(clock::now(&*self.clock))? {
                debug!(source_id = %source_id, status = %guard.status, "sync already in flight");
                return Ok(RequestOutcome::AlreadyInFlight);
            }
            if self.sources.update_guarded(&source, &guard).await? == GuardedUpdate::Applied {
                info!(source_id = %source_id, "sync requested");
                self.events.publish(EngineEvent::SourceSyncChanged {
                    source_id,
                    status: source.sync_status(),
                });
                return Ok(RequestOutcome::Enqueued);
            }
        }
        Err(TaskCommandError::Contended {
            entity: format!("task source {source_id}"),
        })
    }

    /// Queues an evaluation pass for `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCommandError::Domain`] when the pass already completed
    /// or an advanced pass is requested before the simple verdict is
    /// `ready`.
    pub async fn request_evaluation(
        &self,
        task_id: TaskId,
        kind: EvaluationKind,
    ) -> TaskCommandResult<RequestOutcome> {
        self.request_axis(task_id, kind.axis(), |task, now| {
            task.queue_evaluation(kind, now)
        })
        .await
    }

    /// Queues implementation for `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCommandError::Domain`] with
    /// [`TaskDomainError::Blocked`] when the evaluation verdicts do not
    /// permit implementation.
    pub async fn request_implementation(
        &self,
        task_id: TaskId,
    ) -> TaskCommandResult<RequestOutcome> {
        let policy = self.policy;
        self.request_axis(task_id, TaskAxis::Implementation, |task, now| {
            task.queue_implementation(policy, now)
        })
        .await
    }

    /// Returns the status view of a task, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCommandError::Tasks`] when the lookup fails.
    pub async fn task_status(&self, task_id: TaskId) -> TaskCommandResult<Option<TaskStatusView>> {
        let task = self.tasks.find_by_id(task_id).await?;
        Ok(task.as_ref().map(TaskStatusView::from_task))
    }

    /// Returns the status view of a task source, or `None` if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns a repository error when a lookup fails.
    pub async fn source_status(
        &self,
        source_id: TaskSourceId,
    ) -> TaskCommandResult<Option<SourceStatusView>> {
        let Some(source) = self.sources.find_by_id(source_id).await? else {
            return Ok(None);
        };
        let task_count = self.tasks.list_by_source(source_id).await?.len();
        Ok(Some(source_view(&source, task_count)))
    }

    async fn request_axis<F>(
        &self,
        task_id: TaskId,
        axis: TaskAxis,
        queue: F,
    ) -> TaskCommandResult<RequestOutcome>
    where
        F: Fn(&mut Task, DateTime<Utc>) -> Result<bool, TaskDomainError> + Send + Sync,
    {
        for _ in 0..MAX_REQUEST_ATTEMPTS {
            let mut task = self
                .tasks
                .find_by_id(task_id)
                .await?
                .ok_or(TaskCommandError::TaskNotFound(task_id))?;
            let guard = task.status_guard(axis);
            if !queue(&mut task, clock::now(&*self.clock))? {
                debug!(task_id = %task_id, axis = %axis, status = %guard.status, "already in flight");
                return Ok(RequestOutcome::AlreadyInFlight);
            }
            if self.tasks.update_guarded(&task, &guard).await? == GuardedUpdate::Applied {
                info!(task_id = %task_id, axis = %axis, "stage requested");
                self.events.publish(EngineEvent::AxisChanged {
                    task_id,
                    axis,
                    status: task.axis_status(axis),
                });
                return Ok(RequestOutcome::Enqueued);
            }
        }
        Err(TaskCommandError::Contended {
            entity: format!("{axis} of task {task_id}"),
        })
    }

    async fn load_source(&self, source_id: TaskSourceId) -> TaskCommandResult<TaskSource> {
        self.sources
            .find_by_id(source_id)
            .await?
            .ok_or(TaskCommandError::SourceNotFound(source_id))
    }
}

fn source_view(source: &TaskSource, task_count: usize) -> SourceStatusView {
    SourceStatusView {
        source_id: source.id(),
        name: source.name().to_owned(),
        kind: source.config().kind(),
        sync_status: source.sync_status(),
        last_synced_at: source.last_synced_at(),
        last_error: source.last_error().map(str::to_owned),
        task_count,
    }
}
