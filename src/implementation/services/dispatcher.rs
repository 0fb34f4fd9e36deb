//! Turns queued implementations into change sets.

use super::prompt;
use crate::clock;
use crate::events::{EngineEvent, EventSink};
use crate::implementation::{
    domain::{ImplementationDomainError, Session, SessionId, SessionKind, parse_change_set},
    ports::{SessionRepository, SessionRepositoryError},
};
use crate::provider::{
    domain::{AiStage, CompletionRequest, TokenUsage},
    ports::{CompletionClient, CompletionError, ResolveError, StageProviderResolver},
};
use crate::retry::{RetryError, RetryPolicy, retry_transient};
use crate::task::{
    domain::{
        AdvancedEvaluationPolicy, AxisStatus, FailureKind, GuardedUpdate, ImplementationStatus, StageFailure,
        StatusGuard, Task, TaskAxis, TaskDomainError, TaskId,
    },
    ports::{AxisQuery, TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Service-level errors for implementation dispatch.
#[derive(Debug, Error)]
pub enum ImplementationError {
    /// Task domain validation failed.
    #[error(transparent)]
    Task(#[from] TaskDomainError),
    /// Session domain validation failed.
    #[error(transparent)]
    Session(#[from] ImplementationDomainError),
    /// Task repository operation failed.
    #[error(transparent)]
    Tasks(#[from] TaskRepositoryError),
    /// Session repository operation failed.
    #[error(transparent)]
    Sessions(#[from] SessionRepositoryError),
    /// Provider lookups failed for infrastructure reasons.
    #[error(transparent)]
    Provider(ResolveError),
    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Result type for implementation dispatch.
pub type ImplementationResult<T> = Result<T, ImplementationError>;

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplementationSettings {
    /// Runner name recorded on sessions.
    pub runner: String,
    /// Advanced-evaluation policy enforced before implementation.
    pub policy: AdvancedEvaluationPolicy,
    /// Backoff for transient completion failures.
    pub retry: RetryPolicy,
}

impl Default for ImplementationSettings {
    fn default() -> Self {
        Self {
            runner: "foreman".to_owned(),
            policy: AdvancedEvaluationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The session produced a change set and the task completed.
    Completed {
        /// Implementation session.
        session_id: SessionId,
    },
    /// The implementation failed; the failure is retained on the task.
    Failed {
        /// Failure category.
        kind: FailureKind,
        /// Session, when one was started.
        session_id: Option<SessionId>,
    },
    /// Another worker owns the implementation, or it is not queued.
    Skipped,
}

/// Runs implementation sessions for tasks whose verdicts allow it.
pub struct ImplementationDispatcher<T, S, C>
where
    T: TaskRepository,
    S: SessionRepository,
    C: Clock + Send + Sync,
{
    tasks: Arc<T>,
    sessions: Arc<S>,
    resolver: Arc<dyn StageProviderResolver>,
    completion: Arc<dyn CompletionClient>,
    clock: Arc<C>,
    events: Arc<dyn EventSink>,
    settings: ImplementationSettings,
}

/// Failed attempt to produce a change set.
struct AttemptFailure {
    kind: FailureKind,
    message: String,
    usage: TokenUsage,
}

impl<T, S, C> ImplementationDispatcher<T, S, C>
where
    T: TaskRepository,
    S: SessionRepository,
    C: Clock + Send + Sync,
{
    /// Creates a dispatcher with default settings.
    #[must_use]
    pub fn new(
        tasks: Arc<T>,
        sessions: Arc<S>,
        resolver: Arc<dyn StageProviderResolver>,
        completion: Arc<dyn CompletionClient>,
        clock: Arc<C>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            tasks,
            sessions,
            resolver,
            completion,
            clock,
            events,
            settings: ImplementationSettings::default(),
        }
    }

    /// Replaces the dispatcher settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ImplementationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs implementation for `task_id`.
    ///
    /// A `not_started` or `failed` task is queued first, so the call also
    /// serves as an explicit retry. A task already implementing or
    /// completed is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ImplementationError::Task`] with
    /// [`TaskDomainError::Blocked`] when the verdicts do not permit
    /// implementation, or a repository error.
    pub async fn start_implementation(
        &self,
        task_id: TaskId,
    ) -> ImplementationResult<DispatchOutcome> {
        let mut task = self.load_task(task_id).await?;
        let now = clock::now(&*self.clock);
        let mut guard = task.status_guard(TaskAxis::Implementation);
        match task.implementation().status() {
            ImplementationStatus::Implementing | ImplementationStatus::Completed => {
                return Ok(DispatchOutcome::Skipped);
            }
            ImplementationStatus::NotStarted | ImplementationStatus::Failed => {
                task.queue_implementation(self.settings.policy, now)?;
                if !self.write_axis(&task, &guard).await? {
                    return Ok(DispatchOutcome::Skipped);
                }
                guard = task.status_guard(TaskAxis::Implementation);
            }
            ImplementationStatus::Queued => {}
        }
        self.run_queued(task, guard).await
    }

    /// Dispatches up to `limit` queued implementations, oldest first.
    ///
    /// Per-task errors are logged and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the queue cannot be listed.
    pub async fn process_queued(&self, limit: usize) -> ImplementationResult<Vec<DispatchOutcome>> {
        let query = AxisQuery::new(
            TaskAxis::Implementation,
            AxisStatus::Implementation(ImplementationStatus::Queued),
            limit,
        );
        let queued = self.tasks.list_by_axis(query).await?;
        let mut outcomes = Vec::with_capacity(queued.len());
        for task in queued {
            let task_id = task.id();
            let guard = task.status_guard(TaskAxis::Implementation);
            match self.run_queued(task, guard).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(task_id = %task_id, error = %err, "implementation dispatch failed"),
            }
        }
        Ok(outcomes)
    }

    async fn run_queued(
        &self,
        mut task: Task,
        queued_guard: StatusGuard,
    ) -> ImplementationResult<DispatchOutcome> {
        let now = clock::now(&*self.clock);
        let Some(repository) = task.worker_repository().map(str::to_owned) else {
            return self
                .fail_task(
                    task,
                    &queued_guard,
                    FailureKind::Configuration,
                    "task has no worker repository".to_owned(),
                    None,
                )
                .await;
        };
        if let Err(err) = task.start_implementation(self.settings.policy, now) {
            return match err {
                TaskDomainError::Blocked { reason, .. } => {
                    self.fail_task(
                        task,
                        &queued_guard,
                        FailureKind::Configuration,
                        format!("implementation blocked: {reason}"),
                        None,
                    )
                    .await
                }
                other => Err(other.into()),
            };
        }
        if !self.write_axis(&task, &queued_guard).await? {
            return Ok(DispatchOutcome::Skipped);
        }
        let running_guard = task.status_guard(TaskAxis::Implementation);
        info!(task_id = %task.id(), repository = %repository, "implementation started");

        let config = match self
            .resolver
            .resolve_for_stage(task.project_id(), AiStage::Implementation)
            .await
        {
            Ok(resolved) => resolved,
            Err(err) if err.is_configuration() => {
                return self
                    .fail_task(
                        task,
                        &running_guard,
                        FailureKind::Configuration,
                        err.to_string(),
                        None,
                    )
                    .await;
            }
            Err(err) => return Err(ImplementationError::Provider(err)),
        };

        let prompt_text = match prompt::render(&task, &repository) {
            Ok(text) => text,
            Err(err) => {
                return self
                    .fail_task(
                        task,
                        &running_guard,
                        FailureKind::Configuration,
                        err.to_string(),
                        None,
                    )
                    .await;
            }
        };
        let mut session = Session::start(
            Some(task.id()),
            SessionKind::Implementation,
            self.settings.runner.clone(),
            &prompt_text,
            now,
        )?;
        self.sessions.store(&session).await?;

        let request = CompletionRequest::new(prompt_text).with_system(prompt::system_prompt());
        let attempt = retry_transient(&self.settings.retry, "implementation completion", || {
            self.completion.complete(&request, &config)
        })
        .await;
        let finished_at = clock::now(&*self.clock);
        let produced = match attempt {
            Ok(completion) => parse_change_set(&completion.text)
                .map(|change_set| (change_set, completion.usage))
                .map_err(|err| AttemptFailure {
                    kind: FailureKind::MalformedResponse,
                    message: err.to_string(),
                    usage: completion.usage,
                }),
            Err(err) => Err(completion_failure(err)),
        };

        match produced {
            Ok((change_set, usage)) => {
                task.complete_implementation(finished_at)?;
                if !self.write_axis(&task, &running_guard).await? {
                    session.fail(usage, "task changed while implementing", finished_at)?;
                    self.sessions.update(&session).await?;
                    return Ok(DispatchOutcome::Skipped);
                }
                session.complete(usage, Some(change_set), finished_at)?;
                self.sessions.update(&session).await?;
                info!(task_id = %task.id(), session_id = %session.id(), "implementation completed");
                Ok(DispatchOutcome::Completed {
                    session_id: session.id(),
                })
            }
            Err(failure) => {
                session.fail(failure.usage, failure.message.clone(), finished_at)?;
                self.sessions.update(&session).await?;
                self.fail_task(
                    task,
                    &running_guard,
                    failure.kind,
                    failure.message,
                    Some(session.id()),
                )
                .await
            }
        }
    }

    async fn fail_task(
        &self,
        mut task: Task,
        guard: &StatusGuard,
        kind: FailureKind,
        message: String,
        session_id: Option<SessionId>,
    ) -> ImplementationResult<DispatchOutcome> {
        let at = clock::now(&*self.clock);
        warn!(task_id = %task.id(), kind = %kind, message = %message, "implementation failed");
        task.fail_axis(
            TaskAxis::Implementation,
            StageFailure::new(kind, message, at),
            at,
        )?;
        if !self.write_axis(&task, guard).await? {
            return Ok(DispatchOutcome::Skipped);
        }
        Ok(DispatchOutcome::Failed { kind, session_id })
    }

    async fn write_axis(&self, task: &Task, guard: &StatusGuard) -> ImplementationResult<bool> {
        let applied = self.tasks.update_guarded(task, guard).await? == GuardedUpdate::Applied;
        if applied {
            self.events.publish(EngineEvent::AxisChanged {
                task_id: task.id(),
                axis: TaskAxis::Implementation,
                status: task.axis_status(TaskAxis::Implementation),
            });
        }
        Ok(applied)
    }

    async fn load_task(&self, task_id: TaskId) -> ImplementationResult<Task> {
        self.tasks
            .find_by_id(task_id)
            .await?
            .ok_or(ImplementationError::TaskNotFound(task_id))
    }
}

fn completion_failure(err: RetryError<CompletionError>) -> AttemptFailure {
    let kind = match err {
        RetryError::Permanent { .. } => FailureKind::Capability,
        RetryError::Exhausted { .. } => FailureKind::TransientExhausted,
    };
    AttemptFailure {
        kind,
        message: err.to_string(),
        usage: TokenUsage::default(),
    }
}
