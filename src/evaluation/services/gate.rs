//! Runs evaluation passes and advances the evaluation axes.

use super::prompt;
use crate::clock;
use crate::evaluation::domain::parse_evaluation;
use crate::events::{EngineEvent, EventSink};
use crate::implementation::{
    domain::{ImplementationDomainError, Session, SessionId, SessionKind},
    ports::{SessionRepository, SessionRepositoryError},
};
use crate::provider::{
    domain::{AiStage, CompletionClientConfig, CompletionRequest, TokenUsage},
    ports::{CompletionClient, ResolveError, StageProviderResolver},
};
use crate::retry::{RetryError, RetryPolicy, retry_transient};
use crate::task::{
    domain::{
        AxisStatus, EvaluationKind, EvaluationResult, EvaluationStatus, FailureKind,
        GuardedUpdate, StageFailure, StatusGuard, Task, TaskDomainError, TaskId, Verdict,
        ensure_advanced_allowed,
    },
    ports::{AxisQuery, TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service-level errors for the evaluation gate.
#[derive(Debug, Error)]
pub enum EvaluationError {
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

/// Result type for evaluation gate operations.
pub type EvaluationServiceResult<T> = Result<T, EvaluationError>;

/// Evaluation gate settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationSettings {
    /// Runner name recorded on sessions.
    pub runner: String,
    /// Backoff for transient completion failures.
    pub retry: RetryPolicy,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            runner: "foreman".to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Successful evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRun {
    /// Parsed result.
    pub result: EvaluationResult,
    /// Tokens consumed.
    pub usage: TokenUsage,
}

/// Failed evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Raw error text.
    pub message: String,
    /// Tokens consumed before the failure.
    pub usage: TokenUsage,
}

/// Outcome of one gate invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// The pass completed with a verdict.
    Completed {
        /// Verdict stored on the task.
        verdict: Verdict,
        /// Evaluation session.
        session_id: SessionId,
    },
    /// The pass failed; the failure is retained on the task.
    Failed {
        /// Failure category.
        kind: FailureKind,
        /// Session, when one was started.
        session_id: Option<SessionId>,
    },
    /// Another worker owns the pass, or it already completed.
    Skipped,
}

/// Runs simple and advanced evaluations.
pub struct EvaluationGate<T, S, C>
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
    settings: EvaluationSettings,
}

impl<T, S, C> EvaluationGate<T, S, C>
where
    T: TaskRepository,
    S: SessionRepository,
    C: Clock + Send + Sync,
{
    /// Creates a gate with default settings.
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
            settings: EvaluationSettings::default(),
        }
    }

    /// Replaces the gate settings.
    #[must_use]
    pub fn with_settings(mut self, settings: EvaluationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs the `kind` pass over `task` with an already-resolved
    /// configuration. No state is written.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationFailure`] classifying why no result was
    /// produced.
    pub async fn evaluate_with(
        &self,
        task: &Task,
        kind: EvaluationKind,
        config: &CompletionClientConfig,
    ) -> Result<EvaluationRun, EvaluationFailure> {
        let prompt_text = prompt::render(task, kind).map_err(|err| EvaluationFailure {
            kind: FailureKind::Configuration,
            message: err.to_string(),
            usage: TokenUsage::default(),
        })?;
        self.complete_and_parse(prompt_text, config).await
    }

    /// Runs the `kind` pass for `task_id`.
    ///
    /// A `not_started` or `failed` axis is queued first, so the call also
    /// serves as an explicit retry.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::Task`] with [`TaskDomainError::Blocked`]
    /// for an advanced pass before a `ready` simple verdict, or a
    /// repository error.
    pub async fn evaluate(
        &self,
        task_id: TaskId,
        kind: EvaluationKind,
    ) -> EvaluationServiceResult<EvaluationOutcome> {
        let mut task = self.load_task(task_id).await?;
        let mut guard = task.status_guard(kind.axis());
        match task.evaluation(kind).status() {
            EvaluationStatus::Running | EvaluationStatus::Completed => {
                return Ok(EvaluationOutcome::Skipped);
            }
            EvaluationStatus::NotStarted | EvaluationStatus::Failed => {
                task.queue_evaluation(kind, clock::now(&*self.clock))?;
                if !self.write_axis(&task, kind, &guard).await? {
                    return Ok(EvaluationOutcome::Skipped);
                }
                guard = task.status_guard(kind.axis());
            }
            EvaluationStatus::Queued => {}
        }
        self.run_queued(task, kind, guard).await
    }

    /// Evaluates up to `limit` tasks whose `kind` axis is queued, oldest
    /// first. Per-task errors are logged and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the queue cannot be listed.
    pub async fn process_queued(
        &self,
        kind: EvaluationKind,
        limit: usize,
    ) -> EvaluationServiceResult<Vec<EvaluationOutcome>> {
        let query = AxisQuery::new(
            kind.axis(),
            AxisStatus::Evaluation(EvaluationStatus::Queued),
            limit,
        );
        let queued = self.tasks.list_by_axis(query).await?;
        let mut outcomes = Vec::with_capacity(queued.len());
        for task in queued {
            let task_id = task.id();
            let guard = task.status_guard(kind.axis());
            match self.run_queued(task, kind, guard).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(task_id = %task_id, kind = %kind, error = %err, "evaluation failed"),
            }
        }
        Ok(outcomes)
    }

    async fn run_queued(
        &self,
        mut task: Task,
        kind: EvaluationKind,
        queued_guard: StatusGuard,
    ) -> EvaluationServiceResult<EvaluationOutcome> {
        if kind == EvaluationKind::Advanced {
            if let Err(TaskDomainError::Blocked { reason, .. }) = ensure_advanced_allowed(&task) {
                let failure = EvaluationFailure {
                    kind: FailureKind::Configuration,
                    message: format!("advanced evaluation blocked: {reason}"),
                    usage: TokenUsage::default(),
                };
                return self.fail_task(task, kind, &queued_guard, failure, None).await;
            }
        }
        let now = clock::now(&*self.clock);
        task.start_evaluation(kind, now)?;
        if !self.write_axis(&task, kind, &queued_guard).await? {
            debug!(task_id = %task.id(), kind = %kind, "evaluation claimed by another worker");
            return Ok(EvaluationOutcome::Skipped);
        }
        let running_guard = task.status_guard(kind.axis());
        info!(task_id = %task.id(), kind = %kind, "evaluation started");

        let config = match self
            .resolver
            .resolve_for_stage(task.project_id(), AiStage::Evaluation)
            .await
        {
            Ok(resolved) => resolved,
            Err(err) if err.is_configuration() => {
                let failure = EvaluationFailure {
                    kind: FailureKind::Configuration,
                    message: err.to_string(),
                    usage: TokenUsage::default(),
                };
                return self.fail_task(task, kind, &running_guard, failure, None).await;
            }
            Err(err) => return Err(EvaluationError::Provider(err)),
        };

        let prompt_text = match prompt::render(&task, kind) {
            Ok(text) => text,
            Err(err) => {
                let failure = EvaluationFailure {
                    kind: FailureKind::Configuration,
                    message: err.to_string(),
                    usage: TokenUsage::default(),
                };
                return self.fail_task(task, kind, &running_guard, failure, None).await;
            }
        };
        let mut session = Session::start(
            Some(task.id()),
            SessionKind::Evaluation,
            self.settings.runner.clone(),
            &prompt_text,
            now,
        )?;
        self.sessions.store(&session).await?;

        let attempt = self.complete_and_parse(prompt_text, &config).await;
        let finished_at = clock::now(&*self.clock);
        match attempt {
            Ok(run) => {
                let verdict = run.result.verdict;
                task.complete_evaluation(kind, run.result, finished_at)?;
                if !self.write_axis(&task, kind, &running_guard).await? {
                    session.fail(run.usage, "task changed while evaluating", finished_at)?;
                    self.sessions.update(&session).await?;
                    return Ok(EvaluationOutcome::Skipped);
                }
                session.complete(run.usage, None, finished_at)?;
                self.sessions.update(&session).await?;
                info!(task_id = %task.id(), kind = %kind, verdict = %verdict, "evaluation completed");
                Ok(EvaluationOutcome::Completed {
                    verdict,
                    session_id: session.id(),
                })
            }
            Err(failure) => {
                session.fail(failure.usage, failure.message.clone(), finished_at)?;
                self.sessions.update(&session).await?;
                self.fail_task(task, kind, &running_guard, failure, Some(session.id()))
                    .await
            }
        }
    }

    async fn complete_and_parse(
        &self,
        prompt_text: String,
        config: &CompletionClientConfig,
    ) -> Result<EvaluationRun, EvaluationFailure> {
        let request = CompletionRequest::new(prompt_text).with_system(prompt::system_prompt());
        let completion = retry_transient(&self.settings.retry, "evaluation completion", || {
            self.completion.complete(&request, config)
        })
        .await
        .map_err(|err| {
            let kind = match err {
                RetryError::Permanent { .. } => FailureKind::Capability,
                RetryError::Exhausted { .. } => FailureKind::TransientExhausted,
            };
            EvaluationFailure {
                kind,
                message: err.to_string(),
                usage: TokenUsage::default(),
            }
        })?;
        let usage = completion.usage;
        parse_evaluation(&completion.text)
            .map(|result| EvaluationRun { result, usage })
            .map_err(|err| EvaluationFailure {
                kind: FailureKind::MalformedResponse,
                message: err.to_string(),
                usage,
            })
    }

    async fn fail_task(
        &self,
        mut task: Task,
        kind: EvaluationKind,
        guard: &StatusGuard,
        failure: EvaluationFailure,
        session_id: Option<SessionId>,
    ) -> EvaluationServiceResult<EvaluationOutcome> {
        let at = clock::now(&*self.clock);
        warn!(
            task_id = %task.id(),
            kind = %kind,
            failure = %failure.kind,
            message = %failure.message,
            "evaluation failed"
        );
        task.fail_axis(
            kind.axis(),
            StageFailure::new(failure.kind, failure.message, at),
            at,
        )?;
        if !self.write_axis(&task, kind, guard).await? {
            return Ok(EvaluationOutcome::Skipped);
        }
        Ok(EvaluationOutcome::Failed {
            kind: failure.kind,
            session_id,
        })
    }

    async fn write_axis(
        &self,
        task: &Task,
        kind: EvaluationKind,
        guard: &StatusGuard,
    ) -> EvaluationServiceResult<bool> {
        let applied = self.tasks.update_guarded(task, guard).await? == GuardedUpdate::Applied;
        if applied {
            self.events.publish(EngineEvent::AxisChanged {
                task_id: task.id(),
                axis: kind.axis(),
                status: task.axis_status(kind.axis()),
            });
        }
        Ok(applied)
    }

    async fn load_task(&self, task_id: TaskId) -> EvaluationServiceResult<Task> {
        self.tasks
            .find_by_id(task_id)
            .await?
            .ok_or(EvaluationError::TaskNotFound(task_id))
    }
}
