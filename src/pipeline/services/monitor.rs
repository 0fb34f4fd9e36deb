//! Launches CI runs for implementation sessions and polls them to a
//! terminal status.

use crate::clock;
use crate::events::{EngineEvent, EventSink};
use crate::implementation::{
    domain::{Session, SessionId},
    ports::{SessionRepository, SessionRepositoryError},
};
use crate::pipeline::{
    domain::{PipelineDomainError, PipelineExecution, PipelineExecutionId, PipelineStatus},
    ports::{CiRunner, PipelineExecutionRepository, PipelineExecutionRepositoryError},
};
use crate::retry::{RetryError, RetryPolicy, retry_transient};
use crate::task::{
    domain::GuardedUpdate,
    ports::{TaskRepository, TaskRepositoryError},
};
use chrono::Duration;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Service-level errors for the pipeline monitor.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipeline domain validation failed.
    #[error(transparent)]
    Domain(#[from] PipelineDomainError),
    /// Execution repository operation failed.
    #[error(transparent)]
    Executions(#[from] PipelineExecutionRepositoryError),
    /// Session repository operation failed.
    #[error(transparent)]
    Sessions(#[from] SessionRepositoryError),
    /// Task repository operation failed.
    #[error(transparent)]
    Tasks(#[from] TaskRepositoryError),
    /// The session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    /// The session produced no change set to build.
    #[error("session {0} has no change set")]
    NoChangeSet(SessionId),
    /// No worker repository is known for the session's task.
    #[error("session {0} has no worker repository")]
    MissingRepository(SessionId),
    /// The execution does not exist.
    #[error("pipeline execution not found: {0}")]
    ExecutionNotFound(PipelineExecutionId),
}

/// Result type for pipeline monitor operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Polling cadence and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Delay between polls of one execution.
    pub poll_interval: std::time::Duration,
    /// Wall-clock ceiling measured from launch.
    pub timeout: Duration,
    /// Backoff for transient CI failures within one launch or poll.
    pub retry: RetryPolicy,
    /// Age after which a hand-off claim with no stored launch may be taken
    /// over by another monitor. Must outlast the CI start retries.
    pub handoff_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(10 * 60),
            timeout: Duration::minutes(30),
            retry: RetryPolicy::default(),
            handoff_timeout: Duration::minutes(15),
        }
    }
}

/// Result of a launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// CI accepted the run; a pending execution was stored.
    Started {
        /// New execution.
        execution_id: PipelineExecutionId,
    },
    /// The session already has a live execution or another monitor claimed
    /// it.
    AlreadyActive,
    /// CI refused the run; a failed execution was stored.
    StartFailed {
        /// Failed execution.
        execution_id: PipelineExecutionId,
    },
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The poll was stamped; the status did not move.
    Unchanged(PipelineStatus),
    /// The status moved.
    Changed(PipelineStatus),
    /// The wall-clock timeout elapsed; the execution failed.
    TimedOut,
    /// The execution was already terminal; nothing was written.
    Finished(PipelineStatus),
    /// Another writer changed the execution since it was read.
    Conflict,
}

impl PollOutcome {
    /// Returns the terminal status reached, if any.
    #[must_use]
    pub const fn terminal_status(self) -> Option<PipelineStatus> {
        match self {
            Self::Changed(status) | Self::Finished(status) | Self::Unchanged(status)
                if status.is_terminal() =>
            {
                Some(status)
            }
            Self::TimedOut => Some(PipelineStatus::Failed),
            _ => None,
        }
    }
}

/// How a tracking loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The execution reached a terminal status.
    Finished(PipelineStatus),
    /// Shutdown was requested; state persisted by the last poll is kept.
    Cancelled,
}

/// Tracks CI runs for completed implementation sessions.
pub struct PipelineMonitor<E, S, T, C>
where
    E: PipelineExecutionRepository,
    S: SessionRepository,
    T: TaskRepository,
    C: Clock + Send + Sync,
{
    executions: Arc<E>,
    sessions: Arc<S>,
    tasks: Arc<T>,
    ci: Arc<dyn CiRunner>,
    clock: Arc<C>,
    events: Arc<dyn EventSink>,
    settings: MonitorSettings,
}

impl<E, S, T, C> PipelineMonitor<E, S, T, C>
where
    E: PipelineExecutionRepository,
    S: SessionRepository,
    T: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a monitor with default settings.
    #[must_use]
    pub fn new(
        executions: Arc<E>,
        sessions: Arc<S>,
        tasks: Arc<T>,
        ci: Arc<dyn CiRunner>,
        clock: Arc<C>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            executions,
            sessions,
            tasks,
            ci,
            clock,
            events,
            settings: MonitorSettings::default(),
        }
    }

    /// Replaces the monitor settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Starts a CI run for the change set of `session_id`.
    ///
    /// Launching again after a terminal execution creates a new row; earlier
    /// rows are kept. A stale claim whose launch was never recorded is taken
    /// over.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoChangeSet`] or
    /// [`PipelineError::MissingRepository`] when there is nothing to build,
    /// or a repository error.
    pub async fn launch(&self, session_id: SessionId) -> PipelineResult<LaunchOutcome> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or(PipelineError::SessionNotFound(session_id))?;
        let branch = session
            .change_set()
            .map(|change_set| change_set.branch.clone())
            .ok_or(PipelineError::NoChangeSet(session_id))?;
        let existing = self.executions.list_by_session(session_id).await?;
        if session.launched_at().is_none()
            && let Some(stored) = existing.last()
        {
            debug!(session_id = %session_id, "recording launch left unstamped");
            self.sessions
                .record_launch(session_id, stored.started_at())
                .await?;
            return Ok(LaunchOutcome::AlreadyActive);
        }
        if existing
            .iter()
            .any(|execution| !execution.status().is_terminal())
        {
            debug!(session_id = %session_id, "session already has a live pipeline");
            return Ok(LaunchOutcome::AlreadyActive);
        }
        let repository = self.worker_repository(&session).await?;

        let now = clock::now(&*self.clock);
        if session.handed_off_at().is_some() && session.launched_at().is_none() {
            warn!(session_id = %session_id, "taking over a stale pipeline hand-off");
        }
        if self
            .sessions
            .claim_handoff(session_id, session.handed_off_at(), now)
            .await?
            == GuardedUpdate::Conflict
        {
            debug!(session_id = %session_id, "session claimed by another monitor");
            return Ok(LaunchOutcome::AlreadyActive);
        }

        let started = retry_transient(&self.settings.retry, "ci start", || {
            self.ci.start(&repository, &branch)
        })
        .await;
        let launched_at = clock::now(&*self.clock);
        let (execution, outcome) = match started {
            Ok(run) => {
                let execution = PipelineExecution::start(
                    session_id,
                    session.task_id(),
                    repository,
                    branch,
                    run.handle,
                    run.pipeline_url,
                    launched_at,
                )?;
                let execution_id = execution.id();
                info!(session_id = %session_id, execution_id = %execution_id, "pipeline started");
                (execution, LaunchOutcome::Started { execution_id })
            }
            Err(err) => {
                let execution = PipelineExecution::failed_to_start(
                    session_id,
                    session.task_id(),
                    repository,
                    branch,
                    format!("CI refused to start: {err}"),
                    launched_at,
                )?;
                let execution_id = execution.id();
                warn!(session_id = %session_id, execution_id = %execution_id, error = %err, "pipeline start failed");
                (execution, LaunchOutcome::StartFailed { execution_id })
            }
        };
        self.executions.store(&execution).await?;
        self.sessions.record_launch(session_id, launched_at).await?;
        self.publish(&execution);
        Ok(outcome)
    }

    /// Launches pipelines for up to `limit` sessions awaiting one, including
    /// claims older than the hand-off timeout that never stored a launch.
    /// Per-session errors are logged and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the sessions cannot be listed.
    pub async fn launch_pending(&self, limit: usize) -> PipelineResult<Vec<LaunchOutcome>> {
        let stale_before = clock::now(&*self.clock) - self.settings.handoff_timeout;
        let sessions = self
            .sessions
            .list_awaiting_pipeline(stale_before, limit)
            .await?;
        let mut outcomes = Vec::with_capacity(sessions.len());
        for session in sessions {
            match self.launch(session.id()).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(session_id = %session.id(), error = %err, "pipeline launch failed"),
            }
        }
        Ok(outcomes)
    }

    /// Polls CI once for `execution_id` and persists what it reports.
    ///
    /// The poll timestamp is stamped whether or not the status moved. A
    /// transient CI failure that outlasts the retry policy only stamps; a
    /// permanent one fails the execution. Past the wall-clock timeout the
    /// execution fails without polling.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ExecutionNotFound`] or a repository error.
    pub async fn poll_once(&self, execution_id: PipelineExecutionId) -> PipelineResult<PollOutcome> {
        let mut execution = self.load(execution_id).await?;
        if execution.status().is_terminal() {
            return Ok(PollOutcome::Finished(execution.status()));
        }
        let guard = execution.guard();
        let now = clock::now(&*self.clock);

        if execution.is_timed_out(now, self.settings.timeout) {
            execution.time_out(self.settings.timeout, now)?;
            if self.executions.update_guarded(&execution, &guard).await? == GuardedUpdate::Conflict {
                return Ok(PollOutcome::Conflict);
            }
            warn!(execution_id = %execution_id, "pipeline timed out");
            self.publish(&execution);
            return Ok(PollOutcome::TimedOut);
        }

        let changed = match execution.handle().cloned() {
            None => {
                execution.fail("execution has no CI handle", now)?;
                true
            }
            Some(handle) => {
                let polled = retry_transient(&self.settings.retry, "ci poll", || {
                    self.ci.poll(&handle)
                })
                .await;
                let observed_at = clock::now(&*self.clock);
                match polled {
                    Ok(poll) => {
                        match execution.observe(poll.status, poll.outputs, poll.message, observed_at) {
                            Ok(moved) => moved,
                            Err(err) => {
                                warn!(execution_id = %execution_id, error = %err, "ignoring impossible status report");
                                execution.stamp(observed_at);
                                false
                            }
                        }
                    }
                    Err(RetryError::Exhausted { error, .. }) => {
                        debug!(execution_id = %execution_id, error = %error, "poll failed transiently");
                        execution.stamp(observed_at);
                        false
                    }
                    Err(RetryError::Permanent { error, .. }) => {
                        execution.fail(format!("CI poll failed: {error}"), observed_at)?;
                        true
                    }
                }
            }
        };

        if self.executions.update_guarded(&execution, &guard).await? == GuardedUpdate::Conflict {
            debug!(execution_id = %execution_id, "execution changed concurrently");
            return Ok(PollOutcome::Conflict);
        }
        if !changed {
            return Ok(PollOutcome::Unchanged(execution.status()));
        }
        info!(execution_id = %execution_id, status = %execution.status(), "pipeline status changed");
        self.publish(&execution);
        Ok(PollOutcome::Changed(execution.status()))
    }

    /// Polls up to `limit` live executions once each, least recently polled
    /// first.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the executions cannot be listed.
    pub async fn poll_active(&self, limit: usize) -> PipelineResult<Vec<PollOutcome>> {
        let active = self.executions.list_active(limit).await?;
        let mut outcomes = Vec::with_capacity(active.len());
        for execution in active {
            match self.poll_once(execution.id()).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(execution_id = %execution.id(), error = %err, "pipeline poll failed"),
            }
        }
        Ok(outcomes)
    }

    /// Polls `execution_id` every poll interval until it is terminal or
    /// `cancel` fires. The wait before a poll never runs past the wall-clock
    /// deadline.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`Self::poll_once`].
    pub async fn track(
        &self,
        execution_id: PipelineExecutionId,
        cancel: CancellationToken,
    ) -> PipelineResult<TrackOutcome> {
        let deadline = self.load(execution_id).await?.started_at() + self.settings.timeout;
        loop {
            if let Some(status) = self.poll_once(execution_id).await?.terminal_status() {
                return Ok(TrackOutcome::Finished(status));
            }
            let remaining = (deadline - clock::now(&*self.clock))
                .to_std()
                .unwrap_or_default();
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(execution_id = %execution_id, "pipeline tracking cancelled");
                    return Ok(TrackOutcome::Cancelled);
                }
                () = tokio::time::sleep(self.settings.poll_interval.min(remaining)) => {}
            }
        }
    }

    /// Returns the current state of an execution, or `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the lookup fails.
    pub async fn execution_status(
        &self,
        execution_id: PipelineExecutionId,
    ) -> PipelineResult<Option<PipelineExecution>> {
        Ok(self.executions.find_by_id(execution_id).await?)
    }

    /// Lists every execution of a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the lookup fails.
    pub async fn session_executions(
        &self,
        session_id: SessionId,
    ) -> PipelineResult<Vec<PipelineExecution>> {
        Ok(self.executions.list_by_session(session_id).await?)
    }

    async fn worker_repository(&self, session: &Session) -> PipelineResult<String> {
        let Some(task_id) = session.task_id() else {
            return Err(PipelineError::MissingRepository(session.id()));
        };
        self.tasks
            .find_by_id(task_id)
            .await?
            .and_then(|task| task.worker_repository().map(str::to_owned))
            .ok_or(PipelineError::MissingRepository(session.id()))
    }

    async fn load(&self, execution_id: PipelineExecutionId) -> PipelineResult<PipelineExecution> {
        self.executions
            .find_by_id(execution_id)
            .await?
            .ok_or(PipelineError::ExecutionNotFound(execution_id))
    }

    fn publish(&self, execution: &PipelineExecution) {
        self.events.publish(EngineEvent::PipelineStatusChanged {
            execution_id: execution.id(),
            status: execution.status(),
        });
    }
}
