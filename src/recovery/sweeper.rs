//! Periodic stuck-state reconciliation.

use super::report::{SweepReport, SweptEntity};
use crate::clock;
use crate::events::{EngineEvent, EventSink};
use crate::pipeline::{
    domain::{ExecutionGuard, PipelineDomainError, PipelineExecution},
    ports::{PipelineExecutionRepository, PipelineExecutionRepositoryError},
};
use crate::task::{
    domain::{
        AxisStatus, EvaluationStatus, FailureKind, GuardedUpdate, ImplementationStatus,
        StageFailure, StatusGuard, SyncGuard, SyncStatus, Task, TaskAxis, TaskDomainError,
        TaskSource,
    },
    ports::{
        AxisQuery, TaskRepository, TaskRepositoryError, TaskSourceRepository,
        TaskSourceRepositoryError,
    },
};
use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service-level errors for the recovery sweeper.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Task domain transition failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Pipeline domain transition failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineDomainError),
    /// Task repository operation failed.
    #[error(transparent)]
    Tasks(#[from] TaskRepositoryError),
    /// Task source repository operation failed.
    #[error(transparent)]
    Sources(#[from] TaskSourceRepositoryError),
    /// Execution repository operation failed.
    #[error(transparent)]
    Executions(#[from] PipelineExecutionRepositoryError),
}

/// Result type for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Thresholds applied by [`RecoverySweeper::sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// Age after which a `syncing` source counts as stalled.
    pub stuck_sync_after: Duration,
    /// Age after which a `queued` axis is requeued.
    pub queued_timeout: Duration,
    /// Age after which a `running` evaluation is failed.
    pub stuck_evaluation_timeout: Duration,
    /// Age after which an `implementing` implementation is failed.
    pub stuck_implementation_timeout: Duration,
    /// Wall-clock ceiling for a pipeline execution.
    pub pipeline_timeout: Duration,
    /// Requeues granted before a stalled row is failed instead.
    pub max_requeues: u32,
    /// Rows inspected per scan.
    pub batch_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            stuck_sync_after: Duration::minutes(15),
            queued_timeout: Duration::minutes(30),
            stuck_evaluation_timeout: Duration::minutes(15),
            stuck_implementation_timeout: Duration::minutes(60),
            pipeline_timeout: Duration::minutes(30),
            max_requeues: 3,
            batch_size: 100,
        }
    }
}

/// Requeues or fails work stuck past its threshold.
pub struct RecoverySweeper<S, T, E, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    E: PipelineExecutionRepository,
    C: Clock + Send + Sync,
{
    sources: Arc<S>,
    tasks: Arc<T>,
    executions: Arc<E>,
    clock: Arc<C>,
    events: Arc<dyn EventSink>,
    config: SweepConfig,
}

impl<S, T, E, C> RecoverySweeper<S, T, E, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    E: PipelineExecutionRepository,
    C: Clock + Send + Sync,
{
    /// Creates a sweeper using the default thresholds.
    #[must_use]
    pub fn new(
        sources: Arc<S>,
        tasks: Arc<T>,
        executions: Arc<E>,
        clock: Arc<C>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sources,
            tasks,
            executions,
            clock,
            events,
            config: SweepConfig::default(),
        }
    }

    /// Replaces the sweep thresholds.
    #[must_use]
    pub const fn with_config(mut self, config: SweepConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs one pass over every queue.
    ///
    /// Rows that moved between the scan and the write are left alone.
    ///
    /// # Errors
    ///
    /// Returns a repository error when a scan or write fails.
    pub async fn sweep(&self) -> RecoveryResult<SweepReport> {
        let now = clock::now(&*self.clock);
        let mut report = SweepReport::default();
        self.sweep_syncs(now, &mut report).await?;
        for axis in TaskAxis::ALL {
            self.sweep_queued(axis, now, &mut report).await?;
        }
        self.sweep_running(now, &mut report).await?;
        self.sweep_pipelines(now, &mut report).await?;
        if !report.is_empty() {
            info!(
                requeued = report.requeued.len(),
                failed = report.failed.len(),
                "recovery sweep changed rows"
            );
        }
        Ok(report)
    }

    async fn sweep_syncs(&self, now: DateTime<Utc>, report: &mut SweepReport) -> RecoveryResult<()> {
        let stalled = self
            .sources
            .list_by_sync_status(
                SyncStatus::Syncing,
                Some(now - self.config.stuck_sync_after),
                self.config.batch_size,
            )
            .await?;
        for mut source in stalled {
            let guard = source.sync_guard();
            let entity = SweptEntity::Source {
                source_id: source.id(),
            };
            let exhausted = source.sync().requeue_count() >= self.config.max_requeues;
            if exhausted {
                source.fail_sync("stuck: sync did not finish", now)?;
            } else {
                source.requeue_stuck(now)?;
            }
            if self.write_source(&source, &guard).await? {
                if exhausted {
                    warn!(source_id = %source.id(), "stalled sync failed after requeue cap");
                    report.failed.push(entity);
                } else {
                    info!(source_id = %source.id(), "stalled sync requeued");
                    report.requeued.push(entity);
                }
            }
        }
        Ok(())
    }

    async fn sweep_queued(
        &self,
        axis: TaskAxis,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> RecoveryResult<()> {
        let status = match axis {
            TaskAxis::SimpleEvaluation | TaskAxis::AdvancedEvaluation => {
                AxisStatus::Evaluation(EvaluationStatus::Queued)
            }
            TaskAxis::Implementation => AxisStatus::Implementation(ImplementationStatus::Queued),
        };
        let query = AxisQuery::new(axis, status, self.config.batch_size)
            .changed_before(now - self.config.queued_timeout);
        for mut task in self.tasks.list_by_axis(query).await? {
            let guard = task.status_guard(axis);
            let entity = SweptEntity::Task {
                task_id: task.id(),
                axis,
            };
            if task.axis_requeue_count(axis) >= self.config.max_requeues {
                let failure = StageFailure::new(
                    FailureKind::Stuck,
                    format!(
                        "stuck: still queued after {} requeues",
                        self.config.max_requeues
                    ),
                    now,
                );
                task.fail_axis(axis, failure, now)?;
                if self.write_task(&task, axis, &guard).await? {
                    warn!(task_id = %task.id(), axis = %axis, "queued axis failed after requeue cap");
                    report.failed.push(entity);
                }
            } else {
                task.requeue_axis(axis, now)?;
                if self.write_task(&task, axis, &guard).await? {
                    info!(
                        task_id = %task.id(),
                        axis = %axis,
                        requeue_count = task.axis_requeue_count(axis),
                        "queued axis requeued"
                    );
                    report.requeued.push(entity);
                }
            }
        }
        Ok(())
    }

    async fn sweep_running(&self, now: DateTime<Utc>, report: &mut SweepReport) -> RecoveryResult<()> {
        let running = [
            (
                TaskAxis::SimpleEvaluation,
                AxisStatus::Evaluation(EvaluationStatus::Running),
                self.config.stuck_evaluation_timeout,
            ),
            (
                TaskAxis::AdvancedEvaluation,
                AxisStatus::Evaluation(EvaluationStatus::Running),
                self.config.stuck_evaluation_timeout,
            ),
            (
                TaskAxis::Implementation,
                AxisStatus::Implementation(ImplementationStatus::Implementing),
                self.config.stuck_implementation_timeout,
            ),
        ];
        for (axis, status, timeout) in running {
            let query =
                AxisQuery::new(axis, status, self.config.batch_size).changed_before(now - timeout);
            for mut task in self.tasks.list_by_axis(query).await? {
                let guard = task.status_guard(axis);
                let failure = StageFailure::new(
                    FailureKind::Stuck,
                    format!("stuck: {status} for more than {} minutes", timeout.num_minutes()),
                    now,
                );
                task.fail_axis(axis, failure, now)?;
                if self.write_task(&task, axis, &guard).await? {
                    warn!(task_id = %task.id(), axis = %axis, "stuck axis failed");
                    report.failed.push(SweptEntity::Task {
                        task_id: task.id(),
                        axis,
                    });
                }
            }
        }
        Ok(())
    }

    async fn sweep_pipelines(&self, now: DateTime<Utc>, report: &mut SweepReport) -> RecoveryResult<()> {
        let timeout = self.config.pipeline_timeout;
        let active = self.executions.list_active(self.config.batch_size).await?;
        for mut execution in active
            .into_iter()
            .filter(|candidate| candidate.is_timed_out(now, timeout))
        {
            let guard = execution.guard();
            execution.time_out(timeout, now)?;
            if self.write_execution(&execution, &guard).await? {
                warn!(execution_id = %execution.id(), "abandoned pipeline execution timed out");
                report.failed.push(SweptEntity::Pipeline {
                    execution_id: execution.id(),
                });
            }
        }
        Ok(())
    }

    async fn write_source(
        &self,
        source: &TaskSource,
        guard: &SyncGuard,
    ) -> RecoveryResult<bool> {
        match self.sources.update_guarded(source, guard).await? {
            GuardedUpdate::Applied => {
                self.events.publish(EngineEvent::SourceSyncChanged {
                    source_id: source.id(),
                    status: source.sync_status(),
                });
                Ok(true)
            }
            GuardedUpdate::Conflict => {
                debug!(source_id = %source.id(), "source moved during sweep; skipped");
                Ok(false)
            }
        }
    }

    async fn write_task(
        &self,
        task: &Task,
        axis: TaskAxis,
        guard: &StatusGuard,
    ) -> RecoveryResult<bool> {
        match self.tasks.update_guarded(task, guard).await? {
            GuardedUpdate::Applied => {
                self.events.publish(EngineEvent::AxisChanged {
                    task_id: task.id(),
                    axis,
                    status: task.axis_status(axis),
                });
                Ok(true)
            }
            GuardedUpdate::Conflict => {
                debug!(task_id = %task.id(), axis = %axis, "axis moved during sweep; skipped");
                Ok(false)
            }
        }
    }

    async fn write_execution(
        &self,
        execution: &PipelineExecution,
        guard: &ExecutionGuard,
    ) -> RecoveryResult<bool> {
        match self.executions.update_guarded(execution, guard).await? {
            GuardedUpdate::Applied => {
                self.events.publish(EngineEvent::PipelineStatusChanged {
                    execution_id: execution.id(),
                    status: execution.status(),
                });
                Ok(true)
            }
            GuardedUpdate::Conflict => {
                debug!(execution_id = %execution.id(), "execution moved during sweep; skipped");
                Ok(false)
            }
        }
    }
}
