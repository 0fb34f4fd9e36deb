//! [`Stage`] adapters over the orchestration services.

use super::{Stage, StageError};
use crate::evaluation::services::EvaluationGate;
use crate::implementation::{ports::SessionRepository, services::ImplementationDispatcher};
use crate::lock::ports::ProcessingLockStore;
use crate::pipeline::{
    ports::{PipelineArtifactRepository, PipelineExecutionRepository},
    services::{ArtifactRecorder, PipelineMonitor},
};
use crate::provider::ports::SecretStore;
use crate::recovery::RecoverySweeper;
use crate::sync::services::TaskSourceSynchronizer;
use crate::task::{
    domain::EvaluationKind,
    ports::{TaskRepository, TaskSourceRepository},
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;

/// Queues due sources, then syncs the queue.
pub struct SyncStage<S, T, L, K, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    L: ProcessingLockStore,
    K: SecretStore,
    C: Clock + Send + Sync,
{
    synchronizer: Arc<TaskSourceSynchronizer<S, T, L, K, C>>,
    due_after: chrono::Duration,
    batch_size: usize,
}

impl<S, T, L, K, C> SyncStage<S, T, L, K, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    L: ProcessingLockStore,
    K: SecretStore,
    C: Clock + Send + Sync,
{
    /// Creates the stage; sources unsynced for `due_after` are re-queued.
    #[must_use]
    pub const fn new(
        synchronizer: Arc<TaskSourceSynchronizer<S, T, L, K, C>>,
        due_after: chrono::Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            synchronizer,
            due_after,
            batch_size,
        }
    }
}

#[async_trait]
impl<S, T, L, K, C> Stage for SyncStage<S, T, L, K, C>
where
    S: TaskSourceRepository + 'static,
    T: TaskRepository + 'static,
    L: ProcessingLockStore + 'static,
    K: SecretStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn tick(&self) -> Result<usize, StageError> {
        self.synchronizer
            .schedule_due(self.due_after, self.batch_size)
            .await?;
        let reports = self.synchronizer.sync_queued(self.batch_size).await?;
        Ok(reports.len())
    }
}

/// Runs queued simple and advanced evaluations.
pub struct EvaluationStage<T, S, C>
where
    T: TaskRepository,
    S: SessionRepository,
    C: Clock + Send + Sync,
{
    gate: Arc<EvaluationGate<T, S, C>>,
    batch_size: usize,
}

impl<T, S, C> EvaluationStage<T, S, C>
where
    T: TaskRepository,
    S: SessionRepository,
    C: Clock + Send + Sync,
{
    /// Creates the stage.
    #[must_use]
    pub const fn new(gate: Arc<EvaluationGate<T, S, C>>, batch_size: usize) -> Self {
        Self { gate, batch_size }
    }
}

#[async_trait]
impl<T, S, C> Stage for EvaluationStage<T, S, C>
where
    T: TaskRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "evaluation"
    }

    async fn tick(&self) -> Result<usize, StageError> {
        let mut handled = 0;
        for kind in [EvaluationKind::Simple, EvaluationKind::Advanced] {
            handled += self.gate.process_queued(kind, self.batch_size).await?.len();
        }
        Ok(handled)
    }
}

/// Runs queued implementations.
pub struct ImplementationStage<T, S, C>
where
    T: TaskRepository,
    S: SessionRepository,
    C: Clock + Send + Sync,
{
    dispatcher: Arc<ImplementationDispatcher<T, S, C>>,
    batch_size: usize,
}

impl<T, S, C> ImplementationStage<T, S, C>
where
    T: TaskRepository,
    S: SessionRepository,
    C: Clock + Send + Sync,
{
    /// Creates the stage.
    #[must_use]
    pub const fn new(dispatcher: Arc<ImplementationDispatcher<T, S, C>>, batch_size: usize) -> Self {
        Self {
            dispatcher,
            batch_size,
        }
    }
}

#[async_trait]
impl<T, S, C> Stage for ImplementationStage<T, S, C>
where
    T: TaskRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "implementation"
    }

    async fn tick(&self) -> Result<usize, StageError> {
        Ok(self.dispatcher.process_queued(self.batch_size).await?.len())
    }
}

/// Launches CI for finished sessions and polls active executions once.
pub struct PipelineStage<E, S, T, C>
where
    E: PipelineExecutionRepository,
    S: SessionRepository,
    T: TaskRepository,
    C: Clock + Send + Sync,
{
    monitor: Arc<PipelineMonitor<E, S, T, C>>,
    batch_size: usize,
}

impl<E, S, T, C> PipelineStage<E, S, T, C>
where
    E: PipelineExecutionRepository,
    S: SessionRepository,
    T: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates the stage.
    #[must_use]
    pub const fn new(monitor: Arc<PipelineMonitor<E, S, T, C>>, batch_size: usize) -> Self {
        Self {
            monitor,
            batch_size,
        }
    }
}

#[async_trait]
impl<E, S, T, C> Stage for PipelineStage<E, S, T, C>
where
    E: PipelineExecutionRepository + 'static,
    S: SessionRepository + 'static,
    T: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "pipeline"
    }

    async fn tick(&self) -> Result<usize, StageError> {
        let launched = self.monitor.launch_pending(self.batch_size).await?.len();
        let polled = self.monitor.poll_active(self.batch_size).await?.len();
        Ok(launched + polled)
    }
}

/// Records artifacts of successful executions.
pub struct ArtifactStage<E, A, C>
where
    E: PipelineExecutionRepository,
    A: PipelineArtifactRepository,
    C: Clock + Send + Sync,
{
    recorder: Arc<ArtifactRecorder<E, A, C>>,
    batch_size: usize,
}

impl<E, A, C> ArtifactStage<E, A, C>
where
    E: PipelineExecutionRepository,
    A: PipelineArtifactRepository,
    C: Clock + Send + Sync,
{
    /// Creates the stage.
    #[must_use]
    pub const fn new(recorder: Arc<ArtifactRecorder<E, A, C>>, batch_size: usize) -> Self {
        Self {
            recorder,
            batch_size,
        }
    }
}

#[async_trait]
impl<E, A, C> Stage for ArtifactStage<E, A, C>
where
    E: PipelineExecutionRepository + 'static,
    A: PipelineArtifactRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "artifacts"
    }

    async fn tick(&self) -> Result<usize, StageError> {
        Ok(self.recorder.record_pending(self.batch_size).await?)
    }
}

/// Runs one recovery sweep.
pub struct SweepStage<S, T, E, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    E: PipelineExecutionRepository,
    C: Clock + Send + Sync,
{
    sweeper: Arc<RecoverySweeper<S, T, E, C>>,
}

impl<S, T, E, C> SweepStage<S, T, E, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    E: PipelineExecutionRepository,
    C: Clock + Send + Sync,
{
    /// Creates the stage.
    #[must_use]
    pub const fn new(sweeper: Arc<RecoverySweeper<S, T, E, C>>) -> Self {
        Self { sweeper }
    }
}

#[async_trait]
impl<S, T, E, C> Stage for SweepStage<S, T, E, C>
where
    S: TaskSourceRepository + 'static,
    T: TaskRepository + 'static,
    E: PipelineExecutionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "sweeper"
    }

    async fn tick(&self) -> Result<usize, StageError> {
        let report = self.sweeper.sweep().await?;
        Ok(report.requeued.len() + report.failed.len())
    }
}
