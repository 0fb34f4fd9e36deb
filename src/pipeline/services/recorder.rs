//! Turns successful pipeline outputs into artifact rows.

use crate::clock;
use crate::events::{EngineEvent, EventSink};
use crate::pipeline::{
    domain::{PipelineArtifact, PipelineDomainError, PipelineExecutionId, derive_artifacts},
    ports::{
        PipelineArtifactRepository, PipelineArtifactRepositoryError, PipelineExecutionRepository,
        PipelineExecutionRepositoryError,
    },
};
use crate::task::domain::GuardedUpdate;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service-level errors for the artifact recorder.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The execution is not in a recordable state.
    #[error(transparent)]
    Domain(#[from] PipelineDomainError),
    /// Execution repository operation failed.
    #[error(transparent)]
    Executions(#[from] PipelineExecutionRepositoryError),
    /// Artifact repository operation failed.
    #[error(transparent)]
    Artifacts(#[from] PipelineArtifactRepositoryError),
    /// The execution does not exist.
    #[error("pipeline execution not found: {0}")]
    ExecutionNotFound(PipelineExecutionId),
}

/// Result type for artifact recorder operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Records artifacts of successful executions.
pub struct ArtifactRecorder<E, A, C>
where
    E: PipelineExecutionRepository,
    A: PipelineArtifactRepository,
    C: Clock + Send + Sync,
{
    executions: Arc<E>,
    artifacts: Arc<A>,
    clock: Arc<C>,
    events: Arc<dyn EventSink>,
}

impl<E, A, C> ArtifactRecorder<E, A, C>
where
    E: PipelineExecutionRepository,
    A: PipelineArtifactRepository,
    C: Clock + Send + Sync,
{
    /// Creates a recorder.
    #[must_use]
    pub fn new(executions: Arc<E>, artifacts: Arc<A>, clock: Arc<C>, events: Arc<dyn EventSink>) -> Self {
        Self {
            executions,
            artifacts,
            clock,
            events,
        }
    }

    /// Records the artifacts of a successful execution and returns every
    /// artifact stored for it.
    ///
    /// Safe to repeat: rows are keyed on `(execution, type, reference)`, so a
    /// second call writes nothing and returns the same set.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Domain`] with
    /// [`PipelineDomainError::NotRecordable`] unless the execution succeeded.
    pub async fn record(
        &self,
        execution_id: PipelineExecutionId,
    ) -> RecordResult<Vec<PipelineArtifact>> {
        let mut execution = self
            .executions
            .find_by_id(execution_id)
            .await?
            .ok_or(RecordError::ExecutionNotFound(execution_id))?;
        execution.ensure_recordable()?;
        let now = clock::now(&*self.clock);

        for artifact in derive_artifacts(&execution, now) {
            if self.artifacts.insert_if_absent(&artifact).await? {
                debug!(
                    execution_id = %execution_id,
                    artifact_type = %artifact.artifact_type(),
                    "artifact recorded"
                );
                self.events.publish(EngineEvent::ArtifactRecorded {
                    execution_id,
                    artifact_id: artifact.id(),
                    artifact_type: artifact.artifact_type(),
                });
            }
        }

        if execution.artifacts_recorded_at().is_none() {
            let guard = execution.guard();
            execution.mark_artifacts_recorded(now)?;
            if self.executions.update_guarded(&execution, &guard).await? == GuardedUpdate::Conflict {
                debug!(execution_id = %execution_id, "recording stamp written concurrently");
            }
        }

        let recorded = self.artifacts.list_by_execution(execution_id).await?;
        info!(execution_id = %execution_id, artifacts = recorded.len(), "artifacts recorded");
        Ok(recorded)
    }

    /// Records artifacts for up to `limit` successful executions not yet
    /// recorded. Returns how many executions were recorded.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the executions cannot be listed.
    pub async fn record_pending(&self, limit: usize) -> RecordResult<usize> {
        let pending = self.executions.list_unrecorded_successes(limit).await?;
        let mut recorded = 0;
        for execution in pending {
            match self.record(execution.id()).await {
                Ok(_) => recorded += 1,
                Err(err) => warn!(execution_id = %execution.id(), error = %err, "artifact recording failed"),
            }
        }
        Ok(recorded)
    }
}
