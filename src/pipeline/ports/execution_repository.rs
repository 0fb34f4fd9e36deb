//! Pipeline execution persistence contract.

use crate::implementation::domain::SessionId;
use crate::pipeline::domain::{ExecutionGuard, PipelineExecution, PipelineExecutionId};
use crate::task::domain::GuardedUpdate;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for pipeline execution repository operations.
pub type PipelineExecutionRepositoryResult<T> = Result<T, PipelineExecutionRepositoryError>;

/// Pipeline execution persistence contract.
#[async_trait]
pub trait PipelineExecutionRepository: Send + Sync {
    /// Stores a new execution.
    async fn store(&self, execution: &PipelineExecution) -> PipelineExecutionRepositoryResult<()>;

    /// Writes `execution` only if the stored row still matches `guard`.
    async fn update_guarded(
        &self,
        execution: &PipelineExecution,
        guard: &ExecutionGuard,
    ) -> PipelineExecutionRepositoryResult<GuardedUpdate>;

    /// Finds an execution by identifier.
    async fn find_by_id(
        &self,
        id: PipelineExecutionId,
    ) -> PipelineExecutionRepositoryResult<Option<PipelineExecution>>;

    /// Lists the executions of a session, oldest first.
    async fn list_by_session(
        &self,
        session_id: SessionId,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>>;

    /// Lists non-terminal executions, least recently polled first.
    async fn list_active(
        &self,
        limit: usize,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>>;

    /// Lists successful executions whose artifacts are not recorded yet,
    /// oldest first.
    async fn list_unrecorded_successes(
        &self,
        limit: usize,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>>;
}

/// Errors returned by pipeline execution repositories.
#[derive(Debug, Clone, Error)]
pub enum PipelineExecutionRepositoryError {
    /// An execution with the same identifier already exists.
    #[error("duplicate pipeline execution identifier: {0}")]
    DuplicateExecution(PipelineExecutionId),
    /// The execution does not exist.
    #[error("pipeline execution not found: {0}")]
    NotFound(PipelineExecutionId),
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PipelineExecutionRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
