//! Pipeline artifact persistence contract.

use crate::pipeline::domain::{PipelineArtifact, PipelineExecutionId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for pipeline artifact repository operations.
pub type PipelineArtifactRepositoryResult<T> = Result<T, PipelineArtifactRepositoryError>;

/// Append-only artifact storage.
#[async_trait]
pub trait PipelineArtifactRepository: Send + Sync {
    /// Inserts `artifact` unless one with the same execution, type and
    /// reference exists. Returns `true` when a row was written.
    async fn insert_if_absent(
        &self,
        artifact: &PipelineArtifact,
    ) -> PipelineArtifactRepositoryResult<bool>;

    /// Lists the artifacts of an execution, oldest first.
    async fn list_by_execution(
        &self,
        execution_id: PipelineExecutionId,
    ) -> PipelineArtifactRepositoryResult<Vec<PipelineArtifact>>;
}

/// Errors returned by pipeline artifact repositories.
#[derive(Debug, Clone, Error)]
pub enum PipelineArtifactRepositoryError {
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PipelineArtifactRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
