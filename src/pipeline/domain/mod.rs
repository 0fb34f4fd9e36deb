//! Pipeline domain model.

mod artifact;
mod error;
mod execution;

pub use artifact::{ArtifactType, PersistedArtifactData, PipelineArtifact, PipelineArtifactId, derive_artifacts};
pub use error::PipelineDomainError;
pub use execution::{
    ExecutionGuard, ExecutionHandle, PersistedExecutionData, PipelineExecution,
    PipelineExecutionId, PipelineOutputs, PipelineStatus, ReportedArtifact,
};
