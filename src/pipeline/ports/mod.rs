//! Port contracts for CI runs and pipeline storage.

mod artifact_repository;
mod ci;
mod execution_repository;

pub use artifact_repository::{
    PipelineArtifactRepository, PipelineArtifactRepositoryError, PipelineArtifactRepositoryResult,
};
#[cfg(test)]
pub use ci::MockCiRunner;
pub use ci::{CiError, CiPoll, CiRun, CiRunner};
pub use execution_repository::{
    PipelineExecutionRepository, PipelineExecutionRepositoryError,
    PipelineExecutionRepositoryResult,
};
