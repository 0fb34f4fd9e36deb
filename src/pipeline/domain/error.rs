//! Error types for pipeline domain validation.

use super::{PipelineExecutionId, PipelineStatus};
use thiserror::Error;

/// Errors returned while constructing or transitioning pipeline records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineDomainError {
    /// A required text field was blank.
    #[error("pipeline field '{0}' must not be empty")]
    EmptyField(&'static str),
    /// The status change is not an edge of the pipeline lifecycle.
    #[error("pipeline execution {execution_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Execution identifier.
        execution_id: PipelineExecutionId,
        /// Current status.
        from: PipelineStatus,
        /// Requested status.
        to: PipelineStatus,
    },
    /// Artifacts are only recorded for successful executions.
    #[error("pipeline execution {execution_id} is {status}; artifacts need success")]
    NotRecordable {
        /// Execution identifier.
        execution_id: PipelineExecutionId,
        /// Current status.
        status: PipelineStatus,
    },
}
