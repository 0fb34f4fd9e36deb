//! CI trigger and poll capability.

use crate::pipeline::domain::{ExecutionHandle, PipelineOutputs, PipelineStatus};
use crate::retry::TransientError;
use async_trait::async_trait;
use thiserror::Error;

/// A run CI accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiRun {
    /// Reference used to poll the run.
    pub handle: ExecutionHandle,
    /// Web page of the run, when CI reports one.
    pub pipeline_url: Option<String>,
}

/// One observation of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiPoll {
    /// Status reported by CI.
    pub status: PipelineStatus,
    /// Outputs reported so far.
    pub outputs: PipelineOutputs,
    /// Failure or cancellation detail.
    pub message: Option<String>,
}

/// Starts and polls CI runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CiRunner: Send + Sync {
    /// Starts a run of `git_ref` in `repository`.
    async fn start(&self, repository: &str, git_ref: &str) -> Result<CiRun, CiError>;

    /// Reports the current state of a run.
    async fn poll(&self, handle: &ExecutionHandle) -> Result<CiPoll, CiError>;
}

/// Errors reported by the CI capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CiError {
    /// Network failure, timeout or 5xx; may succeed on retry.
    #[error("transient CI failure: {0}")]
    Transient(String),
    /// CI refused the request.
    #[error("CI rejected request: {0}")]
    Rejected(String),
    /// CI does not know the handle.
    #[error("unknown CI execution: {0}")]
    UnknownExecution(String),
}

impl TransientError for CiError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
