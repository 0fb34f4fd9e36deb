//! AI completion capability.

use crate::provider::domain::{Completion, CompletionClientConfig, CompletionRequest};
use crate::retry::TransientError;
use async_trait::async_trait;
use thiserror::Error;

/// Sends a prompt to a resolved provider and returns its output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Runs one completion.
    async fn complete(
        &self,
        request: &CompletionRequest,
        config: &CompletionClientConfig,
    ) -> Result<Completion, CompletionError>;
}

/// Errors reported by the completion capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// Network failure, timeout, rate limit or 5xx; may succeed on retry.
    #[error("transient completion failure: {0}")]
    Transient(String),
    /// The provider rejected the credentials.
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),
    /// The provider rejected the request.
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

impl TransientError for CompletionError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
