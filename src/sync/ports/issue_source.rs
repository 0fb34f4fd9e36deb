//! Issue tracker capability.

use crate::provider::domain::SecretString;
use crate::retry::TransientError;
use crate::sync::domain::FetchedIssue;
use crate::task::domain::IssueSourceConfig;
use async_trait::async_trait;
use thiserror::Error;

/// Lists the issues of a configured tracker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fetches every issue visible through `config`, authenticating with
    /// `credential` when the tracker needs one.
    async fn list_issues(
        &self,
        config: &IssueSourceConfig,
        credential: Option<SecretString>,
    ) -> Result<Vec<FetchedIssue>, IssueSourceError>;
}

/// Errors reported by the issue source capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IssueSourceError {
    /// Network failure, timeout, rate limit or 5xx; may succeed on retry.
    #[error("transient tracker failure: {0}")]
    Transient(String),
    /// The tracker rejected the credentials.
    #[error("tracker rejected credentials: {0}")]
    Unauthorized(String),
    /// The tracker rejected the request.
    #[error("tracker rejected request: {0}")]
    Rejected(String),
}

impl TransientError for IssueSourceError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
