//! Identifier and validated scalar types for the task domain.

use super::{IssueReference, TaskDomainError};
use crate::identifier::uuid_identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

uuid_identifier!(
    /// Unique identifier for an internal task record.
    TaskId
);

uuid_identifier!(
    /// Unique identifier for a configured task source integration.
    TaskSourceId
);

uuid_identifier!(
    /// Identifier of the project that owns task sources and provider settings.
    ProjectId
);

/// Stable, provider-qualified identity of an external issue.
///
/// Rendered as `github:owner/repo#12`, `gitlab:group/project#7` or
/// `jira:PROJ-3`. A task is created at most once per
/// (task source, issue key) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueKey(String);

impl IssueKey {
    /// Derives the key for an issue reference.
    #[must_use]
    pub fn from_reference(reference: &IssueReference) -> Self {
        match reference {
            IssueReference::Numbered {
                provider,
                repository,
                number,
            } => Self(format!("{provider}:{repository}#{number}")),
            IssueReference::Keyed { provider, key } => Self(format!("{provider}:{key}")),
        }
    }

    /// Reconstructs a key from its stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::MalformedIssueKey`] when the value has no
    /// `provider:` prefix or contains whitespace.
    pub fn parse(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let well_formed = raw
            .split_once(':')
            .is_some_and(|(provider, rest)| !provider.is_empty() && !rest.is_empty())
            && !raw.chars().any(char::is_whitespace);
        if !well_formed {
            return Err(TaskDomainError::MalformedIssueKey(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the key as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for IssueKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
