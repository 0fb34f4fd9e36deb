//! Issue-origin value objects for task creation and re-sync.

use super::{IssueKey, ParseStatusError, TaskDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported external issue providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueProvider {
    /// GitHub issues.
    #[serde(rename = "github")]
    GitHub,
    /// GitLab issues.
    #[serde(rename = "gitlab")]
    GitLab,
    /// Jira tickets.
    #[serde(rename = "jira")]
    Jira,
}

impl IssueProvider {
    /// Returns provider name in canonical storage format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Jira => "jira",
        }
    }
}

impl TryFrom<&str> for IssueProvider {
    type Error = TaskDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "jira" => Ok(Self::Jira),
            _ => Err(TaskDomainError::InvalidIssueProvider(value.to_owned())),
        }
    }
}

impl fmt::Display for IssueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open/closed state mirrored from the source tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    /// The issue is open upstream.
    Opened,
    /// The issue is closed upstream.
    Closed,
}

impl RemoteStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
        }
    }
}

impl TryFrom<&str> for RemoteStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "opened" | "open" => Ok(Self::Opened),
            "closed" => Ok(Self::Closed),
            _ => Err(ParseStatusError::new("remote status", value)),
        }
    }
}

/// Provider-specific reference to an external issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueReference {
    /// Repository-scoped issue number (GitHub, GitLab).
    Numbered {
        /// Issue provider.
        provider: IssueProvider,
        /// Repository or project path.
        repository: String,
        /// Positive issue number.
        number: u64,
    },
    /// Ticket key unique within the provider (Jira).
    Keyed {
        /// Issue provider.
        provider: IssueProvider,
        /// Ticket key such as `PROJ-42`.
        key: String,
    },
}

impl IssueReference {
    /// Creates a validated repository-scoped reference.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError`] when the repository is blank or the
    /// number is zero.
    pub fn numbered(
        provider: IssueProvider,
        repository: impl Into<String>,
        number: u64,
    ) -> Result<Self, TaskDomainError> {
        let raw = repository.into();
        let normalized = raw.trim().trim_matches('/');
        if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
            return Err(TaskDomainError::InvalidRepository(raw));
        }
        if number == 0 {
            return Err(TaskDomainError::InvalidIssueNumber(number));
        }
        Ok(Self::Numbered {
            provider,
            repository: normalized.to_owned(),
            number,
        })
    }

    /// Creates a validated ticket-key reference.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTicketKey`] when the key is blank
    /// or contains whitespace.
    pub fn keyed(provider: IssueProvider, key: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = key.into();
        let normalized = raw.trim();
        if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
            return Err(TaskDomainError::InvalidTicketKey(raw));
        }
        Ok(Self::Keyed {
            provider,
            key: normalized.to_ascii_uppercase(),
        })
    }

    /// Returns the issue provider.
    #[must_use]
    pub const fn provider(&self) -> IssueProvider {
        match self {
            Self::Numbered { provider, .. } | Self::Keyed { provider, .. } => *provider,
        }
    }

    /// Returns the stable key for this reference.
    #[must_use]
    pub fn key(&self) -> IssueKey {
        IssueKey::from_reference(self)
    }
}

/// Issue as returned by an issue source, before it becomes a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIssue {
    reference: IssueReference,
    title: String,
    description: Option<String>,
    remote_status: RemoteStatus,
    web_url: Option<String>,
    labels: Vec<String>,
}

impl ExternalIssue {
    /// Creates an external issue with a required title.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyIssueTitle`] if the title is blank.
    pub fn new(
        reference: IssueReference,
        title: impl Into<String>,
        remote_status: RemoteStatus,
    ) -> Result<Self, TaskDomainError> {
        let raw_title = title.into();
        let normalized_title = raw_title.trim();
        if normalized_title.is_empty() {
            return Err(TaskDomainError::EmptyIssueTitle);
        }

        Ok(Self {
            reference,
            title: normalized_title.to_owned(),
            description: None,
            remote_status,
            web_url: None,
            labels: Vec::new(),
        })
    }

    /// Sets the issue description; blank descriptions are dropped.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let value = description.into();
        let normalized = value.trim();
        self.description = (!normalized.is_empty()).then(|| normalized.to_owned());
        self
    }

    /// Sets the browser URL of the issue.
    #[must_use]
    pub fn with_web_url(mut self, web_url: impl Into<String>) -> Self {
        self.web_url = Some(web_url.into());
        self
    }

    /// Sets issue labels.
    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = String>) -> Self {
        self.labels = labels
            .into_iter()
            .map(|label| label.trim().to_owned())
            .filter(|label| !label.is_empty())
            .collect();
        self
    }

    /// Returns the provider reference.
    #[must_use]
    pub const fn reference(&self) -> &IssueReference {
        &self.reference
    }

    /// Returns the stable issue key.
    #[must_use]
    pub fn key(&self) -> IssueKey {
        self.reference.key()
    }

    /// Returns the issue title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the issue description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the open/closed state.
    #[must_use]
    pub const fn remote_status(&self) -> RemoteStatus {
        self.remote_status
    }

    /// Returns the browser URL, if known.
    #[must_use]
    pub fn web_url(&self) -> Option<&str> {
        self.web_url.as_deref()
    }

    /// Returns the issue labels.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
