//! Issues as reported by a tracker, before validation.

use crate::task::domain::{ExternalIssue, IssueReference, RemoteStatus, TaskDomainError};

/// An issue exactly as the tracker returned it.
///
/// Trackers may return incomplete records; [`FetchedIssue::validate`]
/// decides whether the issue can become a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedIssue {
    /// Provider reference.
    pub reference: IssueReference,
    /// Title as reported, possibly blank.
    pub title: String,
    /// Body text.
    pub description: Option<String>,
    /// Open/closed state.
    pub remote_status: RemoteStatus,
    /// Browser URL.
    pub web_url: Option<String>,
    /// Labels.
    pub labels: Vec<String>,
}

impl FetchedIssue {
    /// Creates an open issue with no body, URL or labels.
    #[must_use]
    pub fn new(reference: IssueReference, title: impl Into<String>) -> Self {
        Self {
            reference,
            title: title.into(),
            description: None,
            remote_status: RemoteStatus::Opened,
            web_url: None,
            labels: Vec::new(),
        }
    }

    /// Converts the record into a validated issue.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyIssueTitle`] for a blank title.
    pub fn validate(self) -> Result<ExternalIssue, TaskDomainError> {
        let mut issue = ExternalIssue::new(self.reference, self.title, self.remote_status)?
            .with_labels(self.labels);
        if let Some(description) = self.description {
            issue = issue.with_description(description);
        }
        if let Some(web_url) = self.web_url {
            issue = issue.with_web_url(web_url);
        }
        Ok(issue)
    }
}
