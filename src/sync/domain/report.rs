//! Outcome of one sync run.

use crate::task::domain::IssueKey;
use serde::Serialize;

/// Why one issue was not synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueSyncError {
    /// Issue the error belongs to.
    pub issue_key: IssueKey,
    /// Error text.
    pub message: String,
}

/// Counts of what a sync run did. Per-issue failures do not fail the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Tasks created.
    pub created: usize,
    /// Tasks whose upstream fields changed.
    pub updated: usize,
    /// Tasks already up to date.
    pub unchanged: usize,
    /// Issues another worker was processing.
    pub skipped: usize,
    /// Issues that could not be synced.
    pub errors: Vec<IssueSyncError>,
}

impl SyncReport {
    /// Returns the number of issues the run looked at.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.skipped + self.errors.len()
    }
}
