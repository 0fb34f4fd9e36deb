//! Port contracts for issue trackers.

mod issue_source;

#[cfg(test)]
pub use issue_source::MockIssueSource;
pub use issue_source::{IssueSource, IssueSourceError};
