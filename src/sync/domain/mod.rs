//! Sync domain types.

mod issue;
mod report;

pub use issue::FetchedIssue;
pub use report::{IssueSyncError, SyncReport};
