//! Synchronization services.

mod synchronizer;

pub(crate) use synchronizer::IssueOutcome;
pub use synchronizer::{SyncError, SyncResult, SyncSettings, TaskSourceSynchronizer};
