//! Port contracts for lock storage.

mod store;

pub use store::{LockStoreError, LockStoreResult, ProcessingLockStore};
