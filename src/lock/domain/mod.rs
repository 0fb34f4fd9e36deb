//! Domain types for the processing lock.

mod error;
mod lock;

pub use error::LockDomainError;
pub use lock::{AcquireOutcome, LockKey, LockStatus, ProcessingLock, ReleaseOutcome, WorkerId};
