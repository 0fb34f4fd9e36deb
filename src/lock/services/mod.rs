//! Lock orchestration services.

mod lock_service;

pub use lock_service::{LockServiceError, LockServiceResult, ProcessingLockService};
