//! Validation errors for lock values.

use thiserror::Error;

/// Errors returned while constructing lock values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockDomainError {
    /// The worker identifier is blank.
    #[error("worker identifier must not be empty")]
    EmptyWorkerId,

    /// A lock must expire after a positive number of seconds.
    #[error("lock timeout must be positive")]
    ZeroTimeout,
}
