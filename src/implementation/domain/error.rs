//! Error types for session and change-set values.

use super::SessionId;
use thiserror::Error;

/// Errors returned while constructing or mutating sessions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImplementationDomainError {
    /// The runner name is blank.
    #[error("session runner must not be empty")]
    EmptyRunner,

    /// The session already finished.
    #[error("session {session_id} is {status}, expected running")]
    SessionFinished {
        /// Session identifier.
        session_id: SessionId,
        /// Current status.
        status: &'static str,
    },

    /// The model output is not a usable change set.
    #[error("malformed change set: {0}")]
    MalformedChangeSet(String),
}
