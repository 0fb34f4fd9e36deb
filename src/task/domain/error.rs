//! Error types for task domain validation and parsing.

use super::{BlockReason, TaskAxis, TaskId, TaskSourceId};
use thiserror::Error;

/// Errors returned while constructing or mutating task domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The issue provider value is unsupported.
    #[error("unsupported issue provider: {0}")]
    InvalidIssueProvider(String),

    /// The repository path is empty or contains whitespace.
    #[error("invalid repository '{0}'")]
    InvalidRepository(String),

    /// The issue number is invalid.
    #[error("invalid issue number {0}, expected a positive integer")]
    InvalidIssueNumber(u64),

    /// The ticket key is empty or contains whitespace.
    #[error("invalid ticket key '{0}'")]
    InvalidTicketKey(String),

    /// The issue title is empty after trimming.
    #[error("issue title must not be empty")]
    EmptyIssueTitle,

    /// The task source name is empty after trimming.
    #[error("task source name must not be empty")]
    EmptySourceName,

    /// A stored issue key could not be parsed.
    #[error("malformed issue key '{0}'")]
    MalformedIssueKey(String),

    /// A status axis cannot move between the two states.
    #[error("invalid {axis} transition for task {task_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Task identifier.
        task_id: TaskId,
        /// Affected status axis.
        axis: TaskAxis,
        /// Current state in canonical form.
        from: &'static str,
        /// Requested state in canonical form.
        to: &'static str,
    },

    /// The task source sync status cannot move between the two states.
    #[error("invalid sync transition for task source {source_id}: {from} -> {to}")]
    InvalidSyncTransition {
        /// Task source identifier.
        source_id: TaskSourceId,
        /// Current state in canonical form.
        from: &'static str,
        /// Requested state in canonical form.
        to: &'static str,
    },

    /// The evaluation axis already completed and cannot be queued again.
    #[error("{axis} for task {task_id} already completed")]
    AlreadyCompleted {
        /// Task identifier.
        task_id: TaskId,
        /// Affected status axis.
        axis: TaskAxis,
    },

    /// The cross-axis precondition for a stage is not satisfied.
    #[error("task {task_id} cannot proceed: {reason}")]
    Blocked {
        /// Task identifier.
        task_id: TaskId,
        /// Why the stage is blocked.
        reason: BlockReason,
    },
}

/// Error returned while parsing a status value from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseStatusError {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The rejected raw value.
    pub value: String,
}

impl ParseStatusError {
    /// Creates a parse error for the given enumeration name.
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
