//! Per-axis state with failure bookkeeping and optimistic-concurrency guards.

use super::{AxisStatus, ParseStatusError, StageStatus, TaskAxis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The capability reported a permanent error.
    Capability,
    /// The AI response could not be parsed.
    MalformedResponse,
    /// Every transient retry failed.
    TransientExhausted,
    /// No usable provider or repository was configured.
    Configuration,
    /// The recovery sweeper found the axis stuck.
    Stuck,
    /// A wall-clock ceiling elapsed.
    Timeout,
}

impl FailureKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capability => "capability",
            Self::MalformedResponse => "malformed_response",
            Self::TransientExhausted => "transient_exhausted",
            Self::Configuration => "configuration",
            Self::Stuck => "stuck",
            Self::Timeout => "timeout",
        }
    }
}

impl TryFrom<&str> for FailureKind {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "capability" => Ok(Self::Capability),
            "malformed_response" => Ok(Self::MalformedResponse),
            "transient_exhausted" => Ok(Self::TransientExhausted),
            "configuration" => Ok(Self::Configuration),
            "stuck" => Ok(Self::Stuck),
            "timeout" => Ok(Self::Timeout),
            _ => Err(ParseStatusError::new("failure kind", value)),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure retained on an axis for operator visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Original error or verdict text.
    pub message: String,
    /// When the failure was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl StageFailure {
    /// Creates a failure record.
    pub fn new(kind: FailureKind, message: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at,
        }
    }
}

/// Current state of one status axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState<S> {
    status: S,
    changed_at: DateTime<Utc>,
    requeue_count: u32,
    failure: Option<StageFailure>,
}

/// Parameter object for reconstructing a persisted axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedStageData<S> {
    /// Persisted status.
    pub status: S,
    /// Persisted status change timestamp.
    pub changed_at: DateTime<Utc>,
    /// Persisted sweeper requeue counter.
    pub requeue_count: u32,
    /// Persisted failure, if any.
    pub failure: Option<StageFailure>,
}

impl<S: StageStatus> StageState<S> {
    /// Creates an axis in the given initial status.
    #[must_use]
    pub const fn new(status: S, changed_at: DateTime<Utc>) -> Self {
        Self {
            status,
            changed_at,
            requeue_count: 0,
            failure: None,
        }
    }

    /// Reconstructs an axis from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedStageData<S>) -> Self {
        Self {
            status: data.status,
            changed_at: data.changed_at,
            requeue_count: data.requeue_count,
            failure: data.failure,
        }
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> S {
        self.status
    }

    /// Returns when the status last changed (or was requeued).
    #[must_use]
    pub const fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    /// Returns how many times the sweeper requeued the axis.
    #[must_use]
    pub const fn requeue_count(&self) -> u32 {
        self.requeue_count
    }

    /// Returns the retained failure, if the axis failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Moves the axis to `next` when the state machine permits it.
    ///
    /// Returns the rejected `(from, to)` pair otherwise.
    pub(crate) fn transition(
        &mut self,
        next: S,
        at: DateTime<Utc>,
    ) -> Result<(), (&'static str, &'static str)> {
        if !self.status.can_transition_to(next) {
            return Err((self.status.as_str(), next.as_str()));
        }
        self.status = next;
        self.changed_at = at;
        Ok(())
    }

    /// Clears the failure and requeue counter for a fresh request.
    pub(crate) fn reset_bookkeeping(&mut self) {
        self.requeue_count = 0;
        self.failure = None;
    }

    /// Records a failure alongside a transition to the failed state.
    pub(crate) fn set_failure(&mut self, failure: StageFailure) {
        self.failure = Some(failure);
    }

    /// Refreshes the timestamp and bumps the requeue counter.
    pub(crate) fn bump_requeue(&mut self, at: DateTime<Utc>) {
        self.requeue_count = self.requeue_count.saturating_add(1);
        self.changed_at = at;
    }
}

/// Snapshot of an axis used to make a write conditional on what was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusGuard {
    /// Guarded axis.
    pub axis: TaskAxis,
    /// Status observed when the task was read.
    pub status: AxisStatus,
    /// Status timestamp observed when the task was read.
    pub changed_at: DateTime<Utc>,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedUpdate {
    /// The stored row still matched the guard and was updated.
    Applied,
    /// Another worker changed the row first; nothing was written.
    Conflict,
}

impl GuardedUpdate {
    /// Returns `true` when the write was applied.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}
