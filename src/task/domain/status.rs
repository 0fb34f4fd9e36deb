//! Status enumerations for the task and task-source state machines.
//!
//! The three task axes are independent state machines coupled only by the
//! implementation guard in [`super::ensure_implementation_allowed`].

use super::ParseStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared behaviour of per-axis status enumerations.
pub trait StageStatus: Copy + Eq + fmt::Debug {
    /// Returns the canonical storage representation.
    fn as_str(self) -> &'static str;

    /// Returns whether the state machine permits `self -> next`.
    fn can_transition_to(self, next: Self) -> bool;

    /// Returns `true` for states that no worker will advance further.
    fn is_terminal(self) -> bool;
}

/// Evaluation axis status, shared by the simple and advanced passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// No evaluation has been requested.
    NotStarted,
    /// Waiting for an evaluation worker.
    Queued,
    /// An evaluation worker is calling the AI provider.
    Running,
    /// A verdict has been stored.
    Completed,
    /// The evaluation failed; the failure is retained on the axis.
    Failed,
}

impl StageStatus for EvaluationStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted | Self::Failed, Self::Queued)
                | (Self::Queued, Self::Running | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl TryFrom<&str> for EvaluationStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_started" => Ok(Self::NotStarted),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError::new("evaluation status", value)),
        }
    }
}

/// Implementation axis status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationStatus {
    /// No implementation has been requested.
    NotStarted,
    /// Waiting for an implementation worker.
    Queued,
    /// An implementation session is producing a change set.
    Implementing,
    /// The change set was produced.
    Completed,
    /// The implementation failed; the failure is retained on the axis.
    Failed,
}

impl StageStatus for ImplementationStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Queued => "queued",
            Self::Implementing => "implementing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted | Self::Failed, Self::Queued)
                | (Self::Queued, Self::Implementing | Self::Failed)
                | (Self::Implementing, Self::Completed | Self::Failed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl TryFrom<&str> for ImplementationStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_started" => Ok(Self::NotStarted),
            "queued" => Ok(Self::Queued),
            "implementing" | "running" => Ok(Self::Implementing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError::new("implementation status", value)),
        }
    }
}

/// Task source synchronisation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Never synchronised.
    Pending,
    /// A sync has been requested.
    Queued,
    /// A worker is pulling issues.
    Syncing,
    /// The last sync finished.
    Completed,
    /// The last sync could not fetch issues.
    Failed,
}

impl StageStatus for SyncStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Syncing, Self::Completed | Self::Failed | Self::Queued) => true,
            (Self::Syncing, _) => false,
            (_, Self::Syncing) => true,
            (Self::Pending | Self::Completed | Self::Failed, Self::Queued) => true,
            _ => false,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl SyncStatus {
    /// Returns `true` while a sync is requested or running.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Queued | Self::Syncing)
    }
}

impl TryFrom<&str> for SyncStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "syncing" => Ok(Self::Syncing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError::new("sync status", value)),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(EvaluationStatus, ImplementationStatus, SyncStatus);

/// One of the three independent task status axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAxis {
    /// Simple feasibility evaluation.
    SimpleEvaluation,
    /// Advanced feasibility evaluation.
    AdvancedEvaluation,
    /// AI-driven implementation.
    Implementation,
}

impl TaskAxis {
    /// All axes, in pipeline order.
    pub const ALL: [Self; 3] = [
        Self::SimpleEvaluation,
        Self::AdvancedEvaluation,
        Self::Implementation,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimpleEvaluation => "ai_evaluation_simple",
            Self::AdvancedEvaluation => "ai_evaluation_advanced",
            Self::Implementation => "ai_implementation",
        }
    }
}

impl fmt::Display for TaskAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status value of any task axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisStatus {
    /// Status of an evaluation axis.
    Evaluation(EvaluationStatus),
    /// Status of the implementation axis.
    Implementation(ImplementationStatus),
}

impl AxisStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Evaluation(status) => status.as_str(),
            Self::Implementation(status) => status.as_str(),
        }
    }

    /// Returns `true` when the axis is waiting for a worker.
    #[must_use]
    pub const fn is_queued(self) -> bool {
        matches!(
            self,
            Self::Evaluation(EvaluationStatus::Queued)
                | Self::Implementation(ImplementationStatus::Queued)
        )
    }

    /// Returns `true` when a worker is actively processing the axis.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(
            self,
            Self::Evaluation(EvaluationStatus::Running)
                | Self::Implementation(ImplementationStatus::Implementing)
        )
    }
}

impl fmt::Display for AxisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
