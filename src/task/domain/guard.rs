//! Cross-axis preconditions coupling the evaluation and implementation axes.

use super::{EvaluationStatus, Task, TaskDomainError, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the advanced evaluation axis gates implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancedEvaluationPolicy {
    /// The advanced verdict must be `ready` only if an advanced pass was run.
    #[default]
    WhenRun,
    /// The advanced pass must have completed with verdict `ready`.
    Required,
}

impl AdvancedEvaluationPolicy {
    /// Returns the canonical configuration representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WhenRun => "when_run",
            Self::Required => "required",
        }
    }
}

impl TryFrom<&str> for AdvancedEvaluationPolicy {
    type Error = super::ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "when_run" => Ok(Self::WhenRun),
            "required" => Ok(Self::Required),
            _ => Err(super::ParseStatusError::new(
                "advanced evaluation policy",
                value,
            )),
        }
    }
}

impl fmt::Display for AdvancedEvaluationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage cannot proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// The simple evaluation has not completed.
    SimpleNotReady,
    /// The simple evaluation asked for clarification.
    SimpleNeedsClarification,
    /// An advanced evaluation is queued, running or failed.
    AdvancedPending,
    /// The advanced evaluation asked for clarification.
    AdvancedNeedsClarification,
    /// Policy requires an advanced evaluation that has not completed.
    AdvancedRequired,
}

impl BlockReason {
    /// Returns a short operator-facing description.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimpleNotReady => "simple evaluation has not completed",
            Self::SimpleNeedsClarification => "simple evaluation needs clarification",
            Self::AdvancedPending => "advanced evaluation has not completed",
            Self::AdvancedNeedsClarification => "advanced evaluation needs clarification",
            Self::AdvancedRequired => "advanced evaluation is required",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks that the simple verdict permits further stages.
fn simple_ready(task: &Task) -> Result<(), BlockReason> {
    let axis = task.simple_evaluation();
    match (axis.status(), axis.result().map(|result| result.verdict)) {
        (EvaluationStatus::Completed, Some(Verdict::Ready)) => Ok(()),
        (EvaluationStatus::Completed, Some(Verdict::NeedsClarification)) => {
            Err(BlockReason::SimpleNeedsClarification)
        }
        _ => Err(BlockReason::SimpleNotReady),
    }
}

/// Ensures an advanced evaluation may be queued for `task`.
///
/// # Errors
///
/// Returns [`TaskDomainError::Blocked`] unless the simple verdict is `ready`.
pub fn ensure_advanced_allowed(task: &Task) -> Result<(), TaskDomainError> {
    simple_ready(task).map_err(|reason| TaskDomainError::Blocked {
        task_id: task.id(),
        reason,
    })
}

/// Ensures the implementation axis may leave `not_started` or `failed`.
///
/// The simple verdict must be `ready`. Under
/// [`AdvancedEvaluationPolicy::WhenRun`] an advanced pass that was never
/// requested is ignored, but one that is in flight, failed or asked for
/// clarification blocks. Under [`AdvancedEvaluationPolicy::Required`] the
/// advanced verdict must be `ready`.
///
/// # Errors
///
/// Returns [`TaskDomainError::Blocked`] with the first unmet precondition.
pub fn ensure_implementation_allowed(
    task: &Task,
    policy: AdvancedEvaluationPolicy,
) -> Result<(), TaskDomainError> {
    let blocked = |reason| TaskDomainError::Blocked {
        task_id: task.id(),
        reason,
    };
    simple_ready(task).map_err(blocked)?;

    let advanced = task.advanced_evaluation();
    let verdict = advanced.result().map(|result| result.verdict);
    match (advanced.status(), verdict, policy) {
        (EvaluationStatus::Completed, Some(Verdict::Ready), _)
        | (EvaluationStatus::NotStarted, _, AdvancedEvaluationPolicy::WhenRun) => Ok(()),
        (EvaluationStatus::Completed, Some(Verdict::NeedsClarification), _) => {
            Err(blocked(BlockReason::AdvancedNeedsClarification))
        }
        (EvaluationStatus::NotStarted, _, AdvancedEvaluationPolicy::Required) => {
            Err(blocked(BlockReason::AdvancedRequired))
        }
        _ => Err(blocked(BlockReason::AdvancedPending)),
    }
}
