//! Evaluation verdicts and structured results stored on a task.

use super::{ParseStatusError, TaskAxis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which feasibility pass is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    /// Quick readiness check over title and description.
    Simple,
    /// Deeper pass that builds on the simple result.
    Advanced,
}

impl EvaluationKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Advanced => "advanced",
        }
    }

    /// Returns the task axis this pass advances.
    #[must_use]
    pub const fn axis(self) -> TaskAxis {
        match self {
            Self::Simple => TaskAxis::SimpleEvaluation,
            Self::Advanced => TaskAxis::AdvancedEvaluation,
        }
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The task is specified well enough to implement.
    Ready,
    /// A human must clarify the task first.
    NeedsClarification,
}

impl Verdict {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NeedsClarification => "needs_clarification",
        }
    }
}

impl TryFrom<&str> for Verdict {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ready" => Ok(Self::Ready),
            "needs_clarification" => Ok(Self::NeedsClarification),
            _ => Err(ParseStatusError::new("verdict", value)),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores on a 0..=100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationScores {
    /// How unambiguous the task description is.
    pub clarity: u8,
    /// How likely an automated implementation is to succeed.
    pub feasibility: u8,
    /// Estimated size of the change.
    pub complexity: u8,
}

/// Boolean capability flags reported by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// The change can be produced without a human in the loop.
    pub automatable: bool,
    /// The change needs credentials or systems outside the repository.
    pub requires_external_access: bool,
    /// The change touches user-facing interface code.
    pub touches_ui: bool,
}

/// Structured evaluation result stored on a completed axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Final verdict.
    pub verdict: Verdict,
    /// Numeric scores.
    pub scores: EvaluationScores,
    /// Capability flags.
    pub flags: CapabilityFlags,
    /// Short explanation from the evaluator.
    pub summary: Option<String>,
    /// Clarifying questions, populated for `needs_clarification`.
    pub questions: Vec<String>,
}
