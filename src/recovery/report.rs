//! Sweep outcome types.

use crate::pipeline::domain::PipelineExecutionId;
use crate::task::domain::{TaskAxis, TaskId, TaskSourceId};
use serde::Serialize;

/// Row touched by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum SweptEntity {
    /// A task source whose sync stalled.
    Source {
        /// Affected source.
        source_id: TaskSourceId,
    },
    /// One status axis of a task.
    Task {
        /// Affected task.
        task_id: TaskId,
        /// Affected axis.
        axis: TaskAxis,
    },
    /// A pipeline execution nobody finished.
    Pipeline {
        /// Affected execution.
        execution_id: PipelineExecutionId,
    },
}

/// Rows requeued and failed by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Rows moved back to a queue.
    pub requeued: Vec<SweptEntity>,
    /// Rows moved to `failed`.
    pub failed: Vec<SweptEntity>,
}

impl SweepReport {
    /// Returns `true` when the sweep changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}
