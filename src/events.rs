//! State-change events published to the UI layer.
//!
//! Services publish through an [`EventSink`]. Publishing never fails the
//! operation that produced the event: a sink with no listeners drops it.

use crate::pipeline::domain::{ArtifactType, PipelineArtifactId, PipelineExecutionId, PipelineStatus};
use crate::task::domain::{AxisStatus, IssueKey, SyncStatus, TaskAxis, TaskId, TaskSourceId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A state change observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A task was created from a synced issue.
    TaskCreated {
        /// New task.
        task_id: TaskId,
        /// Source the issue was synced from.
        source_id: TaskSourceId,
        /// Issue identity.
        issue_key: IssueKey,
    },
    /// Upstream fields of a task changed on re-sync.
    TaskUpdated {
        /// Updated task.
        task_id: TaskId,
    },
    /// A task status axis moved.
    AxisChanged {
        /// Affected task.
        task_id: TaskId,
        /// Affected axis.
        axis: TaskAxis,
        /// New status.
        status: AxisStatus,
    },
    /// A task source sync status moved.
    SourceSyncChanged {
        /// Affected source.
        source_id: TaskSourceId,
        /// New status.
        status: SyncStatus,
    },
    /// A pipeline execution status moved.
    PipelineStatusChanged {
        /// Affected execution.
        execution_id: PipelineExecutionId,
        /// New status.
        status: PipelineStatus,
    },
    /// An artifact row was written.
    ArtifactRecorded {
        /// Producing execution.
        execution_id: PipelineExecutionId,
        /// New artifact.
        artifact_id: PipelineArtifactId,
        /// Artifact category.
        artifact_type: ArtifactType,
    },
}

/// Destination for engine events.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Publishes an event. Must not block.
    fn publish(&self, event: EngineEvent);
}

/// Event sink fanning events out over a [`broadcast`] channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastEventSink {
    /// Creates a sink whose channel retains up to `capacity` unread events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }
}

/// Event sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardEventSink;

impl EventSink for DiscardEventSink {
    fn publish(&self, _event: EngineEvent) {}
}
