//! CI runs tied to implementation sessions.

use super::{ArtifactType, PipelineDomainError};
use crate::identifier::uuid_identifier;
use crate::implementation::domain::SessionId;
use crate::task::domain::{ParseStatusError, TaskId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

uuid_identifier!(
    /// Unique identifier for a pipeline execution.
    PipelineExecutionId
);

/// Lifecycle of a CI run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Accepted by CI but not started.
    Pending,
    /// Executing.
    Running,
    /// Finished successfully.
    Success,
    /// Finished unsuccessfully, timed out, or never started.
    Failed,
    /// Stopped before finishing.
    Canceled,
}

impl PipelineStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns `true` once no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    /// Returns `true` when `next` is a lifecycle edge from `self`.
    ///
    /// A poll may observe a run that already finished, so `pending` can
    /// move straight to a terminal status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => !matches!(next, Self::Pending),
            Self::Running => next.is_terminal(),
            Self::Success | Self::Failed | Self::Canceled => false,
        }
    }
}

impl TryFrom<&str> for PipelineStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(ParseStatusError::new("pipeline status", value)),
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a run in the CI system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    /// Wraps a CI run reference.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyField`] for a blank handle.
    pub fn new(value: impl Into<String>) -> Result<Self, PipelineDomainError> {
        let handle = value.into();
        if handle.trim().is_empty() {
            return Err(PipelineDomainError::EmptyField("handle"));
        }
        Ok(Self(handle))
    }

    /// Returns the handle text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Artifact reported by the CI system in addition to the well-known outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedArtifact {
    /// Artifact category.
    pub artifact_type: ArtifactType,
    /// Stable reference.
    pub reference_url: String,
    /// Free-form details.
    #[serde(default)]
    pub metadata: Value,
}

/// Latest outputs a CI run has reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOutputs {
    /// Merge or pull request opened by the run.
    pub merge_request_url: Option<String>,
    /// Branch the run pushed.
    pub branch: Option<String>,
    /// Commit the run produced.
    pub commit: Option<String>,
    /// Web page of the run.
    pub pipeline_url: Option<String>,
    /// Execution summary text.
    pub execution_result: Option<String>,
    /// Further artifacts.
    pub artifacts: Vec<ReportedArtifact>,
}

impl PipelineOutputs {
    /// Overlays the fields `newer` reports onto `self`.
    fn merge(&mut self, newer: Self) {
        let Self {
            merge_request_url,
            branch,
            commit,
            pipeline_url,
            execution_result,
            artifacts,
        } = newer;
        if merge_request_url.is_some() {
            self.merge_request_url = merge_request_url;
        }
        if branch.is_some() {
            self.branch = branch;
        }
        if commit.is_some() {
            self.commit = commit;
        }
        if pipeline_url.is_some() {
            self.pipeline_url = pipeline_url;
        }
        if execution_result.is_some() {
            self.execution_result = execution_result;
        }
        if !artifacts.is_empty() {
            self.artifacts = artifacts;
        }
    }
}

/// Status values read from an execution, used for conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionGuard {
    /// Status read.
    pub status: PipelineStatus,
    /// Last status update read.
    pub last_status_update: DateTime<Utc>,
}

/// One CI run for an implementation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineExecution {
    id: PipelineExecutionId,
    session_id: SessionId,
    task_id: Option<TaskId>,
    worker_repository: String,
    git_ref: String,
    handle: Option<ExecutionHandle>,
    status: PipelineStatus,
    started_at: DateTime<Utc>,
    last_status_update: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    outputs: PipelineOutputs,
    artifacts_recorded_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedExecutionData {
    /// Execution identifier.
    pub id: PipelineExecutionId,
    /// Implementation session.
    pub session_id: SessionId,
    /// Task of the session.
    pub task_id: Option<TaskId>,
    /// Repository the run builds.
    pub worker_repository: String,
    /// Branch or ref the run builds.
    pub git_ref: String,
    /// CI reference; absent when the run never started.
    pub handle: Option<ExecutionHandle>,
    /// Lifecycle status.
    pub status: PipelineStatus,
    /// Launch timestamp.
    pub started_at: DateTime<Utc>,
    /// Last poll timestamp.
    pub last_status_update: DateTime<Utc>,
    /// Terminal timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure text.
    pub failure_reason: Option<String>,
    /// Latest outputs.
    pub outputs: PipelineOutputs,
    /// When artifacts were recorded.
    pub artifacts_recorded_at: Option<DateTime<Utc>>,
}

fn require(field: &'static str, value: String) -> Result<String, PipelineDomainError> {
    if value.trim().is_empty() {
        Err(PipelineDomainError::EmptyField(field))
    } else {
        Ok(value)
    }
}

impl PipelineExecution {
    /// Creates a pending execution for a run CI accepted.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyField`] for a blank repository or
    /// ref.
    pub fn start(
        session_id: SessionId,
        task_id: Option<TaskId>,
        worker_repository: impl Into<String>,
        git_ref: impl Into<String>,
        handle: ExecutionHandle,
        pipeline_url: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Self, PipelineDomainError> {
        Ok(Self {
            id: PipelineExecutionId::new(),
            session_id,
            task_id,
            worker_repository: require("worker_repository", worker_repository.into())?,
            git_ref: require("git_ref", git_ref.into())?,
            handle: Some(handle),
            status: PipelineStatus::Pending,
            started_at: at,
            last_status_update: at,
            finished_at: None,
            failure_reason: None,
            outputs: PipelineOutputs {
                pipeline_url,
                ..PipelineOutputs::default()
            },
            artifacts_recorded_at: None,
        })
    }

    /// Creates a failed execution for a run CI refused to start.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyField`] for a blank repository or
    /// ref.
    pub fn failed_to_start(
        session_id: SessionId,
        task_id: Option<TaskId>,
        worker_repository: impl Into<String>,
        git_ref: impl Into<String>,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Self, PipelineDomainError> {
        Ok(Self {
            id: PipelineExecutionId::new(),
            session_id,
            task_id,
            worker_repository: require("worker_repository", worker_repository.into())?,
            git_ref: require("git_ref", git_ref.into())?,
            handle: None,
            status: PipelineStatus::Failed,
            started_at: at,
            last_status_update: at,
            finished_at: Some(at),
            failure_reason: Some(reason.into()),
            outputs: PipelineOutputs::default(),
            artifacts_recorded_at: None,
        })
    }

    /// Reconstructs an execution from storage.
    #[must_use]
    pub fn from_persisted(data: PersistedExecutionData) -> Self {
        Self {
            id: data.id,
            session_id: data.session_id,
            task_id: data.task_id,
            worker_repository: data.worker_repository,
            git_ref: data.git_ref,
            handle: data.handle,
            status: data.status,
            started_at: data.started_at,
            last_status_update: data.last_status_update,
            finished_at: data.finished_at,
            failure_reason: data.failure_reason,
            outputs: data.outputs,
            artifacts_recorded_at: data.artifacts_recorded_at,
        }
    }

    /// Returns the execution identifier.
    #[must_use]
    pub const fn id(&self) -> PipelineExecutionId {
        self.id
    }

    /// Returns the implementation session.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the task of the session.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Returns the repository the run builds.
    #[must_use]
    pub fn worker_repository(&self) -> &str {
        &self.worker_repository
    }

    /// Returns the ref the run builds.
    #[must_use]
    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    /// Returns the CI reference.
    #[must_use]
    pub const fn handle(&self) -> Option<&ExecutionHandle> {
        self.handle.as_ref()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> PipelineStatus {
        self.status
    }

    /// Returns the launch timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the last poll timestamp.
    #[must_use]
    pub const fn last_status_update(&self) -> DateTime<Utc> {
        self.last_status_update
    }

    /// Returns the terminal timestamp.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the failure text.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the latest outputs.
    #[must_use]
    pub const fn outputs(&self) -> &PipelineOutputs {
        &self.outputs
    }

    /// Returns when artifacts were recorded.
    #[must_use]
    pub const fn artifacts_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.artifacts_recorded_at
    }

    /// Captures the values a conditional write must still observe.
    #[must_use]
    pub const fn guard(&self) -> ExecutionGuard {
        ExecutionGuard {
            status: self.status,
            last_status_update: self.last_status_update,
        }
    }

    /// Returns `true` when the execution still holds the guarded values.
    #[must_use]
    pub fn matches_guard(&self, guard: &ExecutionGuard) -> bool {
        self.status == guard.status && self.last_status_update == guard.last_status_update
    }

    /// Returns `true` when a non-terminal run has been active for at least
    /// `timeout`.
    #[must_use]
    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        !self.status.is_terminal() && now - self.started_at >= timeout
    }

    /// Stamps a poll without changing status.
    pub const fn stamp(&mut self, at: DateTime<Utc>) {
        self.last_status_update = at;
    }

    /// Applies a polled status and outputs, stamping the poll.
    ///
    /// `detail` becomes the failure reason when the run failed or was
    /// canceled. Returns `true` when the status changed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidTransition`] for a change that
    /// is not a lifecycle edge, including any change after a terminal
    /// status.
    pub fn observe(
        &mut self,
        status: PipelineStatus,
        outputs: PipelineOutputs,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<bool, PipelineDomainError> {
        let changed = status != self.status;
        if changed && !self.status.can_transition_to(status) {
            return Err(PipelineDomainError::InvalidTransition {
                execution_id: self.id,
                from: self.status,
                to: status,
            });
        }
        self.outputs.merge(outputs);
        self.last_status_update = at;
        if changed {
            self.status = status;
            if status.is_terminal() {
                self.finished_at = Some(at);
            }
            if matches!(status, PipelineStatus::Failed | PipelineStatus::Canceled) {
                self.failure_reason = detail;
            }
        }
        Ok(changed)
    }

    /// Fails a non-terminal execution with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidTransition`] when the execution
    /// already finished.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineDomainError> {
        if self.status.is_terminal() {
            return Err(PipelineDomainError::InvalidTransition {
                execution_id: self.id,
                from: self.status,
                to: PipelineStatus::Failed,
            });
        }
        self.status = PipelineStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.last_status_update = at;
        self.finished_at = Some(at);
        Ok(())
    }

    /// Fails a run that exceeded its wall-clock `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidTransition`] when the execution
    /// already finished.
    pub fn time_out(
        &mut self,
        timeout: Duration,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineDomainError> {
        let reason = format!(
            "timeout: no terminal status within {} minutes",
            timeout.num_minutes()
        );
        self.fail(reason, at)
    }

    /// Stamps artifact recording on a successful execution.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::NotRecordable`] unless the execution
    /// succeeded.
    pub fn mark_artifacts_recorded(&mut self, at: DateTime<Utc>) -> Result<(), PipelineDomainError> {
        self.ensure_recordable()?;
        self.artifacts_recorded_at = Some(at);
        Ok(())
    }

    /// Checks that artifacts may be recorded for this execution.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::NotRecordable`] unless the execution
    /// succeeded.
    pub const fn ensure_recordable(&self) -> Result<(), PipelineDomainError> {
        if matches!(self.status, PipelineStatus::Success) {
            Ok(())
        } else {
            Err(PipelineDomainError::NotRecordable {
                execution_id: self.id,
                status: self.status,
            })
        }
    }
}
