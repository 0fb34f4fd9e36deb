//! Task aggregate root.

use super::{
    AdvancedEvaluationPolicy, AxisStatus, EvaluationKind, EvaluationResult, EvaluationStatus,
    ExternalIssue, ImplementationStatus, IssueKey, PersistedStageData, ProjectId, RemoteStatus,
    StageFailure, StageState, StatusGuard, TaskAxis, TaskDomainError, TaskId, TaskSource,
    TaskSourceId, ensure_implementation_allowed,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evaluation axis together with its stored result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationAxis {
    state: StageState<EvaluationStatus>,
    result: Option<EvaluationResult>,
}

impl EvaluationAxis {
    fn not_started(at: DateTime<Utc>) -> Self {
        Self {
            state: StageState::new(EvaluationStatus::NotStarted, at),
            result: None,
        }
    }

    /// Reconstructs an axis from persisted storage.
    #[must_use]
    pub fn from_persisted(
        state: PersistedStageData<EvaluationStatus>,
        result: Option<EvaluationResult>,
    ) -> Self {
        Self {
            state: StageState::from_persisted(state),
            result,
        }
    }

    /// Returns the axis state.
    #[must_use]
    pub const fn state(&self) -> &StageState<EvaluationStatus> {
        &self.state
    }

    /// Returns the axis status.
    #[must_use]
    pub const fn status(&self) -> EvaluationStatus {
        self.state.status()
    }

    /// Returns the stored result of a completed evaluation.
    #[must_use]
    pub const fn result(&self) -> Option<&EvaluationResult> {
        self.result.as_ref()
    }
}

/// Task aggregate root.
///
/// Created exactly once per (task source, issue key) by the synchronizer and
/// never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    project_id: ProjectId,
    source_id: TaskSourceId,
    issue_key: IssueKey,
    title: String,
    description: Option<String>,
    remote_status: RemoteStatus,
    web_url: Option<String>,
    labels: Vec<String>,
    worker_repository: Option<String>,
    simple_evaluation: EvaluationAxis,
    advanced_evaluation: EvaluationAxis,
    implementation: StageState<ImplementationStatus>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Task source the task was synced from.
    pub source_id: TaskSourceId,
    /// Stable external issue key.
    pub issue_key: IssueKey,
    /// Persisted title.
    pub title: String,
    /// Persisted description.
    pub description: Option<String>,
    /// Persisted upstream open/closed state.
    pub remote_status: RemoteStatus,
    /// Persisted issue URL.
    pub web_url: Option<String>,
    /// Persisted issue labels.
    pub labels: Vec<String>,
    /// Repository implementation sessions push to.
    pub worker_repository: Option<String>,
    /// Persisted simple evaluation axis.
    pub simple_evaluation: EvaluationAxis,
    /// Persisted advanced evaluation axis.
    pub advanced_evaluation: EvaluationAxis,
    /// Persisted implementation axis.
    pub implementation: PersistedStageData<ImplementationStatus>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task from an issue fetched for `source`, with every axis
    /// at its initial state.
    #[must_use]
    pub fn new_from_issue(source: &TaskSource, issue: &ExternalIssue, at: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            project_id: source.project_id(),
            source_id: source.id(),
            issue_key: issue.key(),
            title: issue.title().to_owned(),
            description: issue.description().map(str::to_owned),
            remote_status: issue.remote_status(),
            web_url: issue.web_url().map(str::to_owned),
            labels: issue.labels().to_vec(),
            worker_repository: source.config().worker_repository(),
            simple_evaluation: EvaluationAxis::not_started(at),
            advanced_evaluation: EvaluationAxis::not_started(at),
            implementation: StageState::new(ImplementationStatus::NotStarted, at),
            created_at: at,
            updated_at: at,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            project_id: data.project_id,
            source_id: data.source_id,
            issue_key: data.issue_key,
            title: data.title,
            description: data.description,
            remote_status: data.remote_status,
            web_url: data.web_url,
            labels: data.labels,
            worker_repository: data.worker_repository,
            simple_evaluation: data.simple_evaluation,
            advanced_evaluation: data.advanced_evaluation,
            implementation: StageState::from_persisted(data.implementation),
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the task source the task was synced from.
    #[must_use]
    pub const fn source_id(&self) -> TaskSourceId {
        self.source_id
    }

    /// Returns the stable external issue key.
    #[must_use]
    pub const fn issue_key(&self) -> &IssueKey {
        &self.issue_key
    }

    /// Returns the task title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the task description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the upstream open/closed state.
    #[must_use]
    pub const fn remote_status(&self) -> RemoteStatus {
        self.remote_status
    }

    /// Returns the issue URL, if known.
    #[must_use]
    pub fn web_url(&self) -> Option<&str> {
        self.web_url.as_deref()
    }

    /// Returns the issue labels as last synced.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the repository implementation sessions push to.
    #[must_use]
    pub fn worker_repository(&self) -> Option<&str> {
        self.worker_repository.as_deref()
    }

    /// Returns the simple evaluation axis.
    #[must_use]
    pub const fn simple_evaluation(&self) -> &EvaluationAxis {
        &self.simple_evaluation
    }

    /// Returns the advanced evaluation axis.
    #[must_use]
    pub const fn advanced_evaluation(&self) -> &EvaluationAxis {
        &self.advanced_evaluation
    }

    /// Returns the evaluation axis for `kind`.
    #[must_use]
    pub const fn evaluation(&self, kind: EvaluationKind) -> &EvaluationAxis {
        match kind {
            EvaluationKind::Simple => &self.simple_evaluation,
            EvaluationKind::Advanced => &self.advanced_evaluation,
        }
    }

    /// Returns the implementation axis.
    #[must_use]
    pub const fn implementation(&self) -> &StageState<ImplementationStatus> {
        &self.implementation
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the status of `axis`.
    #[must_use]
    pub const fn axis_status(&self, axis: TaskAxis) -> AxisStatus {
        match axis {
            TaskAxis::SimpleEvaluation => AxisStatus::Evaluation(self.simple_evaluation.status()),
            TaskAxis::AdvancedEvaluation => {
                AxisStatus::Evaluation(self.advanced_evaluation.status())
            }
            TaskAxis::Implementation => AxisStatus::Implementation(self.implementation.status()),
        }
    }

    /// Returns the last status change of `axis`.
    #[must_use]
    pub const fn axis_changed_at(&self, axis: TaskAxis) -> DateTime<Utc> {
        match axis {
            TaskAxis::SimpleEvaluation => self.simple_evaluation.state.changed_at(),
            TaskAxis::AdvancedEvaluation => self.advanced_evaluation.state.changed_at(),
            TaskAxis::Implementation => self.implementation.changed_at(),
        }
    }

    /// Returns the sweeper requeue counter of `axis`.
    #[must_use]
    pub const fn axis_requeue_count(&self, axis: TaskAxis) -> u32 {
        match axis {
            TaskAxis::SimpleEvaluation => self.simple_evaluation.state.requeue_count(),
            TaskAxis::AdvancedEvaluation => self.advanced_evaluation.state.requeue_count(),
            TaskAxis::Implementation => self.implementation.requeue_count(),
        }
    }

    /// Returns the retained failure of `axis`.
    #[must_use]
    pub const fn axis_failure(&self, axis: TaskAxis) -> Option<&StageFailure> {
        match axis {
            TaskAxis::SimpleEvaluation => self.simple_evaluation.state.failure(),
            TaskAxis::AdvancedEvaluation => self.advanced_evaluation.state.failure(),
            TaskAxis::Implementation => self.implementation.failure(),
        }
    }

    /// Captures the current state of `axis` for a conditional write.
    #[must_use]
    pub const fn status_guard(&self, axis: TaskAxis) -> StatusGuard {
        StatusGuard {
            axis,
            status: self.axis_status(axis),
            changed_at: self.axis_changed_at(axis),
        }
    }

    /// Returns `true` when `guard` still describes this task.
    #[must_use]
    pub fn matches_guard(&self, guard: &StatusGuard) -> bool {
        self.axis_status(guard.axis) == guard.status
            && self.axis_changed_at(guard.axis) == guard.changed_at
    }

    /// Applies upstream changes from a re-synced issue.
    ///
    /// Returns `true` when any mirrored issue field changed.
    pub fn apply_remote_changes(&mut self, issue: &ExternalIssue, at: DateTime<Utc>) -> bool {
        let description = issue.description().map(str::to_owned);
        let web_url = issue.web_url().map(str::to_owned);
        let changed = self.title != issue.title()
            || self.description != description
            || self.remote_status != issue.remote_status()
            || self.web_url != web_url
            || self.labels != issue.labels();
        if changed {
            issue.title().clone_into(&mut self.title);
            self.description = description;
            self.remote_status = issue.remote_status();
            self.web_url = web_url;
            issue.labels().clone_into(&mut self.labels);
            self.touch(at);
        }
        changed
    }

    /// Queues an evaluation pass.
    ///
    /// Returns `Ok(false)` without changes when the pass is already queued or
    /// running, so repeated requests are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::AlreadyCompleted`] for a completed pass and
    /// [`TaskDomainError::Blocked`] when an advanced pass is requested before
    /// the simple verdict is `ready`.
    pub fn queue_evaluation(
        &mut self,
        kind: EvaluationKind,
        at: DateTime<Utc>,
    ) -> Result<bool, TaskDomainError> {
        if kind == EvaluationKind::Advanced {
            super::ensure_advanced_allowed(self)?;
        }
        let task_id = self.id;
        let axis = self.evaluation_axis_mut(kind);
        match axis.status() {
            EvaluationStatus::Queued | EvaluationStatus::Running => return Ok(false),
            EvaluationStatus::Completed => {
                return Err(TaskDomainError::AlreadyCompleted {
                    task_id,
                    axis: kind.axis(),
                });
            }
            EvaluationStatus::NotStarted | EvaluationStatus::Failed => {}
        }
        transition_axis(task_id, kind.axis(), &mut axis.state, EvaluationStatus::Queued, at)?;
        axis.state.reset_bookkeeping();
        axis.result = None;
        self.touch(at);
        Ok(true)
    }

    /// Marks a queued evaluation as picked up by a worker.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the pass
    /// is queued.
    pub fn start_evaluation(
        &mut self,
        kind: EvaluationKind,
        at: DateTime<Utc>,
    ) -> Result<(), TaskDomainError> {
        let task_id = self.id;
        let axis = self.evaluation_axis_mut(kind);
        transition_axis(task_id, kind.axis(), &mut axis.state, EvaluationStatus::Running, at)?;
        self.touch(at);
        Ok(())
    }

    /// Stores the verdict of a running evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the pass
    /// is running.
    pub fn complete_evaluation(
        &mut self,
        kind: EvaluationKind,
        result: EvaluationResult,
        at: DateTime<Utc>,
    ) -> Result<(), TaskDomainError> {
        let task_id = self.id;
        let axis = self.evaluation_axis_mut(kind);
        transition_axis(
            task_id,
            kind.axis(),
            &mut axis.state,
            EvaluationStatus::Completed,
            at,
        )?;
        axis.result = Some(result);
        self.touch(at);
        Ok(())
    }

    /// Queues implementation after checking the cross-axis guard.
    ///
    /// Returns `Ok(false)` when implementation is already queued or running.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::Blocked`] when the evaluation verdicts do
    /// not permit implementation, and [`TaskDomainError::AlreadyCompleted`]
    /// for a completed implementation.
    pub fn queue_implementation(
        &mut self,
        policy: AdvancedEvaluationPolicy,
        at: DateTime<Utc>,
    ) -> Result<bool, TaskDomainError> {
        match self.implementation.status() {
            ImplementationStatus::Queued | ImplementationStatus::Implementing => return Ok(false),
            ImplementationStatus::Completed => {
                return Err(TaskDomainError::AlreadyCompleted {
                    task_id: self.id,
                    axis: TaskAxis::Implementation,
                });
            }
            ImplementationStatus::NotStarted | ImplementationStatus::Failed => {}
        }
        ensure_implementation_allowed(self, policy)?;
        transition_axis(
            self.id,
            TaskAxis::Implementation,
            &mut self.implementation,
            ImplementationStatus::Queued,
            at,
        )?;
        self.implementation.reset_bookkeeping();
        self.touch(at);
        Ok(true)
    }

    /// Marks queued implementation as picked up by a worker.
    ///
    /// The cross-axis guard is re-checked so a verdict that changed after
    /// queueing still blocks the work.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::Blocked`] or
    /// [`TaskDomainError::InvalidStateTransition`].
    pub fn start_implementation(
        &mut self,
        policy: AdvancedEvaluationPolicy,
        at: DateTime<Utc>,
    ) -> Result<(), TaskDomainError> {
        ensure_implementation_allowed(self, policy)?;
        transition_axis(
            self.id,
            TaskAxis::Implementation,
            &mut self.implementation,
            ImplementationStatus::Implementing,
            at,
        )?;
        self.touch(at);
        Ok(())
    }

    /// Marks a running implementation as completed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the axis is
    /// implementing.
    pub fn complete_implementation(&mut self, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        transition_axis(
            self.id,
            TaskAxis::Implementation,
            &mut self.implementation,
            ImplementationStatus::Completed,
            at,
        )?;
        self.touch(at);
        Ok(())
    }

    /// Fails a queued or running axis and retains the failure.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the axis is
    /// not queued or running.
    pub fn fail_axis(
        &mut self,
        axis: TaskAxis,
        failure: StageFailure,
        at: DateTime<Utc>,
    ) -> Result<(), TaskDomainError> {
        let task_id = self.id;
        match axis {
            TaskAxis::SimpleEvaluation | TaskAxis::AdvancedEvaluation => {
                let kind = if axis == TaskAxis::SimpleEvaluation {
                    EvaluationKind::Simple
                } else {
                    EvaluationKind::Advanced
                };
                let state = &mut self.evaluation_axis_mut(kind).state;
                transition_axis(task_id, axis, state, EvaluationStatus::Failed, at)?;
                state.set_failure(failure);
            }
            TaskAxis::Implementation => {
                transition_axis(
                    task_id,
                    axis,
                    &mut self.implementation,
                    ImplementationStatus::Failed,
                    at,
                )?;
                self.implementation.set_failure(failure);
            }
        }
        self.touch(at);
        Ok(())
    }

    /// Re-stamps a queued axis so workers pick it up again.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the axis is
    /// not queued.
    pub fn requeue_axis(&mut self, axis: TaskAxis, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        let status = self.axis_status(axis);
        if !status.is_queued() {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                axis,
                from: status.as_str(),
                to: status.as_str(),
            });
        }
        match axis {
            TaskAxis::SimpleEvaluation => self.simple_evaluation.state.bump_requeue(at),
            TaskAxis::AdvancedEvaluation => self.advanced_evaluation.state.bump_requeue(at),
            TaskAxis::Implementation => self.implementation.bump_requeue(at),
        }
        self.touch(at);
        Ok(())
    }

    /// Copies one axis from `other`, leaving the remaining axes untouched.
    pub(crate) fn adopt_axis(&mut self, other: &Self, axis: TaskAxis) {
        match axis {
            TaskAxis::SimpleEvaluation => {
                self.simple_evaluation.clone_from(&other.simple_evaluation);
            }
            TaskAxis::AdvancedEvaluation => {
                self.advanced_evaluation.clone_from(&other.advanced_evaluation);
            }
            TaskAxis::Implementation => self.implementation.clone_from(&other.implementation),
        }
        self.updated_at = self.updated_at.max(other.updated_at);
    }

    /// Copies the upstream-mirrored fields from `other`.
    pub(crate) fn adopt_remote_fields(&mut self, other: &Self) {
        self.title.clone_from(&other.title);
        self.description.clone_from(&other.description);
        self.remote_status = other.remote_status;
        self.web_url.clone_from(&other.web_url);
        self.labels.clone_from(&other.labels);
        self.updated_at = self.updated_at.max(other.updated_at);
    }

    const fn evaluation_axis_mut(&mut self, kind: EvaluationKind) -> &mut EvaluationAxis {
        match kind {
            EvaluationKind::Simple => &mut self.simple_evaluation,
            EvaluationKind::Advanced => &mut self.advanced_evaluation,
        }
    }

    const fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

fn transition_axis<S: super::StageStatus>(
    task_id: TaskId,
    axis: TaskAxis,
    state: &mut StageState<S>,
    next: S,
    at: DateTime<Utc>,
) -> Result<(), TaskDomainError> {
    state
        .transition(next, at)
        .map_err(|(from, to)| TaskDomainError::InvalidStateTransition {
            task_id,
            axis,
            from,
            to,
        })
}
