//! AI work sessions.

use super::{ChangeSet, ImplementationDomainError};
use crate::identifier::uuid_identifier;
use crate::provider::domain::TokenUsage;
use crate::task::domain::{ParseStatusError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

uuid_identifier!(
    /// Unique identifier for an AI work session.
    SessionId
);

/// What the session worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// A simple or advanced evaluation pass.
    Evaluation,
    /// Change-set generation.
    Implementation,
}

impl SessionKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evaluation => "evaluation",
            Self::Implementation => "implementation",
        }
    }
}

impl TryFrom<&str> for SessionKind {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "evaluation" => Ok(Self::Evaluation),
            "implementation" => Ok(Self::Implementation),
            _ => Err(ParseStatusError::new("session kind", value)),
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The completion call is in progress.
    Running,
    /// The session produced its output.
    Completed,
    /// The session ended with an error.
    Failed,
}

impl SessionStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for SessionStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError::new("session status", value)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One AI-driven attempt at a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    task_id: Option<TaskId>,
    kind: SessionKind,
    runner: String,
    status: SessionStatus,
    usage: TokenUsage,
    prompt_digest: String,
    change_set: Option<ChangeSet>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    handed_off_at: Option<DateTime<Utc>>,
    launched_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSessionData {
    /// Session identifier.
    pub id: SessionId,
    /// Linked task.
    pub task_id: Option<TaskId>,
    /// Session kind.
    pub kind: SessionKind,
    /// Runner that executed the session.
    pub runner: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Tokens consumed.
    pub usage: TokenUsage,
    /// SHA-256 of the rendered prompt.
    pub prompt_digest: String,
    /// Produced change set.
    pub change_set: Option<ChangeSet>,
    /// Failure text.
    pub error: Option<String>,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// End timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// When the pipeline monitor claimed the session.
    pub handed_off_at: Option<DateTime<Utc>>,
    /// When the claimed launch stored its pipeline execution.
    pub launched_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Starts a running session for `prompt`.
    ///
    /// Only a digest of the prompt is retained.
    ///
    /// # Errors
    ///
    /// Returns [`ImplementationDomainError::EmptyRunner`] for a blank runner.
    pub fn start(
        task_id: Option<TaskId>,
        kind: SessionKind,
        runner: impl Into<String>,
        prompt: &str,
        at: DateTime<Utc>,
    ) -> Result<Self, ImplementationDomainError> {
        let runner_name = runner.into();
        if runner_name.trim().is_empty() {
            return Err(ImplementationDomainError::EmptyRunner);
        }
        Ok(Self {
            id: SessionId::new(),
            task_id,
            kind,
            runner: runner_name,
            status: SessionStatus::Running,
            usage: TokenUsage::default(),
            prompt_digest: format!("{:x}", Sha256::digest(prompt.as_bytes())),
            change_set: None,
            error: None,
            started_at: at,
            finished_at: None,
            handed_off_at: None,
            launched_at: None,
        })
    }

    /// Reconstructs a session from storage.
    #[must_use]
    pub fn from_persisted(data: PersistedSessionData) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            kind: data.kind,
            runner: data.runner,
            status: data.status,
            usage: data.usage,
            prompt_digest: data.prompt_digest,
            change_set: data.change_set,
            error: data.error,
            started_at: data.started_at,
            finished_at: data.finished_at,
            handed_off_at: data.handed_off_at,
            launched_at: data.launched_at,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the linked task.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Returns the session kind.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Returns the runner name.
    #[must_use]
    pub fn runner(&self) -> &str {
        &self.runner
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns tokens consumed.
    #[must_use]
    pub const fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Returns the prompt digest.
    #[must_use]
    pub fn prompt_digest(&self) -> &str {
        &self.prompt_digest
    }

    /// Returns the produced change set.
    #[must_use]
    pub const fn change_set(&self) -> Option<&ChangeSet> {
        self.change_set.as_ref()
    }

    /// Returns the failure text.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the end timestamp.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns when the pipeline monitor claimed the session.
    #[must_use]
    pub const fn handed_off_at(&self) -> Option<DateTime<Utc>> {
        self.handed_off_at
    }

    /// Returns when the claimed launch stored its pipeline execution.
    #[must_use]
    pub const fn launched_at(&self) -> Option<DateTime<Utc>> {
        self.launched_at
    }

    /// Returns `true` for a completed implementation not yet claimed by the
    /// pipeline monitor.
    #[must_use]
    pub const fn is_awaiting_pipeline(&self) -> bool {
        self.has_buildable_change_set() && self.handed_off_at.is_none()
    }

    /// Returns `true` when a monitor claimed the session before
    /// `stale_before` but never recorded a stored execution, so the claim
    /// may be taken over.
    #[must_use]
    pub fn is_orphaned_handoff(&self, stale_before: DateTime<Utc>) -> bool {
        self.has_buildable_change_set()
            && self.launched_at.is_none()
            && self.handed_off_at.is_some_and(|at| at < stale_before)
    }

    const fn has_buildable_change_set(&self) -> bool {
        matches!(self.kind, SessionKind::Implementation)
            && matches!(self.status, SessionStatus::Completed)
            && self.change_set.is_some()
    }

    /// Completes a running session.
    ///
    /// # Errors
    ///
    /// Returns [`ImplementationDomainError::SessionFinished`] unless running.
    pub fn complete(
        &mut self,
        usage: TokenUsage,
        change_set: Option<ChangeSet>,
        at: DateTime<Utc>,
    ) -> Result<(), ImplementationDomainError> {
        self.ensure_running()?;
        self.status = SessionStatus::Completed;
        self.usage = usage;
        self.change_set = change_set;
        self.finished_at = Some(at);
        Ok(())
    }

    /// Fails a running session, retaining the error text.
    ///
    /// # Errors
    ///
    /// Returns [`ImplementationDomainError::SessionFinished`] unless running.
    pub fn fail(
        &mut self,
        usage: TokenUsage,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), ImplementationDomainError> {
        self.ensure_running()?;
        self.status = SessionStatus::Failed;
        self.usage = usage;
        self.error = Some(error.into());
        self.finished_at = Some(at);
        Ok(())
    }

    /// Stamps the pipeline hand-off.
    pub const fn mark_handed_off(&mut self, at: DateTime<Utc>) {
        self.handed_off_at = Some(at);
    }

    /// Stamps the stored launch of the claimed pipeline.
    pub const fn mark_launched(&mut self, at: DateTime<Utc>) {
        self.launched_at = Some(at);
    }

    const fn ensure_running(&self) -> Result<(), ImplementationDomainError> {
        if matches!(self.status, SessionStatus::Running) {
            Ok(())
        } else {
            Err(ImplementationDomainError::SessionFinished {
                session_id: self.id,
                status: self.status.as_str(),
            })
        }
    }
}
