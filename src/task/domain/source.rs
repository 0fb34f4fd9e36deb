//! Task source aggregate and per-tracker configuration variants.

use super::{
    PersistedStageData, ProjectId, StageState, SyncStatus, TaskDomainError, TaskSourceId,
};
use crate::provider::SecretId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracker-specific configuration of a task source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueSourceConfig {
    /// GitLab project issues.
    #[serde(rename = "gitlab")]
    GitLab {
        /// GitLab host, e.g. `https://gitlab.com`.
        host: String,
        /// Project path, e.g. `group/project`.
        project_path: String,
        /// Secret holding the access token.
        token_secret: SecretId,
    },
    /// GitHub repository issues.
    #[serde(rename = "github")]
    GitHub {
        /// GitHub API host.
        host: String,
        /// Repository owner.
        owner: String,
        /// Repository name.
        repository: String,
        /// Secret holding the access token.
        token_secret: SecretId,
    },
    /// Jira project tickets.
    Jira {
        /// Jira site host.
        host: String,
        /// Project key, e.g. `PROJ`.
        project_key: String,
        /// Account email used with the API token.
        email: String,
        /// Secret holding the API token.
        token_secret: SecretId,
        /// Repository implementation sessions push to.
        worker_repository: Option<String>,
    },
    /// Tasks entered by hand; never fetched.
    Manual {
        /// Repository implementation sessions push to.
        worker_repository: Option<String>,
    },
}

impl IssueSourceConfig {
    /// Returns the tracker name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::GitLab { .. } => "gitlab",
            Self::GitHub { .. } => "github",
            Self::Jira { .. } => "jira",
            Self::Manual { .. } => "manual",
        }
    }

    /// Returns `true` when the source has a remote tracker to pull from.
    #[must_use]
    pub const fn is_fetchable(&self) -> bool {
        !matches!(self, Self::Manual { .. })
    }

    /// Returns the secret holding the tracker credential, if any.
    #[must_use]
    pub const fn token_secret(&self) -> Option<&SecretId> {
        match self {
            Self::GitLab { token_secret, .. }
            | Self::GitHub { token_secret, .. }
            | Self::Jira { token_secret, .. } => Some(token_secret),
            Self::Manual { .. } => None,
        }
    }

    /// Returns the repository implementation sessions push to.
    ///
    /// Code-hosting trackers push to the repository the issues live in.
    #[must_use]
    pub fn worker_repository(&self) -> Option<String> {
        match self {
            Self::GitLab { project_path, .. } => Some(project_path.clone()),
            Self::GitHub {
                owner, repository, ..
            } => Some(format!("{owner}/{repository}")),
            Self::Jira {
                worker_repository, ..
            }
            | Self::Manual { worker_repository } => worker_repository.clone(),
        }
    }
}

/// Snapshot of a source's sync axis used for conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncGuard {
    /// Status observed when the source was read.
    pub status: SyncStatus,
    /// Status timestamp observed when the source was read.
    pub changed_at: DateTime<Utc>,
}

/// Configured external issue-tracker integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSource {
    id: TaskSourceId,
    project_id: ProjectId,
    name: String,
    config: IssueSourceConfig,
    sync: StageState<SyncStatus>,
    last_error: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskSourceData {
    /// Persisted identifier.
    pub id: TaskSourceId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Display name.
    pub name: String,
    /// Tracker configuration.
    pub config: IssueSourceConfig,
    /// Persisted sync axis.
    pub sync: PersistedStageData<SyncStatus>,
    /// Error from the last failed sync.
    pub last_error: Option<String>,
    /// When the last sync finished.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TaskSource {
    /// Creates a never-synced source.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptySourceName`] for a blank name.
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        config: IssueSourceConfig,
        at: DateTime<Utc>,
    ) -> Result<Self, TaskDomainError> {
        let raw = name.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptySourceName);
        }
        Ok(Self {
            id: TaskSourceId::new(),
            project_id,
            name: trimmed.to_owned(),
            config,
            sync: StageState::new(SyncStatus::Pending, at),
            last_error: None,
            last_synced_at: None,
            created_at: at,
            updated_at: at,
        })
    }

    /// Reconstructs a source from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskSourceData) -> Self {
        Self {
            id: data.id,
            project_id: data.project_id,
            name: data.name,
            config: data.config,
            sync: StageState::from_persisted(data.sync),
            last_error: data.last_error,
            last_synced_at: data.last_synced_at,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the source identifier.
    #[must_use]
    pub const fn id(&self) -> TaskSourceId {
        self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tracker configuration.
    #[must_use]
    pub const fn config(&self) -> &IssueSourceConfig {
        &self.config
    }

    /// Returns the sync axis.
    #[must_use]
    pub const fn sync(&self) -> &StageState<SyncStatus> {
        &self.sync
    }

    /// Returns the current sync status.
    #[must_use]
    pub const fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    /// Returns the error from the last failed sync.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns when the last sync finished.
    #[must_use]
    pub const fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
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

    /// Captures the sync axis for a conditional write.
    #[must_use]
    pub const fn sync_guard(&self) -> SyncGuard {
        SyncGuard {
            status: self.sync.status(),
            changed_at: self.sync.changed_at(),
        }
    }

    /// Returns `true` when `guard` still describes this source.
    #[must_use]
    pub fn matches_guard(&self, guard: &SyncGuard) -> bool {
        self.sync.status() == guard.status && self.sync.changed_at() == guard.changed_at
    }

    /// Queues a sync request.
    ///
    /// Returns `false` without changes when a sync is already queued or
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidSyncTransition`] if the state
    /// machine rejects the move.
    pub fn request_sync(&mut self, at: DateTime<Utc>) -> Result<bool, TaskDomainError> {
        if matches!(self.sync.status(), SyncStatus::Queued | SyncStatus::Syncing) {
            return Ok(false);
        }
        self.transition(SyncStatus::Queued, at)?;
        self.sync.reset_bookkeeping();
        Ok(true)
    }

    /// Marks the source as being synced by a worker.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidSyncTransition`] when a sync is
    /// already running.
    pub fn begin_sync(&mut self, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        self.transition(SyncStatus::Syncing, at)
    }

    /// Marks a running sync as finished and stamps `last_synced_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidSyncTransition`] unless syncing.
    pub fn complete_sync(&mut self, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        self.transition(SyncStatus::Completed, at)?;
        self.last_error = None;
        self.last_synced_at = Some(at);
        Ok(())
    }

    /// Marks a running sync as failed, retaining the fetch error.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidSyncTransition`] unless syncing.
    pub fn fail_sync(
        &mut self,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TaskDomainError> {
        self.transition(SyncStatus::Failed, at)?;
        self.last_error = Some(message.into());
        self.last_synced_at = Some(at);
        Ok(())
    }

    /// Moves a stalled sync back to `queued` and bumps the requeue counter.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidSyncTransition`] unless syncing.
    pub fn requeue_stuck(&mut self, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        self.transition(SyncStatus::Queued, at)?;
        self.sync.bump_requeue(at);
        Ok(())
    }

    fn transition(&mut self, next: SyncStatus, at: DateTime<Utc>) -> Result<(), TaskDomainError> {
        let source_id = self.id;
        self.sync
            .transition(next, at)
            .map_err(|(from, to)| TaskDomainError::InvalidSyncTransition {
                source_id,
                from,
                to,
            })?;
        self.updated_at = at;
        Ok(())
    }
}

