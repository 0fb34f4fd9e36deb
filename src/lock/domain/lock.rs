//! Processing lock rows and acquisition outcomes.

use super::LockDomainError;
use crate::task::domain::{IssueKey, ProjectId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a worker process competing for locks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Creates a validated worker identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LockDomainError::EmptyWorkerId`] for a blank value.
    pub fn new(value: impl Into<String>) -> Result<Self, LockDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LockDomainError::EmptyWorkerId);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock key: an external issue within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    /// Owning project.
    pub project_id: ProjectId,
    /// External issue identity.
    pub issue_key: IssueKey,
}

impl LockKey {
    /// Creates a lock key.
    #[must_use]
    pub const fn new(project_id: ProjectId, issue_key: IssueKey) -> Self {
        Self {
            project_id,
            issue_key,
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.issue_key)
    }
}

/// Lock row status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// Held by `worker_id` until released or expired.
    Processing,
    /// Released by its holder; free for the next worker.
    Released,
}

impl LockStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Released => "released",
        }
    }
}

impl TryFrom<&str> for LockStatus {
    type Error = crate::task::domain::ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "processing" => Ok(Self::Processing),
            "released" => Ok(Self::Released),
            _ => Err(crate::task::domain::ParseStatusError::new("lock status", value)),
        }
    }
}

/// Processing lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLock {
    key: LockKey,
    worker_id: WorkerId,
    started_at: DateTime<Utc>,
    timeout_seconds: u32,
    status: LockStatus,
}

impl ProcessingLock {
    /// Creates a held lock starting at `started_at`.
    ///
    /// # Errors
    ///
    /// Returns [`LockDomainError::ZeroTimeout`] for a zero timeout.
    pub fn processing(
        key: LockKey,
        worker_id: WorkerId,
        started_at: DateTime<Utc>,
        timeout_seconds: u32,
    ) -> Result<Self, LockDomainError> {
        if timeout_seconds == 0 {
            return Err(LockDomainError::ZeroTimeout);
        }
        Ok(Self {
            key,
            worker_id,
            started_at,
            timeout_seconds,
            status: LockStatus::Processing,
        })
    }

    /// Reconstructs a lock row from storage.
    #[must_use]
    pub const fn from_persisted(
        key: LockKey,
        worker_id: WorkerId,
        started_at: DateTime<Utc>,
        timeout_seconds: u32,
        status: LockStatus,
    ) -> Self {
        Self {
            key,
            worker_id,
            started_at,
            timeout_seconds,
            status,
        }
    }

    /// Returns the lock key.
    #[must_use]
    pub const fn key(&self) -> &LockKey {
        &self.key
    }

    /// Returns the holding worker.
    #[must_use]
    pub const fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Returns when the lock was taken.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the lock lifetime in seconds.
    #[must_use]
    pub const fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    /// Returns the row status.
    #[must_use]
    pub const fn status(&self) -> LockStatus {
        self.status
    }

    /// Returns `true` once `started_at` is strictly older than the timeout.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at > Duration::seconds(i64::from(self.timeout_seconds))
    }

    /// Returns `true` when another worker may take the lock at `now`.
    #[must_use]
    pub fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        self.status == LockStatus::Released || self.is_expired(now)
    }

    /// Marks the row released.
    pub fn release(&mut self) {
        self.status = LockStatus::Released;
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock.
    Granted(ProcessingLock),
    /// Another worker holds an unexpired lock; skip the issue.
    Denied {
        /// Current holder, when it could be read back.
        holder: Option<WorkerId>,
    },
}

impl AcquireOutcome {
    /// Returns `true` when the lock was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Outcome of a release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The caller's lock was released.
    Released,
    /// The row is held by another worker (or absent); nothing changed.
    NotOwner,
}
