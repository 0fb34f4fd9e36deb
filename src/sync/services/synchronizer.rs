//! Creates and updates tasks from a tracker's issue list.

use crate::clock;
use crate::events::{EngineEvent, EventSink};
use crate::lock::{
    domain::{AcquireOutcome, LockKey, WorkerId},
    ports::ProcessingLockStore,
    services::{LockServiceError, ProcessingLockService},
};
use crate::provider::{
    domain::SecretString,
    ports::{SecretStore, SecretStoreError},
};
use crate::retry::{RetryPolicy, retry_transient};
use crate::sync::{
    domain::{FetchedIssue, IssueSyncError, SyncReport},
    ports::IssueSource,
};
use crate::task::{
    domain::{
        ExternalIssue, GuardedUpdate, SyncGuard, SyncStatus, Task, TaskDomainError, TaskSource,
        TaskSourceId,
    },
    ports::{
        TaskRepository, TaskRepositoryError, TaskSourceRepository, TaskSourceRepositoryError,
    },
};
use chrono::Duration;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service-level errors for task source synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Task domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Task source repository operation failed.
    #[error(transparent)]
    Sources(#[from] TaskSourceRepositoryError),
    /// Task repository operation failed.
    #[error(transparent)]
    Tasks(#[from] TaskRepositoryError),
    /// Processing lock operation failed.
    #[error(transparent)]
    Lock(#[from] LockServiceError),
    /// Secret store lookup failed.
    #[error(transparent)]
    Secrets(#[from] SecretStoreError),
    /// The task source does not exist.
    #[error("task source not found: {0}")]
    SourceNotFound(TaskSourceId),
    /// Another worker is syncing the source.
    #[error("task source {0} is already syncing")]
    AlreadySyncing(TaskSourceId),
    /// The issue list could not be fetched; the sync was marked failed.
    #[error("sync of task source {source_id} failed: {message}")]
    Fetch {
        /// Source whose fetch failed.
        source_id: TaskSourceId,
        /// Error text retained on the source.
        message: String,
    },
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Synchronizer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Identity this worker takes processing locks under.
    pub worker_id: WorkerId,
    /// Seconds after which a processing lock may be reclaimed.
    pub lock_timeout_seconds: u32,
    /// Backoff for transient tracker failures.
    pub retry: RetryPolicy,
}

impl SyncSettings {
    /// Creates settings for `worker_id` with a 60 second lock timeout.
    #[must_use]
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            lock_timeout_seconds: 60,
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened to one fetched issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IssueOutcome {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

/// Pulls issues into tasks for configured task sources.
pub struct TaskSourceSynchronizer<S, T, L, K, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    L: ProcessingLockStore,
    K: SecretStore,
    C: Clock + Send + Sync,
{
    sources: Arc<S>,
    tasks: Arc<T>,
    locks: ProcessingLockService<L, C>,
    secrets: Arc<K>,
    issues: Arc<dyn IssueSource>,
    clock: Arc<C>,
    events: Arc<dyn EventSink>,
    settings: SyncSettings,
}

impl<S, T, L, K, C> TaskSourceSynchronizer<S, T, L, K, C>
where
    S: TaskSourceRepository,
    T: TaskRepository,
    L: ProcessingLockStore,
    K: SecretStore,
    C: Clock + Send + Sync,
{
    /// Creates a synchronizer.
    #[expect(
        clippy::too_many_arguments,
        reason = "every collaborator is a distinct port"
    )]
    #[must_use]
    pub fn new(
        sources: Arc<S>,
        tasks: Arc<T>,
        lock_store: Arc<L>,
        secrets: Arc<K>,
        issues: Arc<dyn IssueSource>,
        clock: Arc<C>,
        events: Arc<dyn EventSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            sources,
            tasks,
            locks: ProcessingLockService::new(lock_store, Arc::clone(&clock)),
            secrets,
            issues,
            clock,
            events,
            settings,
        }
    }

    /// Syncs `source_id` once.
    ///
    /// Issues another worker holds the lock for are skipped. Per-issue
    /// failures are collected in the report and do not fail the run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadySyncing`] when another worker owns the
    /// sync, [`SyncError::Fetch`] when the issue list could not be fetched
    /// (the source is left `failed`), or a repository error.
    pub async fn sync(&self, source_id: TaskSourceId) -> SyncResult<SyncReport> {
        let mut source = self
            .sources
            .find_by_id(source_id)
            .await?
            .ok_or(SyncError::SourceNotFound(source_id))?;
        if source.sync_status() == SyncStatus::Syncing {
            return Err(SyncError::AlreadySyncing(source_id));
        }
        let guard = source.sync_guard();
        source.begin_sync(clock::now(&*self.clock))?;
        if !self.write_source(&source, &guard).await? {
            return Err(SyncError::AlreadySyncing(source_id));
        }
        let syncing = source.sync_guard();
        info!(source_id = %source_id, kind = source.config().kind(), "sync started");

        let fetched = match self.fetch(&source).await {
            Ok(fetched) => fetched,
            Err(message) => {
                warn!(source_id = %source_id, error = %message, "sync fetch failed");
                source.fail_sync(message.clone(), clock::now(&*self.clock))?;
                self.write_source(&source, &syncing).await?;
                return Err(SyncError::Fetch { source_id, message });
            }
        };

        let mut report = SyncReport::default();
        for issue in fetched {
            let issue_key = issue.reference.key();
            match self.sync_issue(&source, issue).await {
                Ok(IssueOutcome::Created) => report.created += 1,
                Ok(IssueOutcome::Updated) => report.updated += 1,
                Ok(IssueOutcome::Unchanged) => report.unchanged += 1,
                Ok(IssueOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    debug!(source_id = %source_id, issue_key = %issue_key, error = %err, "issue not synced");
                    report.errors.push(IssueSyncError {
                        issue_key,
                        message: err.to_string(),
                    });
                }
            }
        }

        source.complete_sync(clock::now(&*self.clock))?;
        if !self.write_source(&source, &syncing).await? {
            warn!(source_id = %source_id, "sync status changed while syncing; completion not written");
        }
        info!(
            source_id = %source_id,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            errors = report.errors.len(),
            "sync completed"
        );
        Ok(report)
    }

    /// Syncs up to `limit` queued sources, oldest request first.
    /// Per-source errors are logged and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns a repository error when the queue cannot be listed.
    pub async fn sync_queued(&self, limit: usize) -> SyncResult<Vec<(TaskSourceId, SyncReport)>> {
        let queued = self
            .sources
            .list_by_sync_status(SyncStatus::Queued, None, limit)
            .await?;
        let mut reports = Vec::with_capacity(queued.len());
        for source in queued {
            match self.sync(source.id()).await {
                Ok(report) => reports.push((source.id(), report)),
                Err(err) => warn!(source_id = %source.id(), error = %err, "sync failed"),
            }
        }
        Ok(reports)
    }

    /// Queues a sync for up to `limit` sources that have not synced for
    /// `interval`. Failed sources wait for an explicit request.
    ///
    /// # Errors
    ///
    /// Returns a repository error when sources cannot be listed.
    pub async fn schedule_due(&self, interval: Duration, limit: usize) -> SyncResult<usize> {
        let cutoff = clock::now(&*self.clock) - interval;
        let mut scheduled = 0;
        for status in [SyncStatus::Pending, SyncStatus::Completed] {
            let due = self
                .sources
                .list_by_sync_status(status, Some(cutoff), limit)
                .await?;
            for mut source in due {
                let guard = source.sync_guard();
                if source.request_sync(clock::now(&*self.clock))?
                    && self.write_source(&source, &guard).await?
                {
                    scheduled += 1;
                }
            }
        }
        if scheduled > 0 {
            debug!(scheduled, "periodic syncs queued");
        }
        Ok(scheduled)
    }

    async fn fetch(&self, source: &TaskSource) -> Result<Vec<FetchedIssue>, String> {
        let config = source.config();
        if !config.is_fetchable() {
            return Ok(Vec::new());
        }
        let credential = self.credential(source).await?;
        retry_transient(&self.settings.retry, "issue fetch", || {
            self.issues.list_issues(config, credential.clone())
        })
        .await
        .map_err(|err| err.to_string())
    }

    async fn credential(&self, source: &TaskSource) -> Result<Option<SecretString>, String> {
        let Some(secret_id) = source.config().token_secret() else {
            return Ok(None);
        };
        match self.secrets.get(secret_id).await {
            Ok(Some(secret)) => Ok(Some(secret)),
            Ok(None) => Err(format!("secret '{secret_id}' is missing")),
            Err(err) => Err(err.to_string()),
        }
    }

    /// Creates or updates the task for one issue under its processing lock.
    /// An issue another worker holds the lock for is skipped.
    pub(crate) async fn sync_issue(
        &self,
        source: &TaskSource,
        fetched: FetchedIssue,
    ) -> SyncResult<IssueOutcome> {
        let issue = fetched.validate()?;
        let key = LockKey::new(source.project_id(), issue.key());
        let worker = &self.settings.worker_id;
        match self
            .locks
            .acquire(&key, worker, self.settings.lock_timeout_seconds)
            .await?
        {
            AcquireOutcome::Denied { .. } => return Ok(IssueOutcome::Skipped),
            AcquireOutcome::Granted(_) => {}
        }
        let outcome = self.upsert(source, &issue).await;
        if let Err(err) = self.locks.release(&key, worker).await {
            warn!(lock = %key, error = %err, "processing lock release failed");
        }
        outcome
    }

    async fn upsert(&self, source: &TaskSource, issue: &ExternalIssue) -> SyncResult<IssueOutcome> {
        let now = clock::now(&*self.clock);
        let issue_key = issue.key();
        if let Some(mut task) = self.tasks.find_by_issue_key(source.id(), &issue_key).await? {
            if !task.apply_remote_changes(issue, now) {
                return Ok(IssueOutcome::Unchanged);
            }
            self.tasks.update_remote_fields(&task).await?;
            self.events.publish(EngineEvent::TaskUpdated { task_id: task.id() });
            return Ok(IssueOutcome::Updated);
        }
        let task = Task::new_from_issue(source, issue, now);
        match self.tasks.store(&task).await {
            Ok(()) => {}
            Err(TaskRepositoryError::DuplicateIssueKey { .. }) => {
                debug!(issue_key = %issue_key, "task created concurrently");
                return Ok(IssueOutcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        }
        self.events.publish(EngineEvent::TaskCreated {
            task_id: task.id(),
            source_id: source.id(),
            issue_key,
        });
        Ok(IssueOutcome::Created)
    }

    async fn write_source(&self, source: &TaskSource, guard: &SyncGuard) -> SyncResult<bool> {
        let applied = self.sources.update_guarded(source, guard).await? == GuardedUpdate::Applied;
        if applied {
            self.events.publish(EngineEvent::SourceSyncChanged {
                source_id: source.id(),
                status: source.sync_status(),
            });
        }
        Ok(applied)
    }
}
