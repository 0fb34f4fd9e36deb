//! Durable lock store contract.

use crate::lock::domain::{AcquireOutcome, LockKey, ProcessingLock, ReleaseOutcome, WorkerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for lock store operations.
pub type LockStoreResult<T> = Result<T, LockStoreError>;

/// Shared durable store backing the processing lock.
#[async_trait]
pub trait ProcessingLockStore: Send + Sync {
    /// Atomically writes `candidate` if no row exists for its key or the
    /// existing row is released or expired at `now`.
    async fn try_acquire(
        &self,
        candidate: &ProcessingLock,
        now: DateTime<Utc>,
    ) -> LockStoreResult<AcquireOutcome>;

    /// Releases the row for `key` if `worker_id` holds it.
    async fn release(&self, key: &LockKey, worker_id: &WorkerId) -> LockStoreResult<ReleaseOutcome>;

    /// Returns the row for `key`, whatever its state.
    async fn find(&self, key: &LockKey) -> LockStoreResult<Option<ProcessingLock>>;
}

/// Errors returned by lock store implementations.
#[derive(Debug, Clone, Error)]
pub enum LockStoreError {
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl LockStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
