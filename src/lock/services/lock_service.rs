//! Acquire and release processing locks against a shared store.

use crate::clock;
use crate::lock::{
    domain::{
        AcquireOutcome, LockDomainError, LockKey, ProcessingLock, ReleaseOutcome, WorkerId,
    },
    ports::{LockStoreError, ProcessingLockStore},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Service-level errors for lock operations.
#[derive(Debug, Error)]
pub enum LockServiceError {
    /// The lock request was invalid.
    #[error(transparent)]
    Domain(#[from] LockDomainError),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] LockStoreError),
}

/// Result type for lock service operations.
pub type LockServiceResult<T> = Result<T, LockServiceError>;

/// Grants per-issue processing locks.
#[derive(Clone)]
pub struct ProcessingLockService<S, C>
where
    S: ProcessingLockStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> ProcessingLockService<S, C>
where
    S: ProcessingLockStore,
    C: Clock + Send + Sync,
{
    /// Creates a lock service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Attempts to take the lock for `key` on behalf of `worker_id`.
    ///
    /// The lock is granted when no row exists, the row was released, or its
    /// holder started more than its timeout ago. A live lock, including one
    /// held by `worker_id` itself, yields [`AcquireOutcome::Denied`].
    ///
    /// # Errors
    ///
    /// Returns [`LockServiceError::Domain`] for a zero timeout, or a store
    /// error.
    pub async fn acquire(
        &self,
        key: &LockKey,
        worker_id: &WorkerId,
        timeout_seconds: u32,
    ) -> LockServiceResult<AcquireOutcome> {
        let now = clock::now(&*self.clock);
        let candidate =
            ProcessingLock::processing(key.clone(), worker_id.clone(), now, timeout_seconds)?;
        let outcome = self.store.try_acquire(&candidate, now).await?;
        match &outcome {
            AcquireOutcome::Granted(_) => {
                debug!(lock = %key, worker = %worker_id, "processing lock granted");
            }
            AcquireOutcome::Denied { holder } => {
                debug!(
                    lock = %key,
                    worker = %worker_id,
                    holder = holder.as_ref().map_or("unknown", WorkerId::as_str),
                    "processing lock denied"
                );
            }
        }
        Ok(outcome)
    }

    /// Releases the lock for `key` if `worker_id` holds it.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn release(
        &self,
        key: &LockKey,
        worker_id: &WorkerId,
    ) -> LockServiceResult<ReleaseOutcome> {
        let outcome = self.store.release(key, worker_id).await?;
        if outcome == ReleaseOutcome::NotOwner {
            warn!(lock = %key, worker = %worker_id, "release by non-holder ignored");
        }
        Ok(outcome)
    }

    /// Returns the live lock for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn holder(&self, key: &LockKey) -> LockServiceResult<Option<ProcessingLock>> {
        let now = clock::now(&*self.clock);
        let lock = self.store.find(key).await?;
        Ok(lock.filter(|held| !held.is_reclaimable(now)))
    }
}
