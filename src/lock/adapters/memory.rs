//! In-memory lock store.
//!
//! A single write lock serializes every acquisition, which gives the same
//! one-winner guarantee as the conditional write in `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::lock::{
    domain::{AcquireOutcome, LockKey, LockStatus, ProcessingLock, ReleaseOutcome, WorkerId},
    ports::{LockStoreError, LockStoreResult, ProcessingLockStore},
};

/// Thread-safe in-memory lock store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    locks: Arc<RwLock<HashMap<LockKey, ProcessingLock>>>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> LockStoreError {
    LockStoreError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ProcessingLockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        candidate: &ProcessingLock,
        now: DateTime<Utc>,
    ) -> LockStoreResult<AcquireOutcome> {
        let mut locks = self.locks.write().map_err(poisoned)?;
        if let Some(existing) = locks.get(candidate.key()) {
            if !existing.is_reclaimable(now) {
                return Ok(AcquireOutcome::Denied {
                    holder: Some(existing.worker_id().clone()),
                });
            }
        }
        locks.insert(candidate.key().clone(), candidate.clone());
        Ok(AcquireOutcome::Granted(candidate.clone()))
    }

    async fn release(&self, key: &LockKey, worker_id: &WorkerId) -> LockStoreResult<ReleaseOutcome> {
        let mut locks = self.locks.write().map_err(poisoned)?;
        match locks.get_mut(key) {
            Some(lock) if lock.worker_id() == worker_id && lock.status() == LockStatus::Processing => {
                lock.release();
                Ok(ReleaseOutcome::Released)
            }
            _ => Ok(ReleaseOutcome::NotOwner),
        }
    }

    async fn find(&self, key: &LockKey) -> LockStoreResult<Option<ProcessingLock>> {
        let locks = self.locks.read().map_err(poisoned)?;
        Ok(locks.get(key).cloned())
    }
}
