//! `PostgreSQL` implementation of the processing lock store.

use super::{models::LockRow, schema::processing_locks};
use crate::lock::{
    domain::{AcquireOutcome, LockKey, LockStatus, ProcessingLock, ReleaseOutcome, WorkerId},
    ports::{LockStoreError, LockStoreResult, ProcessingLockStore},
};
use crate::persistence::{PgPool, counter_from_db, counter_to_db, persistence_failure, run_blocking};
use crate::task::domain::{IssueKey, ProjectId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text, Timestamptz, Uuid as SqlUuid};

persistence_failure!(LockStoreError);

/// Insert-or-take-over in one statement. The `WHERE` on the conflict branch
/// leaves a live lock untouched, so `RETURNING` yields no row on denial.
const ACQUIRE_SQL: &str = "\
INSERT INTO processing_locks \
    (project_id, issue_key, processing_worker_id, processing_started_at, timeout_seconds, status) \
VALUES ($1, $2, $3, $4, $5, 'processing') \
ON CONFLICT (project_id, issue_key) DO UPDATE SET \
    processing_worker_id = EXCLUDED.processing_worker_id, \
    processing_started_at = EXCLUDED.processing_started_at, \
    timeout_seconds = EXCLUDED.timeout_seconds, \
    status = EXCLUDED.status \
WHERE processing_locks.status = 'released' \
   OR processing_locks.processing_started_at \
      < $6 - make_interval(secs => processing_locks.timeout_seconds) \
RETURNING project_id, issue_key, processing_worker_id, processing_started_at, timeout_seconds, status";

/// `PostgreSQL`-backed processing lock store.
#[derive(Debug, Clone)]
pub struct PostgresLockStore {
    pool: PgPool,
}

impl PostgresLockStore {
    /// Creates a store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessingLockStore for PostgresLockStore {
    async fn try_acquire(
        &self,
        candidate: &ProcessingLock,
        now: DateTime<Utc>,
    ) -> LockStoreResult<AcquireOutcome> {
        let project_id = candidate.key().project_id.into_inner();
        let issue_key = candidate.key().issue_key.to_string();
        let worker = candidate.worker_id().as_str().to_owned();
        let started_at = candidate.started_at();
        let timeout = counter_to_db::<LockStoreError>(candidate.timeout_seconds())?;

        run_blocking(&self.pool, move |connection| {
            let granted = diesel::sql_query(ACQUIRE_SQL)
                .bind::<SqlUuid, _>(project_id)
                .bind::<Text, _>(&issue_key)
                .bind::<Text, _>(&worker)
                .bind::<Timestamptz, _>(started_at)
                .bind::<Integer, _>(timeout)
                .bind::<Timestamptz, _>(now)
                .get_result::<LockRow>(connection)
                .optional()
                .map_err(LockStoreError::persistence)?;
            if let Some(row) = granted {
                return row_to_lock(row).map(AcquireOutcome::Granted);
            }
            let holder = processing_locks::table
                .filter(processing_locks::project_id.eq(project_id))
                .filter(processing_locks::issue_key.eq(&issue_key))
                .select(processing_locks::processing_worker_id)
                .first::<String>(connection)
                .optional()
                .map_err(LockStoreError::persistence)?;
            let holder_id = holder
                .map(WorkerId::new)
                .transpose()
                .map_err(LockStoreError::persistence)?;
            Ok(AcquireOutcome::Denied { holder: holder_id })
        })
        .await
    }

    async fn release(&self, key: &LockKey, worker_id: &WorkerId) -> LockStoreResult<ReleaseOutcome> {
        let project_id = key.project_id.into_inner();
        let issue_key = key.issue_key.to_string();
        let worker = worker_id.as_str().to_owned();

        run_blocking(&self.pool, move |connection| {
            let affected = diesel::update(
                processing_locks::table
                    .filter(processing_locks::project_id.eq(project_id))
                    .filter(processing_locks::issue_key.eq(issue_key))
                    .filter(processing_locks::processing_worker_id.eq(worker))
                    .filter(processing_locks::status.eq(LockStatus::Processing.as_str())),
            )
            .set(processing_locks::status.eq(LockStatus::Released.as_str()))
            .execute(connection)
            .map_err(LockStoreError::persistence)?;
            Ok(if affected > 0 {
                ReleaseOutcome::Released
            } else {
                ReleaseOutcome::NotOwner
            })
        })
        .await
    }

    async fn find(&self, key: &LockKey) -> LockStoreResult<Option<ProcessingLock>> {
        let project_id = key.project_id.into_inner();
        let issue_key = key.issue_key.to_string();

        run_blocking(&self.pool, move |connection| {
            let row = processing_locks::table
                .filter(processing_locks::project_id.eq(project_id))
                .filter(processing_locks::issue_key.eq(issue_key))
                .select(LockRow::as_select())
                .first::<LockRow>(connection)
                .optional()
                .map_err(LockStoreError::persistence)?;
            row.map(row_to_lock).transpose()
        })
        .await
    }
}

fn row_to_lock(row: LockRow) -> LockStoreResult<ProcessingLock> {
    let issue_key = IssueKey::parse(row.issue_key).map_err(LockStoreError::persistence)?;
    let worker_id = WorkerId::new(row.processing_worker_id).map_err(LockStoreError::persistence)?;
    let status = LockStatus::try_from(row.status.as_str()).map_err(LockStoreError::persistence)?;
    Ok(ProcessingLock::from_persisted(
        LockKey::new(ProjectId::from_uuid(row.project_id), issue_key),
        worker_id,
        row.processing_started_at,
        counter_from_db(row.timeout_seconds)?,
        status,
    ))
}
