//! `PostgreSQL` repository implementation for task source storage.

use super::{
    models::{NewTaskSourceRow, TaskSourceRow},
    schema::task_sources,
};
use crate::persistence::{
    PgPool, counter_from_db, counter_to_db, limit_to_db, persistence_failure, run_blocking,
};
use crate::task::{
    domain::{
        GuardedUpdate, IssueSourceConfig, PersistedStageData, PersistedTaskSourceData, ProjectId,
        StageStatus, SyncGuard, SyncStatus, TaskSource, TaskSourceId,
    },
    ports::{TaskSourceRepository, TaskSourceRepositoryError, TaskSourceRepositoryResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

persistence_failure!(TaskSourceRepositoryError);

/// `PostgreSQL`-backed task source repository.
#[derive(Debug, Clone)]
pub struct PostgresTaskSourceRepository {
    pool: PgPool,
}

impl PostgresTaskSourceRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskSourceRepository for PostgresTaskSourceRepository {
    async fn store(&self, source: &TaskSource) -> TaskSourceRepositoryResult<()> {
        let source_id = source.id();
        let row = to_new_row(source)?;
        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(task_sources::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskSourceRepositoryError::DuplicateSource(source_id)
                    }
                    _ => TaskSourceRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update_guarded(
        &self,
        source: &TaskSource,
        guard: &SyncGuard,
    ) -> TaskSourceRepositoryResult<GuardedUpdate> {
        let source_id = source.id();
        let row = to_new_row(source)?;
        let read_status = guard.status.as_str();
        let read_changed_at = guard.changed_at;

        run_blocking(&self.pool, move |connection| {
            let affected = diesel::update(
                task_sources::table
                    .filter(task_sources::id.eq(source_id.into_inner()))
                    .filter(task_sources::sync_status.eq(read_status))
                    .filter(task_sources::sync_changed_at.eq(read_changed_at)),
            )
            .set((
                task_sources::sync_status.eq(row.sync_status),
                task_sources::sync_changed_at.eq(row.sync_changed_at),
                task_sources::sync_requeue_count.eq(row.sync_requeue_count),
                task_sources::last_error.eq(row.last_error),
                task_sources::last_synced_at.eq(row.last_synced_at),
                task_sources::updated_at.eq(row.updated_at),
            ))
            .execute(connection)
            .map_err(TaskSourceRepositoryError::persistence)?;
            if affected > 0 {
                return Ok(GuardedUpdate::Applied);
            }
            let exists = diesel::select(diesel::dsl::exists(
                task_sources::table.filter(task_sources::id.eq(source_id.into_inner())),
            ))
            .get_result::<bool>(connection)
            .map_err(TaskSourceRepositoryError::persistence)?;
            if exists {
                Ok(GuardedUpdate::Conflict)
            } else {
                Err(TaskSourceRepositoryError::NotFound(source_id))
            }
        })
        .await
    }

    async fn find_by_id(&self, id: TaskSourceId) -> TaskSourceRepositoryResult<Option<TaskSource>> {
        run_blocking(&self.pool, move |connection| {
            let row = task_sources::table
                .filter(task_sources::id.eq(id.into_inner()))
                .select(TaskSourceRow::as_select())
                .first::<TaskSourceRow>(connection)
                .optional()
                .map_err(TaskSourceRepositoryError::persistence)?;
            row.map(row_to_source).transpose()
        })
        .await
    }

    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
        changed_before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> TaskSourceRepositoryResult<Vec<TaskSource>> {
        let db_limit = limit_to_db(limit)?;
        run_blocking(&self.pool, move |connection| {
            let mut query = task_sources::table
                .filter(task_sources::sync_status.eq(status.as_str()))
                .select(TaskSourceRow::as_select())
                .into_boxed();
            if let Some(cutoff) = changed_before {
                query = query.filter(task_sources::sync_changed_at.lt(cutoff));
            }
            let rows = query
                .order(task_sources::sync_changed_at.asc())
                .limit(db_limit)
                .load::<TaskSourceRow>(connection)
                .map_err(TaskSourceRepositoryError::persistence)?;
            rows.into_iter().map(row_to_source).collect()
        })
        .await
    }
}

fn to_new_row(source: &TaskSource) -> TaskSourceRepositoryResult<NewTaskSourceRow> {
    let config =
        serde_json::to_value(source.config()).map_err(TaskSourceRepositoryError::persistence)?;
    Ok(NewTaskSourceRow {
        id: source.id().into_inner(),
        project_id: source.project_id().into_inner(),
        name: source.name().to_owned(),
        config,
        sync_status: source.sync_status().as_str().to_owned(),
        sync_changed_at: source.sync().changed_at(),
        sync_requeue_count: counter_to_db(source.sync().requeue_count())?,
        last_error: source.last_error().map(str::to_owned),
        last_synced_at: source.last_synced_at(),
        created_at: source.created_at(),
        updated_at: source.updated_at(),
    })
}

fn row_to_source(row: TaskSourceRow) -> TaskSourceRepositoryResult<TaskSource> {
    let config = serde_json::from_value::<IssueSourceConfig>(row.config)
        .map_err(TaskSourceRepositoryError::persistence)?;
    let status = SyncStatus::try_from(row.sync_status.as_str())
        .map_err(TaskSourceRepositoryError::persistence)?;
    let data = PersistedTaskSourceData {
        id: TaskSourceId::from_uuid(row.id),
        project_id: ProjectId::from_uuid(row.project_id),
        name: row.name,
        config,
        sync: PersistedStageData {
            status,
            changed_at: row.sync_changed_at,
            requeue_count: counter_from_db(row.sync_requeue_count)?,
            failure: None,
        },
        last_error: row.last_error,
        last_synced_at: row.last_synced_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(TaskSource::from_persisted(data))
}
