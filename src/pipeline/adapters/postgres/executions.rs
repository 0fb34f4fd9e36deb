//! `PostgreSQL` implementation of the pipeline execution repository.

use super::{
    models::{ExecutionRow, NewExecutionRow},
    schema::pipeline_executions,
};
use crate::implementation::domain::SessionId;
use crate::persistence::{PgPool, limit_to_db, persistence_failure, run_blocking};
use crate::pipeline::{
    domain::{
        ExecutionGuard, ExecutionHandle, PersistedExecutionData, PipelineExecution,
        PipelineExecutionId, PipelineOutputs, PipelineStatus,
    },
    ports::{
        PipelineExecutionRepository, PipelineExecutionRepositoryError,
        PipelineExecutionRepositoryResult,
    },
};
use crate::task::domain::{GuardedUpdate, TaskId};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

persistence_failure!(PipelineExecutionRepositoryError);

const TERMINAL: [&str; 3] = [
    PipelineStatus::Success.as_str(),
    PipelineStatus::Failed.as_str(),
    PipelineStatus::Canceled.as_str(),
];

/// `PostgreSQL`-backed pipeline execution repository.
#[derive(Debug, Clone)]
pub struct PostgresPipelineExecutionRepository {
    pool: PgPool,
}

impl PostgresPipelineExecutionRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineExecutionRepository for PostgresPipelineExecutionRepository {
    async fn store(&self, execution: &PipelineExecution) -> PipelineExecutionRepositoryResult<()> {
        let execution_id = execution.id();
        let row = to_new_row(execution)?;
        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(pipeline_executions::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        PipelineExecutionRepositoryError::DuplicateExecution(execution_id)
                    }
                    _ => PipelineExecutionRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update_guarded(
        &self,
        execution: &PipelineExecution,
        guard: &ExecutionGuard,
    ) -> PipelineExecutionRepositoryResult<GuardedUpdate> {
        let execution_id = execution.id();
        let row = to_new_row(execution)?;
        let read_status = guard.status.as_str();
        let read_update = guard.last_status_update;

        run_blocking(&self.pool, move |connection| {
            let affected = diesel::update(
                pipeline_executions::table
                    .filter(pipeline_executions::id.eq(execution_id.into_inner()))
                    .filter(pipeline_executions::status.eq(read_status))
                    .filter(pipeline_executions::last_status_update.eq(read_update)),
            )
            .set((
                pipeline_executions::status.eq(row.status),
                pipeline_executions::last_status_update.eq(row.last_status_update),
                pipeline_executions::finished_at.eq(row.finished_at),
                pipeline_executions::failure_reason.eq(row.failure_reason),
                pipeline_executions::outputs.eq(row.outputs),
                pipeline_executions::artifacts_recorded_at.eq(row.artifacts_recorded_at),
            ))
            .execute(connection)
            .map_err(PipelineExecutionRepositoryError::persistence)?;
            if affected > 0 {
                return Ok(GuardedUpdate::Applied);
            }
            let exists = diesel::select(diesel::dsl::exists(
                pipeline_executions::table
                    .filter(pipeline_executions::id.eq(execution_id.into_inner())),
            ))
            .get_result::<bool>(connection)
            .map_err(PipelineExecutionRepositoryError::persistence)?;
            if exists {
                Ok(GuardedUpdate::Conflict)
            } else {
                Err(PipelineExecutionRepositoryError::NotFound(execution_id))
            }
        })
        .await
    }

    async fn find_by_id(
        &self,
        id: PipelineExecutionId,
    ) -> PipelineExecutionRepositoryResult<Option<PipelineExecution>> {
        run_blocking(&self.pool, move |connection| {
            let row = pipeline_executions::table
                .filter(pipeline_executions::id.eq(id.into_inner()))
                .select(ExecutionRow::as_select())
                .first::<ExecutionRow>(connection)
                .optional()
                .map_err(PipelineExecutionRepositoryError::persistence)?;
            row.map(row_to_execution).transpose()
        })
        .await
    }

    async fn list_by_session(
        &self,
        session_id: SessionId,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>> {
        run_blocking(&self.pool, move |connection| {
            let rows = pipeline_executions::table
                .filter(pipeline_executions::session_id.eq(session_id.into_inner()))
                .order(pipeline_executions::started_at.asc())
                .select(ExecutionRow::as_select())
                .load::<ExecutionRow>(connection)
                .map_err(PipelineExecutionRepositoryError::persistence)?;
            rows.into_iter().map(row_to_execution).collect()
        })
        .await
    }

    async fn list_active(
        &self,
        limit: usize,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>> {
        let db_limit = limit_to_db(limit)?;
        run_blocking(&self.pool, move |connection| {
            let rows = pipeline_executions::table
                .filter(pipeline_executions::status.ne_all(TERMINAL))
                .order(pipeline_executions::last_status_update.asc())
                .limit(db_limit)
                .select(ExecutionRow::as_select())
                .load::<ExecutionRow>(connection)
                .map_err(PipelineExecutionRepositoryError::persistence)?;
            rows.into_iter().map(row_to_execution).collect()
        })
        .await
    }

    async fn list_unrecorded_successes(
        &self,
        limit: usize,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>> {
        let db_limit = limit_to_db(limit)?;
        run_blocking(&self.pool, move |connection| {
            let rows = pipeline_executions::table
                .filter(pipeline_executions::status.eq(PipelineStatus::Success.as_str()))
                .filter(pipeline_executions::artifacts_recorded_at.is_null())
                .order(pipeline_executions::last_status_update.asc())
                .limit(db_limit)
                .select(ExecutionRow::as_select())
                .load::<ExecutionRow>(connection)
                .map_err(PipelineExecutionRepositoryError::persistence)?;
            rows.into_iter().map(row_to_execution).collect()
        })
        .await
    }
}

fn to_new_row(execution: &PipelineExecution) -> PipelineExecutionRepositoryResult<NewExecutionRow> {
    let outputs = serde_json::to_value(execution.outputs())
        .map_err(PipelineExecutionRepositoryError::persistence)?;
    Ok(NewExecutionRow {
        id: execution.id().into_inner(),
        session_id: execution.session_id().into_inner(),
        task_id: execution.task_id().map(TaskId::into_inner),
        worker_repository: execution.worker_repository().to_owned(),
        git_ref: execution.git_ref().to_owned(),
        handle: execution.handle().map(|handle| handle.as_str().to_owned()),
        status: execution.status().as_str().to_owned(),
        started_at: execution.started_at(),
        last_status_update: execution.last_status_update(),
        finished_at: execution.finished_at(),
        failure_reason: execution.failure_reason().map(str::to_owned),
        outputs,
        artifacts_recorded_at: execution.artifacts_recorded_at(),
    })
}

fn row_to_execution(row: ExecutionRow) -> PipelineExecutionRepositoryResult<PipelineExecution> {
    let status = PipelineStatus::try_from(row.status.as_str())
        .map_err(PipelineExecutionRepositoryError::persistence)?;
    let handle = row
        .handle
        .map(ExecutionHandle::new)
        .transpose()
        .map_err(PipelineExecutionRepositoryError::persistence)?;
    let outputs = serde_json::from_value::<PipelineOutputs>(row.outputs)
        .map_err(PipelineExecutionRepositoryError::persistence)?;
    Ok(PipelineExecution::from_persisted(PersistedExecutionData {
        id: PipelineExecutionId::from_uuid(row.id),
        session_id: SessionId::from_uuid(row.session_id),
        task_id: row.task_id.map(TaskId::from_uuid),
        worker_repository: row.worker_repository,
        git_ref: row.git_ref,
        handle,
        status,
        started_at: row.started_at,
        last_status_update: row.last_status_update,
        finished_at: row.finished_at,
        failure_reason: row.failure_reason,
        outputs,
        artifacts_recorded_at: row.artifacts_recorded_at,
    }))
}
