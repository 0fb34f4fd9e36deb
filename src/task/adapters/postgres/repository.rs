//! `PostgreSQL` repository implementation for task storage.

use super::{
    models::{NewTaskRow, TaskRow},
    schema::tasks,
};
use crate::persistence::{
    PgPool, counter_from_db, counter_to_db, limit_to_db, persistence_failure,
    run_blocking,
};
use crate::task::{
    domain::{
        EvaluationAxis, EvaluationResult, EvaluationStatus, GuardedUpdate, ImplementationStatus,
        IssueKey, PersistedStageData, PersistedTaskData, ProjectId, RemoteStatus, StageFailure,
        StageState, StageStatus, StatusGuard, Task, TaskAxis, TaskId, TaskSourceId,
    },
    ports::{AxisQuery, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::Value;

persistence_failure!(TaskRepositoryError);

/// `PostgreSQL`-backed task repository.
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Column values for one status axis.
struct AxisColumns {
    status: String,
    changed_at: DateTime<Utc>,
    requeue_count: i32,
    failure: Option<Value>,
    result: Option<Value>,
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let source_id = task.source_id();
        let issue_key = task.issue_key().clone();
        let new_row = to_new_row(task)?;

        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(tasks::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if info.constraint_name() == Some("tasks_source_issue_key_unique") =>
                    {
                        TaskRepositoryError::DuplicateIssueKey {
                            source_id,
                            issue_key: issue_key.clone(),
                        }
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskRepositoryError::DuplicateTask(task_id)
                    }
                    _ => TaskRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update_remote_fields(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let title = task.title().to_owned();
        let description = task.description().map(str::to_owned);
        let remote_status = task.remote_status().as_str().to_owned();
        let web_url = task.web_url().map(str::to_owned);
        let labels = to_json(task.labels())?;
        let updated_at = task.updated_at();

        run_blocking(&self.pool, move |connection| {
            let affected = diesel::update(tasks::table.filter(tasks::id.eq(task_id.into_inner())))
                .set((
                    tasks::title.eq(title),
                    tasks::description.eq(description),
                    tasks::remote_status.eq(remote_status),
                    tasks::web_url.eq(web_url),
                    tasks::labels.eq(labels),
                    tasks::updated_at.eq(updated_at),
                ))
                .execute(connection)
                .map_err(TaskRepositoryError::persistence)?;
            if affected == 0 {
                return Err(TaskRepositoryError::NotFound(task_id));
            }
            Ok(())
        })
        .await
    }

    async fn update_guarded(
        &self,
        task: &Task,
        guard: &StatusGuard,
    ) -> TaskRepositoryResult<GuardedUpdate> {
        let task_id = task.id();
        let read_guard = *guard;
        let columns = axis_columns(task, read_guard.axis)?;
        let updated_at = task.updated_at();

        run_blocking(&self.pool, move |connection| {
            let affected = write_guarded_axis(connection, task_id, &read_guard, columns, updated_at)?;
            if affected > 0 {
                return Ok(GuardedUpdate::Applied);
            }
            let exists = diesel::select(diesel::dsl::exists(
                tasks::table.filter(tasks::id.eq(task_id.into_inner())),
            ))
            .get_result::<bool>(connection)
            .map_err(TaskRepositoryError::persistence)?;
            if exists {
                Ok(GuardedUpdate::Conflict)
            } else {
                Err(TaskRepositoryError::NotFound(task_id))
            }
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        run_blocking(&self.pool, move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_by_issue_key(
        &self,
        source_id: TaskSourceId,
        issue_key: &IssueKey,
    ) -> TaskRepositoryResult<Option<Task>> {
        let key = issue_key.as_str().to_owned();
        run_blocking(&self.pool, move |connection| {
            let row = tasks::table
                .filter(tasks::source_id.eq(source_id.into_inner()))
                .filter(tasks::issue_key.eq(key))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn list_by_axis(&self, query: AxisQuery) -> TaskRepositoryResult<Vec<Task>> {
        let limit = limit_to_db(query.limit)?;
        run_blocking(&self.pool, move |connection| {
            let rows = load_by_axis(connection, query, limit)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn list_by_source(&self, source_id: TaskSourceId) -> TaskRepositoryResult<Vec<Task>> {
        run_blocking(&self.pool, move |connection| {
            let rows = tasks::table
                .filter(tasks::source_id.eq(source_id.into_inner()))
                .order(tasks::created_at.asc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)
                .map_err(TaskRepositoryError::persistence)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }
}

fn write_guarded_axis(
    connection: &mut PgConnection,
    task_id: TaskId,
    guard: &StatusGuard,
    columns: AxisColumns,
    updated_at: DateTime<Utc>,
) -> TaskRepositoryResult<usize> {
    let id = task_id.into_inner();
    let read_status = guard.status.as_str();
    let read_changed_at = guard.changed_at;
    let outcome = match guard.axis {
        TaskAxis::SimpleEvaluation => diesel::update(
            tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::simple_status.eq(read_status))
                .filter(tasks::simple_changed_at.eq(read_changed_at)),
        )
        .set((
            tasks::simple_status.eq(columns.status),
            tasks::simple_changed_at.eq(columns.changed_at),
            tasks::simple_requeue_count.eq(columns.requeue_count),
            tasks::simple_failure.eq(columns.failure),
            tasks::simple_result.eq(columns.result),
            tasks::updated_at.eq(updated_at),
        ))
        .execute(connection),
        TaskAxis::AdvancedEvaluation => diesel::update(
            tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::advanced_status.eq(read_status))
                .filter(tasks::advanced_changed_at.eq(read_changed_at)),
        )
        .set((
            tasks::advanced_status.eq(columns.status),
            tasks::advanced_changed_at.eq(columns.changed_at),
            tasks::advanced_requeue_count.eq(columns.requeue_count),
            tasks::advanced_failure.eq(columns.failure),
            tasks::advanced_result.eq(columns.result),
            tasks::updated_at.eq(updated_at),
        ))
        .execute(connection),
        TaskAxis::Implementation => diesel::update(
            tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::implementation_status.eq(read_status))
                .filter(tasks::implementation_changed_at.eq(read_changed_at)),
        )
        .set((
            tasks::implementation_status.eq(columns.status),
            tasks::implementation_changed_at.eq(columns.changed_at),
            tasks::implementation_requeue_count.eq(columns.requeue_count),
            tasks::implementation_failure.eq(columns.failure),
            tasks::updated_at.eq(updated_at),
        ))
        .execute(connection),
    };
    outcome.map_err(TaskRepositoryError::persistence)
}

fn load_by_axis(
    connection: &mut PgConnection,
    query: AxisQuery,
    limit: i64,
) -> TaskRepositoryResult<Vec<TaskRow>> {
    let status = query.status.as_str();
    let mut boxed = tasks::table.select(TaskRow::as_select()).into_boxed();
    match query.axis {
        TaskAxis::SimpleEvaluation => {
            boxed = boxed.filter(tasks::simple_status.eq(status));
            if let Some(cutoff) = query.changed_before {
                boxed = boxed.filter(tasks::simple_changed_at.lt(cutoff));
            }
            boxed = boxed.order(tasks::simple_changed_at.asc());
        }
        TaskAxis::AdvancedEvaluation => {
            boxed = boxed.filter(tasks::advanced_status.eq(status));
            if let Some(cutoff) = query.changed_before {
                boxed = boxed.filter(tasks::advanced_changed_at.lt(cutoff));
            }
            boxed = boxed.order(tasks::advanced_changed_at.asc());
        }
        TaskAxis::Implementation => {
            boxed = boxed.filter(tasks::implementation_status.eq(status));
            if let Some(cutoff) = query.changed_before {
                boxed = boxed.filter(tasks::implementation_changed_at.lt(cutoff));
            }
            boxed = boxed.order(tasks::implementation_changed_at.asc());
        }
    }
    boxed
        .limit(limit)
        .load::<TaskRow>(connection)
        .map_err(TaskRepositoryError::persistence)
}

fn stage_columns<S: StageStatus>(
    state: &StageState<S>,
    result: Option<&EvaluationResult>,
) -> TaskRepositoryResult<AxisColumns> {
    Ok(AxisColumns {
        status: state.status().as_str().to_owned(),
        changed_at: state.changed_at(),
        requeue_count: counter_to_db(state.requeue_count())?,
        failure: state.failure().map(to_json).transpose()?,
        result: result.map(to_json).transpose()?,
    })
}

fn axis_columns(task: &Task, axis: TaskAxis) -> TaskRepositoryResult<AxisColumns> {
    match axis {
        TaskAxis::SimpleEvaluation => stage_columns(
            task.simple_evaluation().state(),
            task.simple_evaluation().result(),
        ),
        TaskAxis::AdvancedEvaluation => stage_columns(
            task.advanced_evaluation().state(),
            task.advanced_evaluation().result(),
        ),
        TaskAxis::Implementation => stage_columns(task.implementation(), None),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> TaskRepositoryResult<Value> {
    serde_json::to_value(value).map_err(TaskRepositoryError::persistence)
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> TaskRepositoryResult<T> {
    serde_json::from_value(value).map_err(TaskRepositoryError::persistence)
}

fn to_new_row(task: &Task) -> TaskRepositoryResult<NewTaskRow> {
    let simple = axis_columns(task, TaskAxis::SimpleEvaluation)?;
    let advanced = axis_columns(task, TaskAxis::AdvancedEvaluation)?;
    let implementation = axis_columns(task, TaskAxis::Implementation)?;
    Ok(NewTaskRow {
        id: task.id().into_inner(),
        project_id: task.project_id().into_inner(),
        source_id: task.source_id().into_inner(),
        issue_key: task.issue_key().as_str().to_owned(),
        title: task.title().to_owned(),
        description: task.description().map(str::to_owned),
        remote_status: task.remote_status().as_str().to_owned(),
        web_url: task.web_url().map(str::to_owned),
        labels: to_json(task.labels())?,
        worker_repository: task.worker_repository().map(str::to_owned),
        simple_status: simple.status,
        simple_changed_at: simple.changed_at,
        simple_requeue_count: simple.requeue_count,
        simple_failure: simple.failure,
        simple_result: simple.result,
        advanced_status: advanced.status,
        advanced_changed_at: advanced.changed_at,
        advanced_requeue_count: advanced.requeue_count,
        advanced_failure: advanced.failure,
        advanced_result: advanced.result,
        implementation_status: implementation.status,
        implementation_changed_at: implementation.changed_at,
        implementation_requeue_count: implementation.requeue_count,
        implementation_failure: implementation.failure,
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    })
}

fn stage_from_row<S>(
    status: &str,
    changed_at: DateTime<Utc>,
    requeue_count: i32,
    failure: Option<Value>,
) -> TaskRepositoryResult<PersistedStageData<S>>
where
    S: for<'a> TryFrom<&'a str, Error = crate::task::domain::ParseStatusError>,
{
    Ok(PersistedStageData {
        status: S::try_from(status).map_err(TaskRepositoryError::persistence)?,
        changed_at,
        requeue_count: counter_from_db(requeue_count)?,
        failure: failure.map(from_json::<StageFailure>).transpose()?,
    })
}

fn evaluation_from_row(
    status: &str,
    changed_at: DateTime<Utc>,
    requeue_count: i32,
    failure: Option<Value>,
    result: Option<Value>,
) -> TaskRepositoryResult<EvaluationAxis> {
    let state = stage_from_row::<EvaluationStatus>(status, changed_at, requeue_count, failure)?;
    let result = result.map(from_json::<EvaluationResult>).transpose()?;
    Ok(EvaluationAxis::from_persisted(state, result))
}

fn row_to_task(row: TaskRow) -> TaskRepositoryResult<Task> {
    let simple_evaluation = evaluation_from_row(
        &row.simple_status,
        row.simple_changed_at,
        row.simple_requeue_count,
        row.simple_failure,
        row.simple_result,
    )?;
    let advanced_evaluation = evaluation_from_row(
        &row.advanced_status,
        row.advanced_changed_at,
        row.advanced_requeue_count,
        row.advanced_failure,
        row.advanced_result,
    )?;
    let implementation = stage_from_row::<ImplementationStatus>(
        &row.implementation_status,
        row.implementation_changed_at,
        row.implementation_requeue_count,
        row.implementation_failure,
    )?;

    let data = PersistedTaskData {
        id: TaskId::from_uuid(row.id),
        project_id: ProjectId::from_uuid(row.project_id),
        source_id: TaskSourceId::from_uuid(row.source_id),
        issue_key: IssueKey::parse(row.issue_key).map_err(TaskRepositoryError::persistence)?,
        title: row.title,
        description: row.description,
        remote_status: RemoteStatus::try_from(row.remote_status.as_str())
            .map_err(TaskRepositoryError::persistence)?,
        web_url: row.web_url,
        labels: from_json(row.labels)?,
        worker_repository: row.worker_repository,
        simple_evaluation,
        advanced_evaluation,
        implementation,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(Task::from_persisted(data))
}
