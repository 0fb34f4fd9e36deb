//! `PostgreSQL` implementation of the session repository.

use super::{
    models::{NewSessionRow, SessionRow},
    schema::sessions,
};
use crate::implementation::{
    domain::{ChangeSet, PersistedSessionData, Session, SessionId, SessionKind, SessionStatus},
    ports::{SessionRepository, SessionRepositoryError, SessionRepositoryResult},
};
use crate::persistence::{
    PgPool, count_from_db, count_to_db, limit_to_db, persistence_failure, run_blocking,
};
use crate::provider::domain::TokenUsage;
use crate::task::domain::{GuardedUpdate, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

persistence_failure!(SessionRepositoryError);

/// `PostgreSQL`-backed session repository.
#[derive(Debug, Clone)]
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn store(&self, session: &Session) -> SessionRepositoryResult<()> {
        let session_id = session.id();
        let row = to_new_row(session)?;
        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(sessions::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        SessionRepositoryError::DuplicateSession(session_id)
                    }
                    _ => SessionRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, session: &Session) -> SessionRepositoryResult<()> {
        let session_id = session.id();
        let row = to_new_row(session)?;
        run_blocking(&self.pool, move |connection| {
            let affected =
                diesel::update(sessions::table.filter(sessions::id.eq(session_id.into_inner())))
                    .set((
                        sessions::status.eq(row.status),
                        sessions::input_tokens.eq(row.input_tokens),
                        sessions::output_tokens.eq(row.output_tokens),
                        sessions::change_set.eq(row.change_set),
                        sessions::error.eq(row.error),
                        sessions::finished_at.eq(row.finished_at),
                    ))
                    .execute(connection)
                    .map_err(SessionRepositoryError::persistence)?;
            if affected == 0 {
                return Err(SessionRepositoryError::NotFound(session_id));
            }
            Ok(())
        })
        .await
    }

    async fn claim_handoff(
        &self,
        id: SessionId,
        expected: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> SessionRepositoryResult<GuardedUpdate> {
        run_blocking(&self.pool, move |connection| {
            let target = sessions::table.filter(sessions::id.eq(id.into_inner()));
            let affected = match expected {
                Some(previous) => diesel::update(target.filter(sessions::handed_off_at.eq(previous)))
                    .set(sessions::handed_off_at.eq(Some(at)))
                    .execute(connection),
                None => diesel::update(target.filter(sessions::handed_off_at.is_null()))
                    .set(sessions::handed_off_at.eq(Some(at)))
                    .execute(connection),
            }
            .map_err(SessionRepositoryError::persistence)?;
            if affected > 0 {
                return Ok(GuardedUpdate::Applied);
            }
            let exists = diesel::select(diesel::dsl::exists(
                sessions::table.filter(sessions::id.eq(id.into_inner())),
            ))
            .get_result::<bool>(connection)
            .map_err(SessionRepositoryError::persistence)?;
            if exists {
                Ok(GuardedUpdate::Conflict)
            } else {
                Err(SessionRepositoryError::NotFound(id))
            }
        })
        .await
    }

    async fn record_launch(&self, id: SessionId, at: DateTime<Utc>) -> SessionRepositoryResult<()> {
        run_blocking(&self.pool, move |connection| {
            let affected = diesel::update(sessions::table.filter(sessions::id.eq(id.into_inner())))
                .set(sessions::launched_at.eq(Some(at)))
                .execute(connection)
                .map_err(SessionRepositoryError::persistence)?;
            if affected == 0 {
                return Err(SessionRepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: SessionId) -> SessionRepositoryResult<Option<Session>> {
        run_blocking(&self.pool, move |connection| {
            let row = sessions::table
                .filter(sessions::id.eq(id.into_inner()))
                .select(SessionRow::as_select())
                .first::<SessionRow>(connection)
                .optional()
                .map_err(SessionRepositoryError::persistence)?;
            row.map(row_to_session).transpose()
        })
        .await
    }

    async fn list_by_task(&self, task_id: TaskId) -> SessionRepositoryResult<Vec<Session>> {
        run_blocking(&self.pool, move |connection| {
            let rows = sessions::table
                .filter(sessions::task_id.eq(task_id.into_inner()))
                .order(sessions::started_at.asc())
                .select(SessionRow::as_select())
                .load::<SessionRow>(connection)
                .map_err(SessionRepositoryError::persistence)?;
            rows.into_iter().map(row_to_session).collect()
        })
        .await
    }

    async fn list_awaiting_pipeline(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> SessionRepositoryResult<Vec<Session>> {
        let db_limit = limit_to_db(limit)?;
        run_blocking(&self.pool, move |connection| {
            let rows = sessions::table
                .filter(sessions::kind.eq(SessionKind::Implementation.as_str()))
                .filter(sessions::status.eq(SessionStatus::Completed.as_str()))
                .filter(sessions::change_set.is_not_null())
                .filter(sessions::launched_at.is_null())
                .filter(
                    sessions::handed_off_at
                        .is_null()
                        .or(sessions::handed_off_at.lt(stale_before)),
                )
                .order(sessions::started_at.asc())
                .limit(db_limit)
                .select(SessionRow::as_select())
                .load::<SessionRow>(connection)
                .map_err(SessionRepositoryError::persistence)?;
            rows.into_iter().map(row_to_session).collect()
        })
        .await
    }
}

fn to_new_row(session: &Session) -> SessionRepositoryResult<NewSessionRow> {
    let change_set = session
        .change_set()
        .map(serde_json::to_value)
        .transpose()
        .map_err(SessionRepositoryError::persistence)?;
    let usage = session.usage();
    Ok(NewSessionRow {
        id: session.id().into_inner(),
        task_id: session.task_id().map(TaskId::into_inner),
        kind: session.kind().as_str().to_owned(),
        runner: session.runner().to_owned(),
        status: session.status().as_str().to_owned(),
        input_tokens: count_to_db(usage.input_tokens)?,
        output_tokens: count_to_db(usage.output_tokens)?,
        prompt_digest: session.prompt_digest().to_owned(),
        change_set,
        error: session.error().map(str::to_owned),
        started_at: session.started_at(),
        finished_at: session.finished_at(),
        handed_off_at: session.handed_off_at(),
        launched_at: session.launched_at(),
    })
}

fn row_to_session(row: SessionRow) -> SessionRepositoryResult<Session> {
    let kind =
        SessionKind::try_from(row.kind.as_str()).map_err(SessionRepositoryError::persistence)?;
    let status =
        SessionStatus::try_from(row.status.as_str()).map_err(SessionRepositoryError::persistence)?;
    let change_set = row
        .change_set
        .map(serde_json::from_value::<ChangeSet>)
        .transpose()
        .map_err(SessionRepositoryError::persistence)?;
    Ok(Session::from_persisted(PersistedSessionData {
        id: SessionId::from_uuid(row.id),
        task_id: row.task_id.map(TaskId::from_uuid),
        kind,
        runner: row.runner,
        status,
        usage: TokenUsage {
            input_tokens: count_from_db(row.input_tokens)?,
            output_tokens: count_from_db(row.output_tokens)?,
        },
        prompt_digest: row.prompt_digest,
        change_set,
        error: row.error,
        started_at: row.started_at,
        finished_at: row.finished_at,
        handed_off_at: row.handed_off_at,
        launched_at: row.launched_at,
    }))
}
