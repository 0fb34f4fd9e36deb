//! Diesel row model for processing locks.

use super::schema::processing_locks;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Lock row, readable from both DSL and raw `RETURNING` queries.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = processing_locks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LockRow {
    pub project_id: uuid::Uuid,
    pub issue_key: String,
    pub processing_worker_id: String,
    pub processing_started_at: DateTime<Utc>,
    pub timeout_seconds: i32,
    pub status: String,
}
