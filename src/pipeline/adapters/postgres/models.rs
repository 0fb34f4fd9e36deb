//! Diesel row models for pipeline tables.

use super::schema::{pipeline_artifacts, pipeline_executions};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for pipeline executions.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pipeline_executions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ExecutionRow {
    pub id: uuid::Uuid,
    pub session_id: uuid::Uuid,
    pub task_id: Option<uuid::Uuid>,
    pub worker_repository: String,
    pub git_ref: String,
    pub handle: Option<String>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub last_status_update: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub outputs: Value,
    pub artifacts_recorded_at: Option<DateTime<Utc>>,
}

/// Insert model for pipeline executions.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pipeline_executions)]
pub struct NewExecutionRow {
    pub id: uuid::Uuid,
    pub session_id: uuid::Uuid,
    pub task_id: Option<uuid::Uuid>,
    pub worker_repository: String,
    pub git_ref: String,
    pub handle: Option<String>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub last_status_update: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub outputs: Value,
    pub artifacts_recorded_at: Option<DateTime<Utc>>,
}

/// Query result row for pipeline artifacts.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pipeline_artifacts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ArtifactRow {
    pub id: uuid::Uuid,
    pub pipeline_execution_id: uuid::Uuid,
    pub artifact_type: String,
    pub reference_url: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Insert model for pipeline artifacts.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pipeline_artifacts)]
pub struct NewArtifactRow {
    pub id: uuid::Uuid,
    pub pipeline_execution_id: uuid::Uuid,
    pub artifact_type: String,
    pub reference_url: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
