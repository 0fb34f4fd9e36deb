//! Diesel row models for sessions.

use super::schema::sessions;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for sessions.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionRow {
    pub id: uuid::Uuid,
    pub task_id: Option<uuid::Uuid>,
    pub kind: String,
    pub runner: String,
    pub status: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub prompt_digest: String,
    pub change_set: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub handed_off_at: Option<DateTime<Utc>>,
    pub launched_at: Option<DateTime<Utc>>,
}

/// Insert model for sessions.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSessionRow {
    pub id: uuid::Uuid,
    pub task_id: Option<uuid::Uuid>,
    pub kind: String,
    pub runner: String,
    pub status: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub prompt_digest: String,
    pub change_set: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub handed_off_at: Option<DateTime<Utc>>,
    pub launched_at: Option<DateTime<Utc>>,
}
