//! Diesel row models for task and task-source persistence.

use super::schema::{task_sources, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    pub id: uuid::Uuid,
    pub project_id: uuid::Uuid,
    pub source_id: uuid::Uuid,
    pub issue_key: String,
    pub title: String,
    pub description: Option<String>,
    pub remote_status: String,
    pub web_url: Option<String>,
    pub labels: Value,
    pub worker_repository: Option<String>,
    pub simple_status: String,
    pub simple_changed_at: DateTime<Utc>,
    pub simple_requeue_count: i32,
    pub simple_failure: Option<Value>,
    pub simple_result: Option<Value>,
    pub advanced_status: String,
    pub advanced_changed_at: DateTime<Utc>,
    pub advanced_requeue_count: i32,
    pub advanced_failure: Option<Value>,
    pub advanced_result: Option<Value>,
    pub implementation_status: String,
    pub implementation_changed_at: DateTime<Utc>,
    pub implementation_requeue_count: i32,
    pub implementation_failure: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert model for task records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    pub id: uuid::Uuid,
    pub project_id: uuid::Uuid,
    pub source_id: uuid::Uuid,
    pub issue_key: String,
    pub title: String,
    pub description: Option<String>,
    pub remote_status: String,
    pub web_url: Option<String>,
    pub labels: Value,
    pub worker_repository: Option<String>,
    pub simple_status: String,
    pub simple_changed_at: DateTime<Utc>,
    pub simple_requeue_count: i32,
    pub simple_failure: Option<Value>,
    pub simple_result: Option<Value>,
    pub advanced_status: String,
    pub advanced_changed_at: DateTime<Utc>,
    pub advanced_requeue_count: i32,
    pub advanced_failure: Option<Value>,
    pub advanced_result: Option<Value>,
    pub implementation_status: String,
    pub implementation_changed_at: DateTime<Utc>,
    pub implementation_requeue_count: i32,
    pub implementation_failure: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query result row for task source records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_sources)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskSourceRow {
    pub id: uuid::Uuid,
    pub project_id: uuid::Uuid,
    pub name: String,
    pub config: Value,
    pub sync_status: String,
    pub sync_changed_at: DateTime<Utc>,
    pub sync_requeue_count: i32,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert model for task source records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_sources)]
pub struct NewTaskSourceRow {
    pub id: uuid::Uuid,
    pub project_id: uuid::Uuid,
    pub name: String,
    pub config: Value,
    pub sync_status: String,
    pub sync_changed_at: DateTime<Utc>,
    pub sync_requeue_count: i32,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
