//! Diesel row models for provider configuration.

use super::schema::{project_ai_settings, provider_configs};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row for provider configurations, used for reads and writes.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = provider_configs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProviderConfigRow {
    pub project_id: uuid::Uuid,
    pub provider: String,
    pub deployment: Value,
    pub model: String,
    pub max_tokens: i32,
    pub temperature: f32,
    pub extra_headers: Value,
    pub updated_at: DateTime<Utc>,
}

/// Row for project stage selections, used for reads and writes.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = project_ai_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProjectAiSettingsRow {
    pub project_id: uuid::Uuid,
    pub evaluation_provider: Option<String>,
    pub implementation_provider: Option<String>,
}
