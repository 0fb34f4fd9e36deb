//! `PostgreSQL` implementation of the provider configuration repository.

use super::{
    models::{ProjectAiSettingsRow, ProviderConfigRow},
    schema::{project_ai_settings, provider_configs},
};
use crate::persistence::{PgPool, counter_from_db, counter_to_db, persistence_failure, run_blocking};
use crate::provider::{
    domain::{AiProvider, AiProviderConfig, ProjectAiSettings},
    ports::{
        ProviderConfigRepository, ProviderConfigRepositoryError, ProviderConfigRepositoryResult,
    },
};
use crate::task::domain::ProjectId;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;

persistence_failure!(ProviderConfigRepositoryError);

/// `PostgreSQL`-backed provider configuration repository.
#[derive(Debug, Clone)]
pub struct PostgresProviderConfigRepository {
    pool: PgPool,
}

impl PostgresProviderConfigRepository {
    /// Creates a repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderConfigRepository for PostgresProviderConfigRepository {
    async fn upsert_config(&self, config: &AiProviderConfig) -> ProviderConfigRepositoryResult<()> {
        let row = to_config_row(config)?;
        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(provider_configs::table)
                .values(&row)
                .on_conflict((provider_configs::project_id, provider_configs::provider))
                .do_update()
                .set((
                    provider_configs::deployment.eq(excluded(provider_configs::deployment)),
                    provider_configs::model.eq(excluded(provider_configs::model)),
                    provider_configs::max_tokens.eq(excluded(provider_configs::max_tokens)),
                    provider_configs::temperature.eq(excluded(provider_configs::temperature)),
                    provider_configs::extra_headers.eq(excluded(provider_configs::extra_headers)),
                    provider_configs::updated_at.eq(excluded(provider_configs::updated_at)),
                ))
                .execute(connection)
                .map_err(ProviderConfigRepositoryError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn find_config(
        &self,
        project_id: ProjectId,
        provider: AiProvider,
    ) -> ProviderConfigRepositoryResult<Option<AiProviderConfig>> {
        run_blocking(&self.pool, move |connection| {
            let row = provider_configs::table
                .filter(provider_configs::project_id.eq(project_id.into_inner()))
                .filter(provider_configs::provider.eq(provider.as_str()))
                .select(ProviderConfigRow::as_select())
                .first::<ProviderConfigRow>(connection)
                .optional()
                .map_err(ProviderConfigRepositoryError::persistence)?;
            row.map(row_to_config).transpose()
        })
        .await
    }

    async fn upsert_settings(
        &self,
        settings: &ProjectAiSettings,
    ) -> ProviderConfigRepositoryResult<()> {
        let row = ProjectAiSettingsRow {
            project_id: settings.project_id.into_inner(),
            evaluation_provider: settings.evaluation_provider.map(|provider| provider.as_str().to_owned()),
            implementation_provider: settings
                .implementation_provider
                .map(|provider| provider.as_str().to_owned()),
        };
        run_blocking(&self.pool, move |connection| {
            diesel::insert_into(project_ai_settings::table)
                .values(&row)
                .on_conflict(project_ai_settings::project_id)
                .do_update()
                .set((
                    project_ai_settings::evaluation_provider
                        .eq(excluded(project_ai_settings::evaluation_provider)),
                    project_ai_settings::implementation_provider
                        .eq(excluded(project_ai_settings::implementation_provider)),
                ))
                .execute(connection)
                .map_err(ProviderConfigRepositoryError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn find_settings(
        &self,
        project_id: ProjectId,
    ) -> ProviderConfigRepositoryResult<Option<ProjectAiSettings>> {
        run_blocking(&self.pool, move |connection| {
            let row = project_ai_settings::table
                .filter(project_ai_settings::project_id.eq(project_id.into_inner()))
                .select(ProjectAiSettingsRow::as_select())
                .first::<ProjectAiSettingsRow>(connection)
                .optional()
                .map_err(ProviderConfigRepositoryError::persistence)?;
            row.map(row_to_settings).transpose()
        })
        .await
    }
}

fn to_config_row(config: &AiProviderConfig) -> ProviderConfigRepositoryResult<ProviderConfigRow> {
    Ok(ProviderConfigRow {
        project_id: config.project_id.into_inner(),
        provider: config.provider.as_str().to_owned(),
        deployment: serde_json::to_value(&config.deployment)
            .map_err(ProviderConfigRepositoryError::persistence)?,
        model: config.model.clone(),
        max_tokens: counter_to_db(config.max_tokens)?,
        temperature: config.temperature,
        extra_headers: serde_json::to_value(&config.extra_headers)
            .map_err(ProviderConfigRepositoryError::persistence)?,
        updated_at: config.updated_at,
    })
}

fn parse_provider(value: &str) -> ProviderConfigRepositoryResult<AiProvider> {
    AiProvider::try_from(value).map_err(ProviderConfigRepositoryError::persistence)
}

fn row_to_config(row: ProviderConfigRow) -> ProviderConfigRepositoryResult<AiProviderConfig> {
    let config = AiProviderConfig {
        project_id: ProjectId::from_uuid(row.project_id),
        provider: parse_provider(&row.provider)?,
        deployment: serde_json::from_value(row.deployment)
            .map_err(ProviderConfigRepositoryError::persistence)?,
        model: row.model,
        max_tokens: counter_from_db(row.max_tokens)?,
        temperature: row.temperature,
        extra_headers: serde_json::from_value(row.extra_headers)
            .map_err(ProviderConfigRepositoryError::persistence)?,
        updated_at: row.updated_at,
    };
    config
        .validate()
        .map_err(ProviderConfigRepositoryError::persistence)?;
    Ok(config)
}

fn row_to_settings(row: ProjectAiSettingsRow) -> ProviderConfigRepositoryResult<ProjectAiSettings> {
    Ok(ProjectAiSettings {
        project_id: ProjectId::from_uuid(row.project_id),
        evaluation_provider: row.evaluation_provider.as_deref().map(parse_provider).transpose()?,
        implementation_provider: row
            .implementation_provider
            .as_deref()
            .map(parse_provider)
            .transpose()?,
    })
}
