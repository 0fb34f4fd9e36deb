//! Provider configuration storage contract.

use crate::provider::domain::{AiProvider, AiProviderConfig, ProjectAiSettings};
use crate::task::domain::ProjectId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for provider configuration repository operations.
pub type ProviderConfigRepositoryResult<T> = Result<T, ProviderConfigRepositoryError>;

/// Storage for per-project provider configurations and stage selections.
#[async_trait]
pub trait ProviderConfigRepository: Send + Sync {
    /// Inserts or replaces the configuration for its (project, provider).
    async fn upsert_config(&self, config: &AiProviderConfig) -> ProviderConfigRepositoryResult<()>;

    /// Returns the configuration for `provider` in `project_id`.
    async fn find_config(
        &self,
        project_id: ProjectId,
        provider: AiProvider,
    ) -> ProviderConfigRepositoryResult<Option<AiProviderConfig>>;

    /// Inserts or replaces the stage selection of a project.
    async fn upsert_settings(
        &self,
        settings: &ProjectAiSettings,
    ) -> ProviderConfigRepositoryResult<()>;

    /// Returns the stage selection of `project_id`.
    async fn find_settings(
        &self,
        project_id: ProjectId,
    ) -> ProviderConfigRepositoryResult<Option<ProjectAiSettings>>;
}

/// Errors returned by provider configuration repositories.
#[derive(Debug, Clone, Error)]
pub enum ProviderConfigRepositoryError {
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ProviderConfigRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
