//! In-memory secret store and provider configuration repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::provider::{
    domain::{AiProvider, AiProviderConfig, ProjectAiSettings, SecretId, SecretString},
    ports::{
        ProviderConfigRepository, ProviderConfigRepositoryError, ProviderConfigRepositoryResult,
        SecretStore, SecretStoreError, SecretStoreResult,
    },
};
use crate::task::domain::ProjectId;

/// Thread-safe in-memory secret store.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<SecretId, SecretString>>>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, id: &SecretId) -> SecretStoreResult<Option<SecretString>> {
        let secrets = self
            .secrets
            .read()
            .map_err(|err| SecretStoreError::backend(std::io::Error::other(err.to_string())))?;
        Ok(secrets.get(id).cloned())
    }

    async fn put(&self, id: &SecretId, value: SecretString) -> SecretStoreResult<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|err| SecretStoreError::backend(std::io::Error::other(err.to_string())))?;
        secrets.insert(id.clone(), value);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    configs: HashMap<(ProjectId, AiProvider), AiProviderConfig>,
    settings: HashMap<ProjectId, ProjectAiSettings>,
}

/// Thread-safe in-memory provider configuration repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProviderConfigRepository {
    state: Arc<RwLock<ProviderState>>,
}

impl InMemoryProviderConfigRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> ProviderConfigRepositoryError {
    ProviderConfigRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ProviderConfigRepository for InMemoryProviderConfigRepository {
    async fn upsert_config(&self, config: &AiProviderConfig) -> ProviderConfigRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .configs
            .insert((config.project_id, config.provider), config.clone());
        Ok(())
    }

    async fn find_config(
        &self,
        project_id: ProjectId,
        provider: AiProvider,
    ) -> ProviderConfigRepositoryResult<Option<AiProviderConfig>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.configs.get(&(project_id, provider)).cloned())
    }

    async fn upsert_settings(
        &self,
        settings: &ProjectAiSettings,
    ) -> ProviderConfigRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.settings.insert(settings.project_id, settings.clone());
        Ok(())
    }

    async fn find_settings(
        &self,
        project_id: ProjectId,
    ) -> ProviderConfigRepositoryResult<Option<ProjectAiSettings>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.settings.get(&project_id).cloned())
    }
}
