//! Resolution of a project's provider selection into client configuration.

use crate::provider::{
    domain::{
        AiProvider, AiProviderConfig, AiStage, CompletionClientConfig, ProviderDeployment,
        SecretId, SecretString,
    },
    ports::{
        ProviderConfigRepository, ResolveError, ResolveResult, SecretStore,
        StageProviderResolver,
    },
};
use crate::task::domain::ProjectId;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Resolves provider configuration at call time.
///
/// Nothing is cached: every call reads the current configuration and
/// secrets, so a configuration change takes effect on the next call.
#[derive(Clone)]
pub struct ProviderResolver<R, S>
where
    R: ProviderConfigRepository,
    S: SecretStore,
{
    configs: Arc<R>,
    secrets: Arc<S>,
}

impl<R, S> ProviderResolver<R, S>
where
    R: ProviderConfigRepository,
    S: SecretStore,
{
    /// Creates a resolver.
    #[must_use]
    pub const fn new(configs: Arc<R>, secrets: Arc<S>) -> Self {
        Self { configs, secrets }
    }

    /// Resolves `provider` for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotConfigured`] when the project has no
    /// configuration for `provider` or its deployment cannot serve it, and
    /// [`ResolveError::SecretMissing`] when a referenced secret is absent.
    pub async fn resolve(
        &self,
        project_id: ProjectId,
        provider: AiProvider,
    ) -> ResolveResult<CompletionClientConfig> {
        let config = self
            .configs
            .find_config(project_id, provider)
            .await?
            .ok_or_else(|| ResolveError::NotConfigured {
                project_id,
                provider: Some(provider),
                reason: format!("no {provider} configuration"),
            })?;
        config.validate()?;
        if let Some(reason) = config.deployment.unsupported_reason(provider) {
            return Err(ResolveError::NotConfigured {
                project_id,
                provider: Some(provider),
                reason: reason.to_owned(),
            });
        }
        let resolved = self.assemble(&config).await?;
        debug!(
            project_id = %project_id,
            provider = %provider,
            deployment = resolved.deployment_kind,
            model = %resolved.model,
            "provider resolved"
        );
        Ok(resolved)
    }

    /// Resolves the provider the project selected for `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotConfigured`] when no provider is selected
    /// for the stage, plus every error of [`Self::resolve`].
    pub async fn resolve_for_stage(
        &self,
        project_id: ProjectId,
        stage: AiStage,
    ) -> ResolveResult<CompletionClientConfig> {
        let provider = self
            .configs
            .find_settings(project_id)
            .await?
            .and_then(|settings| settings.provider_for(stage))
            .ok_or_else(|| ResolveError::NotConfigured {
                project_id,
                provider: None,
                reason: format!("no provider selected for {stage}"),
            })?;
        self.resolve(project_id, provider).await
    }

    async fn assemble(&self, config: &AiProviderConfig) -> ResolveResult<CompletionClientConfig> {
        let provider = config.provider;
        let (base_url, api_key, api_version) = match &config.deployment {
            ProviderDeployment::Cloud {
                api_key_secret,
                base_url,
            } => (
                base_url
                    .clone()
                    .unwrap_or_else(|| provider.default_base_url().to_owned()),
                Some(self.require_secret(provider, api_key_secret).await?),
                None,
            ),
            ProviderDeployment::Azure {
                api_key_secret,
                endpoint,
                deployment,
                api_version,
            } => (
                format!(
                    "{}/openai/deployments/{deployment}",
                    endpoint.trim_end_matches('/')
                ),
                Some(self.require_secret(provider, api_key_secret).await?),
                Some(api_version.clone()),
            ),
            ProviderDeployment::Vertex {
                credentials_secret,
                project_id,
                location,
            } => (
                format!(
                    "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/publishers/{}",
                    provider.as_str()
                ),
                Some(self.require_secret(provider, credentials_secret).await?),
                None,
            ),
            ProviderDeployment::SelfHosted {
                base_url,
                api_key_secret,
            } => {
                let api_key = match api_key_secret {
                    Some(secret) => Some(self.require_secret(provider, secret).await?),
                    None => None,
                };
                (base_url.trim_end_matches('/').to_owned(), api_key, None)
            }
        };
        Ok(CompletionClientConfig {
            provider,
            deployment_kind: config.deployment.kind(),
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            extra_headers: config.extra_headers.clone(),
            api_version,
            resolved_from: config.updated_at,
        })
    }

    async fn require_secret(
        &self,
        provider: AiProvider,
        secret: &SecretId,
    ) -> ResolveResult<SecretString> {
        self.secrets
            .get(secret)
            .await?
            .ok_or_else(|| ResolveError::SecretMissing {
                provider,
                secret: secret.clone(),
            })
    }
}

#[async_trait]
impl<R, S> StageProviderResolver for ProviderResolver<R, S>
where
    R: ProviderConfigRepository,
    S: SecretStore,
{
    async fn resolve_for_stage(
        &self,
        project_id: ProjectId,
        stage: AiStage,
    ) -> ResolveResult<CompletionClientConfig> {
        Self::resolve_for_stage(self, project_id, stage).await
    }
}
