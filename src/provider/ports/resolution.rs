//! Stage-level provider resolution seam used by the AI stages.

use crate::provider::domain::{
    AiProvider, AiStage, CompletionClientConfig, ProviderDomainError, SecretId,
};
use crate::provider::ports::{ProviderConfigRepositoryError, SecretStoreError};
use crate::task::domain::ProjectId;
use async_trait::async_trait;
use thiserror::Error;

/// Resolves the completion configuration a project selected for a stage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StageProviderResolver: Send + Sync {
    /// Resolves the provider selected for `stage` in `project_id`.
    async fn resolve_for_stage(
        &self,
        project_id: ProjectId,
        stage: AiStage,
    ) -> ResolveResult<CompletionClientConfig>;
}

/// Errors returned while resolving a completion client configuration.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The project has no usable configuration for the request.
    #[error("AI provider not configured for project {project_id}: {reason}")]
    NotConfigured {
        /// Project resolved for.
        project_id: ProjectId,
        /// Provider requested, when one was selected.
        provider: Option<AiProvider>,
        /// Human-readable cause.
        reason: String,
    },
    /// A referenced secret is absent from the store.
    #[error("secret '{secret}' referenced by {provider} configuration is missing")]
    SecretMissing {
        /// Provider whose configuration references the secret.
        provider: AiProvider,
        /// Missing reference.
        secret: SecretId,
    },
    /// The stored configuration is invalid.
    #[error(transparent)]
    Invalid(#[from] ProviderDomainError),
    /// Configuration lookup failed.
    #[error(transparent)]
    Configs(#[from] ProviderConfigRepositoryError),
    /// Secret lookup failed.
    #[error(transparent)]
    Secrets(#[from] SecretStoreError),
}

impl ResolveError {
    /// Returns `true` for failures an operator must fix in configuration,
    /// as opposed to infrastructure failures.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured { .. } | Self::SecretMissing { .. } | Self::Invalid(_)
        )
    }
}

/// Result type for provider resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

