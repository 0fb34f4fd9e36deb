//! Per-project AI provider configuration.

use super::{ProviderDomainError, SecretId};
use crate::task::domain::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// AI vendor whose models serve completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    /// Anthropic models.
    Anthropic,
    /// `OpenAI` models.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google models.
    Google,
}

impl AiProvider {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
        }
    }

    /// Returns the vendor's public API base URL.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

impl TryFrom<&str> for AiProvider {
    type Error = ProviderDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "google" => Ok(Self::Google),
            other => Err(ProviderDomainError::UnknownProvider(other.to_owned())),
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how a provider's models are reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderDeployment {
    /// The vendor's own public API.
    Cloud {
        /// API key reference.
        api_key_secret: SecretId,
        /// Override for the vendor's base URL.
        #[serde(default)]
        base_url: Option<String>,
    },
    /// Azure-hosted deployment.
    Azure {
        /// API key reference.
        api_key_secret: SecretId,
        /// Resource endpoint, e.g. `https://acme.openai.azure.com`.
        endpoint: String,
        /// Deployment name.
        deployment: String,
        /// REST API version.
        api_version: String,
    },
    /// Google Cloud Vertex AI.
    Vertex {
        /// Service credentials reference.
        credentials_secret: SecretId,
        /// GCP project identifier.
        project_id: String,
        /// GCP region.
        location: String,
    },
    /// Operator-run endpoint speaking the vendor protocol.
    SelfHosted {
        /// Endpoint base URL.
        base_url: String,
        /// Optional API key reference.
        #[serde(default)]
        api_key_secret: Option<SecretId>,
    },
}

impl ProviderDeployment {
    /// Returns the deployment type name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Cloud { .. } => "cloud",
            Self::Azure { .. } => "azure",
            Self::Vertex { .. } => "vertex",
            Self::SelfHosted { .. } => "self_hosted",
        }
    }

    /// Returns why this deployment cannot serve `provider`, if it cannot.
    #[must_use]
    pub const fn unsupported_reason(&self, provider: AiProvider) -> Option<&'static str> {
        match (self, provider) {
            (Self::Azure { .. }, AiProvider::Anthropic | AiProvider::Google) => {
                Some("azure deployments serve openai models only")
            }
            (Self::Vertex { .. }, AiProvider::OpenAi) => {
                Some("vertex deployments do not serve openai models")
            }
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ProviderDomainError> {
        let required: &[(&'static str, &str)] = match self {
            Self::Cloud { .. } => &[],
            Self::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => &[
                ("endpoint", endpoint.as_str()),
                ("deployment", deployment.as_str()),
                ("api_version", api_version.as_str()),
            ],
            Self::Vertex {
                project_id,
                location,
                ..
            } => &[("project_id", project_id.as_str()), ("location", location.as_str())],
            Self::SelfHosted { base_url, .. } => &[("base_url", base_url.as_str())],
        };
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(ProviderDomainError::EmptyDeploymentField(field)),
            None => Ok(()),
        }
    }
}

/// Configuration of one provider for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiProviderConfig {
    /// Owning project.
    pub project_id: ProjectId,
    /// Vendor configured.
    pub provider: AiProvider,
    /// Deployment variant.
    pub deployment: ProviderDeployment,
    /// Model name passed to the completion capability.
    pub model: String,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Headers added to every request.
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    /// Last modification; resolution never outlives it.
    pub updated_at: DateTime<Utc>,
}

impl AiProviderConfig {
    /// Creates a configuration with `max_tokens = 4096` and
    /// `temperature = 0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError`] when the model is blank or a
    /// deployment field required by the variant is blank.
    pub fn new(
        project_id: ProjectId,
        provider: AiProvider,
        deployment: ProviderDeployment,
        model: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProviderDomainError> {
        let config = Self {
            project_id,
            provider,
            deployment,
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.0,
            extra_headers: BTreeMap::new(),
            updated_at,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the sampling parameters.
    #[must_use]
    pub const fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Checks field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ProviderDomainError> {
        if self.model.trim().is_empty() {
            return Err(ProviderDomainError::EmptyModel);
        }
        if self.max_tokens == 0 {
            return Err(ProviderDomainError::ZeroMaxTokens);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ProviderDomainError::TemperatureOutOfRange(
                self.temperature.to_string(),
            ));
        }
        self.deployment.validate()
    }
}

/// Engine stage that makes completion calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiStage {
    /// Simple and advanced evaluation passes.
    Evaluation,
    /// Change-set generation.
    Implementation,
}

impl AiStage {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evaluation => "evaluation",
            Self::Implementation => "implementation",
        }
    }
}

impl fmt::Display for AiStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project's provider selection per stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAiSettings {
    /// Owning project.
    pub project_id: ProjectId,
    /// Provider used for evaluations.
    pub evaluation_provider: Option<AiProvider>,
    /// Provider used for implementation.
    pub implementation_provider: Option<AiProvider>,
}

impl ProjectAiSettings {
    /// Creates settings with no provider selected.
    #[must_use]
    pub const fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            evaluation_provider: None,
            implementation_provider: None,
        }
    }

    /// Returns the provider selected for `stage`.
    #[must_use]
    pub const fn provider_for(&self, stage: AiStage) -> Option<AiProvider> {
        match stage {
            AiStage::Evaluation => self.evaluation_provider,
            AiStage::Implementation => self.implementation_provider,
        }
    }
}
