//! Validation errors for provider configuration values.

use thiserror::Error;

/// Errors returned while constructing provider configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderDomainError {
    /// A secret identifier is blank or contains whitespace.
    #[error("invalid secret id '{0}'")]
    InvalidSecretId(String),

    /// The provider name is unknown.
    #[error("unsupported AI provider: {0}")]
    UnknownProvider(String),

    /// The model name is blank.
    #[error("model name must not be empty")]
    EmptyModel,

    /// `max_tokens` must be positive.
    #[error("max_tokens must be positive")]
    ZeroMaxTokens,

    /// Temperature lies outside `0.0..=2.0`.
    #[error("temperature {0} outside 0.0..=2.0")]
    TemperatureOutOfRange(String),

    /// A deployment field required for the variant is blank.
    #[error("deployment field '{0}' must not be empty")]
    EmptyDeploymentField(&'static str),
}
