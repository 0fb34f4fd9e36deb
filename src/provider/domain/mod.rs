//! Domain types for provider configuration and completions.

mod completion;
mod config;
mod error;
mod secret;

pub use completion::{
    Completion, CompletionClientConfig, CompletionRequest, TokenUsage, extract_json_object,
};
pub use config::{AiProvider, AiProviderConfig, AiStage, ProjectAiSettings, ProviderDeployment};
pub use error::ProviderDomainError;
pub use secret::{SecretId, SecretString};
