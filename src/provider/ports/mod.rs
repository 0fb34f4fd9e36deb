//! Port contracts for secrets, provider configuration and completions.

mod completion;
mod config_repository;
mod resolution;
mod secret_store;

#[cfg(test)]
pub use completion::MockCompletionClient;
pub use completion::{CompletionClient, CompletionError};
pub use config_repository::{
    ProviderConfigRepository, ProviderConfigRepositoryError, ProviderConfigRepositoryResult,
};
#[cfg(test)]
pub use resolution::MockStageProviderResolver;
pub use resolution::{ResolveError, ResolveResult, StageProviderResolver};
pub use secret_store::{SecretStore, SecretStoreError, SecretStoreResult};
