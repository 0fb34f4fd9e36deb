//! Opaque secret store contract.

use crate::provider::domain::{SecretId, SecretString};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for secret store operations.
pub type SecretStoreResult<T> = Result<T, SecretStoreError>;

/// Get/put access to secrets by reference. Encryption at rest is the
/// store's concern.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the secret for `id`, or `None` when it is absent.
    async fn get(&self, id: &SecretId) -> SecretStoreResult<Option<SecretString>>;

    /// Stores or replaces the secret for `id`.
    async fn put(&self, id: &SecretId, value: SecretString) -> SecretStoreResult<()>;
}

/// Errors returned by secret store implementations.
#[derive(Debug, Clone, Error)]
pub enum SecretStoreError {
    /// Backend failure.
    #[error("secret store error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl SecretStoreError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
