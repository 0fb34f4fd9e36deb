//! Secret and AI provider resolution.
//!
//! Each project selects an AI provider per stage. The selected provider's
//! [`domain::AiProviderConfig`] names a deployment variant whose secret
//! references are dereferenced through a [`ports::SecretStore`] at call time,
//! producing a [`domain::CompletionClientConfig`] for the
//! [`ports::CompletionClient`] capability. There is no process-wide provider
//! selection and no fallback between providers.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

pub use domain::{SecretId, SecretString};

#[cfg(test)]
mod tests;
