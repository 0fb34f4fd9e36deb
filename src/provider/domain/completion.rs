//! Completion requests, responses and resolved client configuration.

use super::{AiProvider, SecretString};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Ready-to-use configuration for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionClientConfig {
    /// Vendor protocol to speak.
    pub provider: AiProvider,
    /// Deployment type the configuration was resolved from.
    pub deployment_kind: &'static str,
    /// Endpoint base URL.
    pub base_url: String,
    /// Credential, when the endpoint requires one.
    pub api_key: Option<SecretString>,
    /// Model name.
    pub model: String,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Headers added to the request.
    pub extra_headers: BTreeMap<String, String>,
    /// REST API version, for deployments that pin one.
    pub api_version: Option<String>,
    /// `updated_at` of the configuration this was resolved from.
    pub resolved_from: DateTime<Utc>,
}

/// Prompt sent to the completion capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System instructions.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
}

impl CompletionRequest {
    /// Creates a request with no system instructions.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    /// Sets the system instructions.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Token accounting for a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Returns the sum of input and output tokens.
    #[must_use]
    pub const fn total(self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Completion text plus usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Raw model output.
    pub text: String,
    /// Tokens consumed.
    pub usage: TokenUsage,
}

/// Returns the outermost `{...}` span of a model response.
///
/// Models often wrap JSON in prose or Markdown code fences; everything
/// before the first `{` and after the last `}` is ignored.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}
