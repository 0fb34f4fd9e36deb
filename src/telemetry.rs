//! Structured logging bootstrap.

use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the configured filter.
pub const FILTER_OVERRIDE_ENV: &str = "RUST_LOG";

/// Log line rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(TelemetryError::UnknownFormat(value.to_owned())),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default `EnvFilter` directive, e.g. `foreman=debug,info`.
    pub filter: String,
    /// Output rendering.
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Pretty,
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive did not parse.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// Rejected directive.
        directive: String,
        /// Parser message.
        message: String,
    },
    /// The log format is not recognised.
    #[error("unknown log format '{0}', expected 'pretty' or 'json'")]
    UnknownFormat(String),
    /// A global subscriber is already installed.
    #[error("tracing subscriber already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Builds the filter from `override_directive` when present, else from the
/// configured directive.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when the chosen directive does
/// not parse.
pub fn build_filter(
    config: &TelemetryConfig,
    override_directive: Option<&str>,
) -> Result<EnvFilter, TelemetryError> {
    let directive = override_directive
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .unwrap_or(&config.filter);
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidFilter {
        directive: directive.to_owned(),
        message: err.to_string(),
    })
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG`, when set, replaces the configured filter.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a bad directive or
/// [`TelemetryError::AlreadyInitialised`] when a subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let override_directive = std::env::var(FILTER_OVERRIDE_ENV).ok();
    let filter = build_filter(config, override_directive.as_deref())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| TelemetryError::AlreadyInitialised(err.to_string()))?;
    tracing::debug!(format = config.format.as_str(), "tracing initialised");
    Ok(())
}
