//! Environment-level engine configuration.
//!
//! Values come from [`EngineConfig::default`], optionally a TOML document,
//! and finally `FOREMAN_*` variables layered on top. Every value is
//! validated before the engine sees it.

use crate::evaluation::services::EvaluationSettings;
use crate::implementation::services::ImplementationSettings;
use crate::lock::domain::WorkerId;
use crate::pipeline::services::MonitorSettings;
use crate::recovery::SweepConfig;
use crate::retry::RetryPolicy;
use crate::sync::services::SyncSettings;
use crate::task::domain::AdvancedEvaluationPolicy;
use crate::telemetry::{LogFormat, TelemetryConfig};
use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix shared by every environment variable read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "FOREMAN_";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document did not parse.
    #[error("invalid configuration document: {0}")]
    Parse(#[source] Box<toml::de::Error>),
    /// A value was out of range or did not parse.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Configuration key or environment variable.
        key: String,
        /// Rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for every engine stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Identity this process takes processing locks under.
    pub worker_id: String,
    /// Seconds between sync scheduling passes; sources older than this are
    /// re-synced.
    pub sync_interval_seconds: u64,
    /// Minutes after which a `syncing` source counts as stalled.
    pub stuck_sync_minutes: u32,
    /// Seconds between evaluation queue polls.
    pub evaluation_poll_interval_seconds: u64,
    /// Minutes after which a `running` evaluation is failed.
    pub stuck_evaluation_minutes: u32,
    /// Minutes after which an `implementing` implementation is failed.
    pub stuck_implementation_minutes: u32,
    /// Minutes after which a `queued` axis is requeued.
    pub queued_timeout_minutes: u32,
    /// Requeues granted before stalled work is failed.
    pub max_requeues: u32,
    /// Seconds between polls of one pipeline execution.
    pub pipeline_poll_interval_seconds: u64,
    /// Wall-clock ceiling for a pipeline execution, in minutes.
    pub pipeline_timeout_minutes: u32,
    /// Minutes after which an unrecorded pipeline launch claim is retaken.
    pub pipeline_handoff_timeout_minutes: u32,
    /// Seconds after which a processing lock may be reclaimed.
    pub lock_timeout_seconds: u32,
    /// Seconds between recovery sweeps.
    pub sweep_interval_seconds: u64,
    /// Seconds an in-flight stage tick may run on after shutdown begins.
    pub shutdown_grace_seconds: u64,
    /// Attempts per transient-failure retry loop, including the first.
    pub retry_max_attempts: u32,
    /// First retry delay in milliseconds.
    pub retry_initial_backoff_ms: u64,
    /// Retry delay ceiling in milliseconds.
    pub retry_max_backoff_ms: u64,
    /// Backoff growth factor.
    pub retry_multiplier: u32,
    /// Whether implementation requires a completed advanced evaluation.
    pub advanced_evaluation_policy: AdvancedEvaluationPolicy,
    /// Runner name recorded on sessions.
    pub implementation_runner: String,
    /// Rows each stage takes per tick.
    pub batch_size: usize,
    /// Logging setup.
    pub telemetry: TelemetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_id: "foreman-worker".to_owned(),
            sync_interval_seconds: 300,
            stuck_sync_minutes: 15,
            evaluation_poll_interval_seconds: 30,
            stuck_evaluation_minutes: 15,
            stuck_implementation_minutes: 60,
            queued_timeout_minutes: 30,
            max_requeues: 3,
            pipeline_poll_interval_seconds: 600,
            pipeline_timeout_minutes: 30,
            pipeline_handoff_timeout_minutes: 15,
            lock_timeout_seconds: 60,
            sweep_interval_seconds: 60,
            shutdown_grace_seconds: 30,
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 500,
            retry_max_backoff_ms: 30_000,
            retry_multiplier: 2,
            advanced_evaluation_policy: AdvancedEvaluationPolicy::WhenRun,
            implementation_runner: "foreman".to_owned(),
            batch_size: 25,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, or
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn from_toml_str(document: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(document).map_err(|err| ConfigError::Parse(Box::new(err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `FOREMAN_*` variables from the process environment on top of
    /// the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable does not parse
    /// or validation fails.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `FOREMAN_*` variables through `lookup` on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable does not parse
    /// or validation fails.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_overrides(lookup)
    }

    /// Applies `FOREMAN_*` variables found through `lookup` and validates
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable does not parse
    /// or validation fails.
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides { lookup: &lookup };
        env.text("WORKER_ID", &mut self.worker_id);
        env.parsed("SYNC_INTERVAL_SECONDS", &mut self.sync_interval_seconds)?;
        env.parsed("STUCK_SYNC_MINUTES", &mut self.stuck_sync_minutes)?;
        env.parsed(
            "EVALUATION_POLL_INTERVAL_SECONDS",
            &mut self.evaluation_poll_interval_seconds,
        )?;
        env.parsed("STUCK_EVALUATION_MINUTES", &mut self.stuck_evaluation_minutes)?;
        env.parsed(
            "STUCK_IMPLEMENTATION_MINUTES",
            &mut self.stuck_implementation_minutes,
        )?;
        env.parsed("QUEUED_TIMEOUT_MINUTES", &mut self.queued_timeout_minutes)?;
        env.parsed("MAX_REQUEUES", &mut self.max_requeues)?;
        env.parsed(
            "PIPELINE_POLL_INTERVAL_SECONDS",
            &mut self.pipeline_poll_interval_seconds,
        )?;
        env.parsed("PIPELINE_TIMEOUT_MINUTES", &mut self.pipeline_timeout_minutes)?;
        env.parsed(
            "PIPELINE_HANDOFF_TIMEOUT_MINUTES",
            &mut self.pipeline_handoff_timeout_minutes,
        )?;
        env.parsed("LOCK_TIMEOUT_SECONDS", &mut self.lock_timeout_seconds)?;
        env.parsed("SWEEP_INTERVAL_SECONDS", &mut self.sweep_interval_seconds)?;
        env.parsed("SHUTDOWN_GRACE_SECONDS", &mut self.shutdown_grace_seconds)?;
        env.parsed("RETRY_MAX_ATTEMPTS", &mut self.retry_max_attempts)?;
        env.parsed("RETRY_INITIAL_BACKOFF_MS", &mut self.retry_initial_backoff_ms)?;
        env.parsed("RETRY_MAX_BACKOFF_MS", &mut self.retry_max_backoff_ms)?;
        env.parsed("RETRY_MULTIPLIER", &mut self.retry_multiplier)?;
        if let Some((key, raw)) = env.get("ADVANCED_EVALUATION_POLICY") {
            self.advanced_evaluation_policy = AdvancedEvaluationPolicy::try_from(raw.trim())
                .map_err(|err| invalid(key, &raw, err))?;
        }
        env.text("IMPLEMENTATION_RUNNER", &mut self.implementation_runner);
        env.parsed("BATCH_SIZE", &mut self.batch_size)?;
        env.text("LOG_FILTER", &mut self.telemetry.filter);
        if let Some((key, raw)) = env.get("LOG_FORMAT") {
            self.telemetry.format = raw
                .parse::<LogFormat>()
                .map_err(|err| invalid(key, &raw, err))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad key.
    pub fn validate(&self) -> ConfigResult<()> {
        WorkerId::new(self.worker_id.as_str())
            .map_err(|err| invalid("worker_id".to_owned(), &self.worker_id, err))?;
        let positive = [
            ("sync_interval_seconds", self.sync_interval_seconds),
            ("stuck_sync_minutes", u64::from(self.stuck_sync_minutes)),
            (
                "evaluation_poll_interval_seconds",
                self.evaluation_poll_interval_seconds,
            ),
            (
                "stuck_evaluation_minutes",
                u64::from(self.stuck_evaluation_minutes),
            ),
            (
                "stuck_implementation_minutes",
                u64::from(self.stuck_implementation_minutes),
            ),
            ("queued_timeout_minutes", u64::from(self.queued_timeout_minutes)),
            (
                "pipeline_poll_interval_seconds",
                self.pipeline_poll_interval_seconds,
            ),
            (
                "pipeline_timeout_minutes",
                u64::from(self.pipeline_timeout_minutes),
            ),
            (
                "pipeline_handoff_timeout_minutes",
                u64::from(self.pipeline_handoff_timeout_minutes),
            ),
            ("lock_timeout_seconds", u64::from(self.lock_timeout_seconds)),
            ("sweep_interval_seconds", self.sweep_interval_seconds),
            ("retry_max_attempts", u64::from(self.retry_max_attempts)),
            ("retry_multiplier", u64::from(self.retry_multiplier)),
            ("batch_size", u64::try_from(self.batch_size).unwrap_or(u64::MAX)),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(invalid((*key).to_owned(), "0", "must be greater than zero"));
        }
        if self.retry_max_backoff_ms < self.retry_initial_backoff_ms {
            return Err(invalid(
                "retry_max_backoff_ms".to_owned(),
                &self.retry_max_backoff_ms.to_string(),
                "must not be below retry_initial_backoff_ms",
            ));
        }
        if self.implementation_runner.trim().is_empty() {
            return Err(invalid(
                "implementation_runner".to_owned(),
                &self.implementation_runner,
                "must not be blank",
            ));
        }
        Ok(())
    }

    /// Backoff policy shared by every capability call.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
        .with_multiplier(self.retry_multiplier)
    }

    /// Synchronizer settings for this worker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the worker id is blank.
    pub fn sync_settings(&self) -> ConfigResult<SyncSettings> {
        let worker_id = WorkerId::new(self.worker_id.as_str())
            .map_err(|err| invalid("worker_id".to_owned(), &self.worker_id, err))?;
        Ok(SyncSettings {
            lock_timeout_seconds: self.lock_timeout_seconds,
            retry: self.retry_policy(),
            ..SyncSettings::new(worker_id)
        })
    }

    /// Evaluation gate settings.
    #[must_use]
    pub fn evaluation_settings(&self) -> EvaluationSettings {
        EvaluationSettings {
            runner: self.implementation_runner.clone(),
            retry: self.retry_policy(),
        }
    }

    /// Implementation dispatcher settings.
    #[must_use]
    pub fn implementation_settings(&self) -> ImplementationSettings {
        ImplementationSettings {
            runner: self.implementation_runner.clone(),
            policy: self.advanced_evaluation_policy,
            retry: self.retry_policy(),
        }
    }

    /// Pipeline monitor settings.
    #[must_use]
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: self.pipeline_poll_interval(),
            timeout: minutes(self.pipeline_timeout_minutes),
            retry: self.retry_policy(),
            handoff_timeout: minutes(self.pipeline_handoff_timeout_minutes),
        }
    }

    /// Recovery sweeper thresholds.
    #[must_use]
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            stuck_sync_after: minutes(self.stuck_sync_minutes),
            queued_timeout: minutes(self.queued_timeout_minutes),
            stuck_evaluation_timeout: minutes(self.stuck_evaluation_minutes),
            stuck_implementation_timeout: minutes(self.stuck_implementation_minutes),
            pipeline_timeout: minutes(self.pipeline_timeout_minutes),
            max_requeues: self.max_requeues,
            batch_size: self.batch_size,
        }
    }

    /// Delay between sync scheduling passes.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_seconds)
    }

    /// Age after which a completed source is synced again.
    #[must_use]
    pub fn sync_due_after(&self) -> chrono::Duration {
        i64::try_from(self.sync_interval_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Delay between evaluation queue polls.
    #[must_use]
    pub const fn evaluation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_poll_interval_seconds)
    }

    /// Delay between polls of one pipeline execution.
    #[must_use]
    pub const fn pipeline_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline_poll_interval_seconds)
    }

    /// Delay between recovery sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Time an in-flight stage tick may run on after shutdown begins.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

struct Overrides<'a, F> {
    lookup: &'a F,
}

impl<F> Overrides<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, suffix: &str) -> Option<(String, String)> {
        let key = format!("{ENV_PREFIX}{suffix}");
        (self.lookup)(&key).map(|value| (key, value))
    }

    fn text(&self, suffix: &str, target: &mut String) {
        if let Some((_, value)) = self.get(suffix) {
            *target = value;
        }
    }

    fn parsed<T>(&self, suffix: &str, target: &mut T) -> ConfigResult<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some((key, raw)) = self.get(suffix) {
            *target = raw.trim().parse().map_err(|err| invalid(key, &raw, err))?;
        }
        Ok(())
    }
}

fn invalid(key: String, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}

fn minutes(value: u32) -> chrono::Duration {
    chrono::Duration::minutes(i64::from(value))
}
