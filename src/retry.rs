//! Bounded exponential backoff for calls to external capabilities.
//!
//! Only errors that report themselves as transient are retried. Every retry
//! loop is capped by [`RetryPolicy::max_attempts`], so nothing is retried
//! indefinitely.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Classifies capability errors as retryable or not.
pub trait TransientError {
    /// Returns `true` when retrying the same call may succeed.
    fn is_transient(&self) -> bool;
}

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: u32,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt cap and backoff bounds.
    ///
    /// An attempt cap of zero is treated as one attempt.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            multiplier: 2,
        }
    }

    /// Policy that performs exactly one attempt.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 2,
        }
    }

    /// Overrides the backoff growth factor (minimum 1).
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Returns the maximum number of attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Failure returned once a retried operation gives up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The error was permanent; no further attempts were made.
    #[error("{error}")]
    Permanent {
        /// Underlying error.
        error: E,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Every allowed attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {error}")]
    Exhausted {
        /// Last transient error observed.
        error: E,
        /// Attempts made.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Returns the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent { error, .. } | Self::Exhausted { error, .. } => error,
        }
    }

    /// Returns the number of attempts made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempt cap is reached.
///
/// # Errors
///
/// Returns [`RetryError::Permanent`] for non-transient errors and
/// [`RetryError::Exhausted`] when every attempt failed transiently.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, RetryError<E>>
where
    E: TransientError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => {
                return Err(RetryError::Permanent {
                    error: err,
                    attempts: attempt,
                });
            }
            Err(err) if attempt >= policy.max_attempts() => {
                warn!(operation, attempt, error = %err, "giving up after transient failures");
                return Err(RetryError::Exhausted {
                    error: err,
                    attempts: attempt,
                });
            }
            Err(err) => {
                let delay = policy.backoff_after(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
