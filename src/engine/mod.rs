//! Per-stage worker loops.
//!
//! Each [`Stage`] runs on its own timer in its own task, so a slow CI poll
//! never delays evaluation or sweeping. Loops stop when the shared
//! [`CancellationToken`] is cancelled. A tick already running gets the
//! shutdown grace to finish; one abandoned after that leaves only state the
//! sweeper recovers.

mod stages;

pub use stages::{
    ArtifactStage, EvaluationStage, ImplementationStage, PipelineStage, SweepStage, SyncStage,
};

use crate::evaluation::services::EvaluationError;
use crate::implementation::services::ImplementationError;
use crate::pipeline::services::{PipelineError, RecordError};
use crate::recovery::RecoveryError;
use crate::sync::services::SyncError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error surfaced by one stage tick.
#[derive(Debug, Error)]
pub enum StageError {
    /// Sync stage failure.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// Evaluation stage failure.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    /// Implementation stage failure.
    #[error(transparent)]
    Implementation(#[from] ImplementationError),
    /// Pipeline stage failure.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Artifact stage failure.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// Sweeper failure.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

/// One independently scheduled unit of engine work.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Processes one batch and returns how many items it handled.
    async fn tick(&self) -> Result<usize, StageError>;
}

struct ScheduledStage {
    stage: Arc<dyn Stage>,
    interval: Duration,
}

/// How long a tick already in flight at shutdown may keep running.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Collection of stages driven until cancellation.
pub struct Engine {
    stages: Vec<ScheduledStage>,
    shutdown_grace: Duration,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl Engine {
    /// Creates an engine with no stages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long an in-flight tick may run on after cancellation before
    /// it is abandoned.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Adds `stage`, ticking every `interval`.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Stage + 'static, interval: Duration) -> Self {
        self.stages.push(ScheduledStage {
            stage: Arc::new(stage),
            interval,
        });
        self
    }

    /// Runs every stage until `cancel` fires, then waits for the loops to
    /// stop. A tick in flight when `cancel` fires is allowed to finish within
    /// the shutdown grace so its status writes land.
    pub async fn run(self, cancel: CancellationToken) {
        let mut loops = JoinSet::new();
        for scheduled in self.stages {
            loops.spawn(run_stage(scheduled, cancel.child_token(), self.shutdown_grace));
        }
        info!(stages = loops.len(), "engine started");
        while let Some(joined) = loops.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "stage loop aborted");
            }
        }
        info!("engine stopped");
    }
}

async fn run_stage(scheduled: ScheduledStage, cancel: CancellationToken, grace: Duration) {
    let ScheduledStage { stage, interval } = scheduled;
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let mut tick = std::pin::pin!(stage.tick());
        tokio::select! {
            biased;
            result = &mut tick => report(stage.name(), &result),
            () = cancel.cancelled() => {
                debug!(stage = stage.name(), "finishing in-flight tick before stopping");
                match tokio::time::timeout(grace, &mut tick).await {
                    Ok(result) => report(stage.name(), &result),
                    Err(_) => warn!(
                        stage = stage.name(),
                        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                        "in-flight tick abandoned after shutdown grace"
                    ),
                }
                break;
            }
        }
    }
    debug!(stage = stage.name(), "stage loop stopped");
}

fn report(stage: &'static str, result: &Result<usize, StageError>) {
    match result {
        Ok(0) => {}
        Ok(handled) => debug!(stage, handled, "stage tick"),
        Err(err) => warn!(stage, error = %err, "stage tick failed"),
    }
}
