//! In-memory pipeline repositories.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::implementation::domain::SessionId;
use crate::pipeline::{
    domain::{ExecutionGuard, PipelineArtifact, PipelineExecution, PipelineExecutionId, PipelineStatus},
    ports::{
        PipelineArtifactRepository, PipelineArtifactRepositoryError,
        PipelineArtifactRepositoryResult, PipelineExecutionRepository,
        PipelineExecutionRepositoryError, PipelineExecutionRepositoryResult,
    },
};
use crate::task::domain::GuardedUpdate;

/// Thread-safe in-memory pipeline execution repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineExecutionRepository {
    executions: Arc<RwLock<HashMap<PipelineExecutionId, PipelineExecution>>>,
}

impl InMemoryPipelineExecutionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn select<F>(
        &self,
        limit: usize,
        keep: F,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>>
    where
        F: Fn(&PipelineExecution) -> bool,
    {
        let executions = self.executions.read().map_err(execution_poisoned)?;
        let mut matching: Vec<PipelineExecution> =
            executions.values().filter(|execution| keep(execution)).cloned().collect();
        matching.sort_by_key(PipelineExecution::last_status_update);
        matching.truncate(limit);
        Ok(matching)
    }
}

fn execution_poisoned<E: std::fmt::Display>(err: E) -> PipelineExecutionRepositoryError {
    PipelineExecutionRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

fn artifact_poisoned<E: std::fmt::Display>(err: E) -> PipelineArtifactRepositoryError {
    PipelineArtifactRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl PipelineExecutionRepository for InMemoryPipelineExecutionRepository {
    async fn store(&self, execution: &PipelineExecution) -> PipelineExecutionRepositoryResult<()> {
        let mut executions = self.executions.write().map_err(execution_poisoned)?;
        if executions.contains_key(&execution.id()) {
            return Err(PipelineExecutionRepositoryError::DuplicateExecution(
                execution.id(),
            ));
        }
        executions.insert(execution.id(), execution.clone());
        Ok(())
    }

    async fn update_guarded(
        &self,
        execution: &PipelineExecution,
        guard: &ExecutionGuard,
    ) -> PipelineExecutionRepositoryResult<GuardedUpdate> {
        let mut executions = self.executions.write().map_err(execution_poisoned)?;
        let stored = executions
            .get_mut(&execution.id())
            .ok_or(PipelineExecutionRepositoryError::NotFound(execution.id()))?;
        if !stored.matches_guard(guard) {
            return Ok(GuardedUpdate::Conflict);
        }
        stored.clone_from(execution);
        Ok(GuardedUpdate::Applied)
    }

    async fn find_by_id(
        &self,
        id: PipelineExecutionId,
    ) -> PipelineExecutionRepositoryResult<Option<PipelineExecution>> {
        let executions = self.executions.read().map_err(execution_poisoned)?;
        Ok(executions.get(&id).cloned())
    }

    async fn list_by_session(
        &self,
        session_id: SessionId,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>> {
        let executions = self.executions.read().map_err(execution_poisoned)?;
        let mut matching: Vec<PipelineExecution> = executions
            .values()
            .filter(|execution| execution.session_id() == session_id)
            .cloned()
            .collect();
        matching.sort_by_key(PipelineExecution::started_at);
        Ok(matching)
    }

    async fn list_active(
        &self,
        limit: usize,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>> {
        self.select(limit, |execution| !execution.status().is_terminal())
    }

    async fn list_unrecorded_successes(
        &self,
        limit: usize,
    ) -> PipelineExecutionRepositoryResult<Vec<PipelineExecution>> {
        self.select(limit, |execution| {
            execution.status() == PipelineStatus::Success
                && execution.artifacts_recorded_at().is_none()
        })
    }
}

/// Thread-safe in-memory artifact repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineArtifactRepository {
    artifacts: Arc<RwLock<Vec<PipelineArtifact>>>,
}

impl InMemoryPipelineArtifactRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineArtifactRepository for InMemoryPipelineArtifactRepository {
    async fn insert_if_absent(
        &self,
        artifact: &PipelineArtifact,
    ) -> PipelineArtifactRepositoryResult<bool> {
        let mut artifacts = self.artifacts.write().map_err(artifact_poisoned)?;
        let exists = artifacts.iter().any(|stored| {
            stored.execution_id() == artifact.execution_id()
                && stored.natural_key() == artifact.natural_key()
        });
        if exists {
            return Ok(false);
        }
        artifacts.push(artifact.clone());
        Ok(true)
    }

    async fn list_by_execution(
        &self,
        execution_id: PipelineExecutionId,
    ) -> PipelineArtifactRepositoryResult<Vec<PipelineArtifact>> {
        let artifacts = self.artifacts.read().map_err(artifact_poisoned)?;
        Ok(artifacts
            .iter()
            .filter(|artifact| artifact.execution_id() == execution_id)
            .cloned()
            .collect())
    }
}
