//! Immutable records of what a pipeline produced.

use super::{PipelineExecution, PipelineExecutionId};
use crate::identifier::uuid_identifier;
use crate::task::domain::ParseStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;

uuid_identifier!(
    /// Unique identifier for a pipeline artifact.
    PipelineArtifactId
);

/// Category of a recorded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Merge or pull request.
    MergeRequest,
    /// Issue opened by the run.
    Issue,
    /// Pushed branch.
    Branch,
    /// Produced commit.
    Commit,
    /// Execution summary.
    ExecutionResult,
    /// Free text.
    Text,
    /// Evaluation report.
    TaskEvaluation,
    /// Implementation report.
    TaskImplementation,
}

impl ArtifactType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MergeRequest => "merge_request",
            Self::Issue => "issue",
            Self::Branch => "branch",
            Self::Commit => "commit",
            Self::ExecutionResult => "execution_result",
            Self::Text => "text",
            Self::TaskEvaluation => "task_evaluation",
            Self::TaskImplementation => "task_implementation",
        }
    }
}

impl TryFrom<&str> for ArtifactType {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "merge_request" => Ok(Self::MergeRequest),
            "issue" => Ok(Self::Issue),
            "branch" => Ok(Self::Branch),
            "commit" => Ok(Self::Commit),
            "execution_result" => Ok(Self::ExecutionResult),
            "text" => Ok(Self::Text),
            "task_evaluation" => Ok(Self::TaskEvaluation),
            "task_implementation" => Ok(Self::TaskImplementation),
            _ => Err(ParseStatusError::new("artifact type", value)),
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a pipeline produced. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineArtifact {
    id: PipelineArtifactId,
    execution_id: PipelineExecutionId,
    artifact_type: ArtifactType,
    reference_url: String,
    metadata: Value,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifactData {
    /// Artifact identifier.
    pub id: PipelineArtifactId,
    /// Producing execution.
    pub execution_id: PipelineExecutionId,
    /// Artifact category.
    pub artifact_type: ArtifactType,
    /// Stable reference.
    pub reference_url: String,
    /// Free-form details.
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PipelineArtifact {
    /// Creates an artifact of `execution_id`.
    #[must_use]
    pub fn new(
        execution_id: PipelineExecutionId,
        artifact_type: ArtifactType,
        reference_url: impl Into<String>,
        metadata: Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PipelineArtifactId::new(),
            execution_id,
            artifact_type,
            reference_url: reference_url.into(),
            metadata,
            created_at: at,
        }
    }

    /// Reconstructs an artifact from storage.
    #[must_use]
    pub fn from_persisted(data: PersistedArtifactData) -> Self {
        Self {
            id: data.id,
            execution_id: data.execution_id,
            artifact_type: data.artifact_type,
            reference_url: data.reference_url,
            metadata: data.metadata,
            created_at: data.created_at,
        }
    }

    /// Returns the artifact identifier.
    #[must_use]
    pub const fn id(&self) -> PipelineArtifactId {
        self.id
    }

    /// Returns the producing execution.
    #[must_use]
    pub const fn execution_id(&self) -> PipelineExecutionId {
        self.execution_id
    }

    /// Returns the artifact category.
    #[must_use]
    pub const fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    /// Returns the stable reference.
    #[must_use]
    pub fn reference_url(&self) -> &str {
        &self.reference_url
    }

    /// Returns the free-form details.
    #[must_use]
    pub const fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the natural key `(type, reference)` within an execution.
    #[must_use]
    pub fn natural_key(&self) -> (ArtifactType, &str) {
        (self.artifact_type, &self.reference_url)
    }
}

/// Derives the artifacts described by a successful execution's outputs.
///
/// Branches and commits use their name and hash as reference. The execution
/// result is referenced by the run's web page, or by the execution id when
/// CI reported none. Blank references are skipped and duplicates collapse
/// to the first occurrence.
#[must_use]
pub fn derive_artifacts(execution: &PipelineExecution, at: DateTime<Utc>) -> Vec<PipelineArtifact> {
    let outputs = execution.outputs();
    let repository = execution.worker_repository();
    let mut candidates: Vec<(ArtifactType, String, Value)> = Vec::new();
    if let Some(url) = &outputs.merge_request_url {
        candidates.push((ArtifactType::MergeRequest, url.clone(), json!({ "repository": repository })));
    }
    if let Some(branch) = &outputs.branch {
        candidates.push((ArtifactType::Branch, branch.clone(), json!({ "repository": repository })));
    }
    if let Some(commit) = &outputs.commit {
        candidates.push((
            ArtifactType::Commit,
            commit.clone(),
            json!({ "repository": repository, "branch": outputs.branch }),
        ));
    }
    if let Some(result) = &outputs.execution_result {
        let reference = outputs
            .pipeline_url
            .clone()
            .unwrap_or_else(|| format!("pipeline-execution:{}", execution.id()));
        candidates.push((ArtifactType::ExecutionResult, reference, json!({ "result": result })));
    }
    candidates.extend(outputs.artifacts.iter().map(|reported| {
        (
            reported.artifact_type,
            reported.reference_url.clone(),
            reported.metadata.clone(),
        )
    }));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(_, reference, _)| !reference.trim().is_empty())
        .filter(|(kind, reference, _)| seen.insert((*kind, reference.clone())))
        .map(|(kind, reference, metadata)| {
            PipelineArtifact::new(execution.id(), kind, reference, metadata, at)
        })
        .collect()
}
