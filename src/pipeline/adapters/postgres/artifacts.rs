//! `PostgreSQL` implementation of the artifact repository.

use super::{
    models::{ArtifactRow, NewArtifactRow},
    schema::pipeline_artifacts,
};
use crate::persistence::{PgPool, persistence_failure, run_blocking};
use crate::pipeline::{
    domain::{
        ArtifactType, PersistedArtifactData, PipelineArtifact, PipelineArtifactId,
        PipelineExecutionId,
    },
    ports::{
        PipelineArtifactRepository, PipelineArtifactRepositoryError,
        PipelineArtifactRepositoryResult,
    },
};
use async_trait::async_trait;
use diesel::prelude::*;

persistence_failure!(PipelineArtifactRepositoryError);

/// `PostgreSQL`-backed artifact repository.
///
/// Relies on the unique index over
/// `(pipeline_execution_id, artifact_type, reference_url)`.
#[derive(Debug, Clone)]
pub struct PostgresPipelineArtifactRepository {
    pool: PgPool,
}

impl PostgresPipelineArtifactRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineArtifactRepository for PostgresPipelineArtifactRepository {
    async fn insert_if_absent(
        &self,
        artifact: &PipelineArtifact,
    ) -> PipelineArtifactRepositoryResult<bool> {
        let row = NewArtifactRow {
            id: artifact.id().into_inner(),
            pipeline_execution_id: artifact.execution_id().into_inner(),
            artifact_type: artifact.artifact_type().as_str().to_owned(),
            reference_url: artifact.reference_url().to_owned(),
            metadata: artifact.metadata().clone(),
            created_at: artifact.created_at(),
        };
        run_blocking(&self.pool, move |connection| {
            let inserted = diesel::insert_into(pipeline_artifacts::table)
                .values(&row)
                .on_conflict((
                    pipeline_artifacts::pipeline_execution_id,
                    pipeline_artifacts::artifact_type,
                    pipeline_artifacts::reference_url,
                ))
                .do_nothing()
                .execute(connection)
                .map_err(PipelineArtifactRepositoryError::persistence)?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn list_by_execution(
        &self,
        execution_id: PipelineExecutionId,
    ) -> PipelineArtifactRepositoryResult<Vec<PipelineArtifact>> {
        run_blocking(&self.pool, move |connection| {
            let rows = pipeline_artifacts::table
                .filter(pipeline_artifacts::pipeline_execution_id.eq(execution_id.into_inner()))
                .order(pipeline_artifacts::created_at.asc())
                .select(ArtifactRow::as_select())
                .load::<ArtifactRow>(connection)
                .map_err(PipelineArtifactRepositoryError::persistence)?;
            rows.into_iter().map(row_to_artifact).collect()
        })
        .await
    }
}

fn row_to_artifact(row: ArtifactRow) -> PipelineArtifactRepositoryResult<PipelineArtifact> {
    let artifact_type = ArtifactType::try_from(row.artifact_type.as_str())
        .map_err(PipelineArtifactRepositoryError::persistence)?;
    Ok(PipelineArtifact::from_persisted(PersistedArtifactData {
        id: PipelineArtifactId::from_uuid(row.id),
        execution_id: PipelineExecutionId::from_uuid(row.pipeline_execution_id),
        artifact_type,
        reference_url: row.reference_url,
        metadata: row.metadata,
        created_at: row.created_at,
    }))
}
