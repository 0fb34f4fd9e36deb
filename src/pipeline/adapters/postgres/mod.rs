//! `PostgreSQL` pipeline repositories.

mod artifacts;
mod executions;
mod models;
pub(crate) mod schema;

pub use artifacts::PostgresPipelineArtifactRepository;
pub use executions::PostgresPipelineExecutionRepository;
