//! `PostgreSQL` adapters for task and task-source persistence.

mod models;
mod repository;
pub(crate) mod schema;
mod source;

pub use repository::PostgresTaskRepository;
pub use source::PostgresTaskSourceRepository;
