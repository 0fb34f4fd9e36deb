//! `PostgreSQL` session repository.

mod models;
mod repository;
pub(crate) mod schema;

pub use repository::PostgresSessionRepository;
