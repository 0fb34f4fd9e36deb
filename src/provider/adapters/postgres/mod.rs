//! `PostgreSQL` provider configuration repository.

mod models;
pub(crate) mod schema;
mod repository;

pub use repository::PostgresProviderConfigRepository;
