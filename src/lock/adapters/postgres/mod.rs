//! `PostgreSQL` lock store.

mod models;
pub(crate) mod schema;
mod store;

pub use store::PostgresLockStore;
