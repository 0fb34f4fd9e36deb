//! Persistence adapters for task lifecycle storage.
//!
//! - [`memory`]: thread-safe in-memory repositories for tests and embedding
//! - [`postgres`]: Diesel-backed `PostgreSQL` repositories

pub mod memory;
pub mod postgres;
