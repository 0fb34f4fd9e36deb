//! Provider adapters.
//!
//! - [`memory`]: in-memory secret store and configuration repository
//! - [`postgres`]: Diesel-backed configuration repository

pub mod memory;
pub mod postgres;
