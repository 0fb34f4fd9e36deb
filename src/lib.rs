//! Foreman: task lifecycle orchestration engine.
//!
//! Foreman ingests issues from external trackers as tasks, gates them
//! through AI feasibility evaluation, dispatches AI implementation, runs
//! the result through CI and records the produced artifacts. Each stage is
//! independently scheduled and safe to run on many workers at once.
//!
//! # Architecture
//!
//! Foreman follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//! - **Services**: Orchestration over ports
//!
//! # Modules
//!
//! - [`lock`]: Per-issue processing lock with expiry-based reclamation
//! - [`task`]: Task and task source state machines, UI commands and queries
//! - [`sync`]: Issue source synchronization
//! - [`provider`]: Secret store and AI provider resolution
//! - [`evaluation`]: AI feasibility gate
//! - [`implementation`]: AI implementation dispatch and session records
//! - [`pipeline`]: CI execution monitoring and artifact recording
//! - [`recovery`]: Stuck-state sweeper
//! - [`engine`]: Per-stage worker loops
//! - [`config`], [`telemetry`]: Environment configuration and logging

mod identifier;

pub mod clock;
pub mod config;
pub mod engine;
pub mod evaluation;
pub mod events;
pub mod implementation;
pub mod lock;
pub mod persistence;
pub mod pipeline;
pub mod provider;
pub mod recovery;
pub mod retry;
pub mod sync;
pub mod task;
pub mod telemetry;

#[cfg(test)]
mod test_support;
