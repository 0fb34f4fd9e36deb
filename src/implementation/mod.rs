//! Implementation dispatch and AI work sessions.
//!
//! A [`domain::Session`] records one AI-driven attempt at a task, either an
//! evaluation pass or an implementation. The
//! [`services::ImplementationDispatcher`] turns a queued implementation into
//! a [`domain::ChangeSet`] through the completion capability; completed
//! implementation sessions are then handed to the pipeline monitor.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
