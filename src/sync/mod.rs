//! Task source synchronization.
//!
//! Pulls issues from an external tracker through the [`ports::IssueSource`]
//! capability and turns each into exactly one task per source. Every issue
//! is created or updated under a processing lock keyed by its stable issue
//! key, so concurrent synchronizer workers never duplicate a task.

pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
