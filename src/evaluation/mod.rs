//! Evaluation gate.
//!
//! Runs the simple and advanced feasibility passes over a task through the
//! completion capability. A response that does not parse into a complete
//! [`crate::task::domain::EvaluationResult`] fails the axis; no verdict is
//! ever guessed.

pub mod domain;
pub mod services;

#[cfg(test)]
mod tests;
