//! CI pipeline tracking and artifact recording.
//!
//! The monitor launches a CI run for each completed implementation session
//! and polls it until a terminal status or the wall-clock timeout. The
//! recorder turns the outputs of successful runs into immutable artifact
//! rows, idempotently.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
