//! Per-issue processing lock.
//!
//! A lock row keyed by (project, issue key) guarantees that at most one
//! worker creates or advances the task for an external issue at a time.
//! Acquisition is a single conditional write; a denied acquisition is not an
//! error. Rows are never swept: an expired lock is reclaimed by the next
//! `acquire`.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
