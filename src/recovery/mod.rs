//! Recovery sweeper for work stuck in a non-terminal state.
//!
//! The sweeper runs on its own timer, independent of the stage queues. Every
//! write it makes is conditional on the status it read during the scan, so
//! concurrent sweepers and stage workers never double-fail a row.

mod report;
mod sweeper;

pub use report::{SweepReport, SweptEntity};
pub use sweeper::{RecoveryError, RecoveryResult, RecoverySweeper, SweepConfig};

#[cfg(test)]
mod tests;
