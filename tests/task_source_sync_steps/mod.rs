//! Step definitions for task source synchronization scenarios.

mod given;
mod then;
mod when;
pub mod world;
