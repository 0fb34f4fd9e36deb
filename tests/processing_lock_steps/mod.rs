//! Step definitions for processing lock scenarios.

mod given;
mod then;
mod when;
pub mod world;
