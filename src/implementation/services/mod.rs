//! Implementation orchestration services.

mod dispatcher;
mod prompt;

pub use dispatcher::{
    DispatchOutcome, ImplementationDispatcher, ImplementationError, ImplementationResult,
    ImplementationSettings,
};
