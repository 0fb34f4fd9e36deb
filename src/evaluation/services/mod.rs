//! Evaluation orchestration services.

mod gate;
mod prompt;

pub use gate::{
    EvaluationError, EvaluationFailure, EvaluationGate, EvaluationOutcome, EvaluationRun,
    EvaluationSettings,
};
