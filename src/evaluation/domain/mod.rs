//! Parsing of evaluator responses.

mod response;

pub use response::{EvaluationParseError, parse_evaluation};
