//! Structured evaluator output.

use crate::provider::domain::extract_json_object;
use crate::task::domain::{CapabilityFlags, EvaluationResult, EvaluationScores, Verdict};
use serde::Deserialize;
use thiserror::Error;

/// Highest score on the evaluation scale.
const MAX_SCORE: u8 = 100;

/// Reasons an evaluator response was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationParseError {
    /// No JSON object in the response.
    #[error("response contains no JSON object")]
    NoJsonObject,
    /// The object is not valid JSON or misses required fields.
    #[error("invalid evaluation JSON: {0}")]
    InvalidJson(String),
    /// The verdict is not `ready` or `needs_clarification`.
    #[error("unknown verdict '{0}'")]
    UnknownVerdict(String),
    /// A score lies outside `0..=100`.
    #[error("score '{field}' = {value} outside 0..=100")]
    ScoreOutOfRange {
        /// Score name.
        field: &'static str,
        /// Reported value.
        value: i64,
    },
}

#[derive(Debug, Deserialize)]
struct RawScores {
    clarity: i64,
    feasibility: i64,
    complexity: i64,
}

#[derive(Debug, Deserialize)]
struct RawFlags {
    automatable: bool,
    requires_external_access: bool,
    touches_ui: bool,
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    verdict: String,
    scores: RawScores,
    flags: RawFlags,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    questions: Vec<String>,
}

fn score(field: &'static str, value: i64) -> Result<u8, EvaluationParseError> {
    u8::try_from(value)
        .ok()
        .filter(|score| *score <= MAX_SCORE)
        .ok_or(EvaluationParseError::ScoreOutOfRange { field, value })
}

/// Parses an evaluator response into a result.
///
/// The outermost JSON object is used, so prose or code fences around it are
/// tolerated. Every score and flag is required.
///
/// # Errors
///
/// Returns an [`EvaluationParseError`] describing the first problem found.
pub fn parse_evaluation(text: &str) -> Result<EvaluationResult, EvaluationParseError> {
    let json = extract_json_object(text).ok_or(EvaluationParseError::NoJsonObject)?;
    let raw: RawEvaluation = serde_json::from_str(json)
        .map_err(|err| EvaluationParseError::InvalidJson(err.to_string()))?;
    let verdict = Verdict::try_from(raw.verdict.as_str())
        .map_err(|_| EvaluationParseError::UnknownVerdict(raw.verdict.clone()))?;
    let scores = EvaluationScores {
        clarity: score("clarity", raw.scores.clarity)?,
        feasibility: score("feasibility", raw.scores.feasibility)?,
        complexity: score("complexity", raw.scores.complexity)?,
    };
    let summary = raw
        .summary
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty());
    Ok(EvaluationResult {
        verdict,
        scores,
        flags: CapabilityFlags {
            automatable: raw.flags.automatable,
            requires_external_access: raw.flags.requires_external_access,
            touches_ui: raw.flags.touches_ui,
        },
        summary,
        questions: raw.questions,
    })
}
