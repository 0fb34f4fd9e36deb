//! Prompt templates for the evaluation passes.

use crate::task::domain::{EvaluationKind, Task};
use minijinja::Environment;
use serde_json::{Map, Value};

const SYSTEM_PROMPT: &str = "You assess whether an issue tracker task can be implemented \
automatically. Reply with one JSON object and nothing else.";

const SIMPLE_TEMPLATE: &str = r#"Issue: {{ issue_key }}
Title: {{ title }}
{% if labels %}Labels: {{ labels | join(", ") }}
{% endif %}{% if description %}
Description:
{{ description }}
{% endif %}
Decide whether the task is specified well enough to implement.
Return JSON: {"verdict": "ready" | "needs_clarification",
"scores": {"clarity": 0-100, "feasibility": 0-100, "complexity": 0-100},
"flags": {"automatable": bool, "requires_external_access": bool, "touches_ui": bool},
"summary": string, "questions": [string]}"#;

const ADVANCED_TEMPLATE: &str = r#"Issue: {{ issue_key }}
Title: {{ title }}
{% if labels %}Labels: {{ labels | join(", ") }}
{% endif %}{% if description %}
Description:
{{ description }}
{% endif %}
A first pass rated this task {{ simple.verdict }} with clarity {{ simple.scores.clarity }},
feasibility {{ simple.scores.feasibility }} and complexity {{ simple.scores.complexity }}.
{% if simple.summary %}First-pass notes: {{ simple.summary }}{% endif %}
Examine risks, hidden dependencies and missing acceptance criteria in depth.
Return JSON: {"verdict": "ready" | "needs_clarification",
"scores": {"clarity": 0-100, "feasibility": 0-100, "complexity": 0-100},
"flags": {"automatable": bool, "requires_external_access": bool, "touches_ui": bool},
"summary": string, "questions": [string]}"#;

/// Returns the system instructions for evaluation sessions.
pub(super) const fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Renders the prompt of `kind` for `task`.
pub(super) fn render(task: &Task, kind: EvaluationKind) -> Result<String, minijinja::Error> {
    let mut context = Map::new();
    context.insert(
        "issue_key".to_owned(),
        Value::String(task.issue_key().to_string()),
    );
    context.insert("title".to_owned(), Value::String(task.title().to_owned()));
    context.insert(
        "description".to_owned(),
        task.description()
            .map_or(Value::Null, |text| Value::String(text.to_owned())),
    );
    context.insert(
        "labels".to_owned(),
        Value::Array(task.labels().iter().cloned().map(Value::String).collect()),
    );
    let template = match kind {
        EvaluationKind::Simple => SIMPLE_TEMPLATE,
        EvaluationKind::Advanced => {
            let simple = task
                .simple_evaluation()
                .result()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|err| {
                    minijinja::Error::new(minijinja::ErrorKind::BadSerialization, err.to_string())
                })?
                .unwrap_or(Value::Null);
            context.insert("simple".to_owned(), simple);
            ADVANCED_TEMPLATE
        }
    };
    Environment::new().render_str(template, context)
}
