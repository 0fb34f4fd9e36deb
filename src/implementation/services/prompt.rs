//! Prompt rendering for implementation sessions.

use crate::task::domain::Task;
use minijinja::Environment;
use serde_json::{Map, Value};

const SYSTEM_PROMPT: &str = "You implement issue tracker tasks as a single change set. \
Reply with one JSON object and nothing else.";

const IMPLEMENTATION_TEMPLATE: &str = r#"Repository: {{ repository }}
Issue: {{ issue_key }}
Title: {{ title }}
{% if description %}
Description:
{{ description }}
{% endif %}
{% if evaluation_summary %}
Evaluator notes: {{ evaluation_summary }}
{% endif %}
Return JSON with keys "branch", "commit_message", "summary" and "files", where
each file has "path", "action" (create, modify or delete) and "content"."#;

/// Returns the system instructions for implementation sessions.
pub(super) const fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Renders the implementation prompt for `task`.
pub(super) fn render(task: &Task, repository: &str) -> Result<String, minijinja::Error> {
    let mut context = Map::new();
    context.insert("repository".to_owned(), Value::String(repository.to_owned()));
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
    let summary = task
        .advanced_evaluation()
        .result()
        .or_else(|| task.simple_evaluation().result())
        .and_then(|result| result.summary.clone());
    context.insert(
        "evaluation_summary".to_owned(),
        summary.map_or(Value::Null, Value::String),
    );
    Environment::new().render_str(IMPLEMENTATION_TEMPLATE, context)
}
