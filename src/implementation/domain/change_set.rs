//! Change sets produced by implementation sessions.

use super::ImplementationDomainError;
use crate::provider::domain::extract_json_object;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// What to do with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    /// Create a new file.
    Create,
    /// Replace an existing file's content.
    Modify,
    /// Remove the file.
    Delete,
}

/// One file edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path.
    pub path: String,
    /// Edit kind.
    pub action: FileAction,
    /// Full new content; absent for deletions.
    #[serde(default)]
    pub content: Option<String>,
}

/// Branch, commit and file edits proposed for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Branch the pipeline runs on.
    pub branch: String,
    /// Commit message.
    pub commit_message: String,
    /// Reviewer-facing summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// File edits.
    pub files: Vec<FileChange>,
}

impl ChangeSet {
    fn validate(&self) -> Result<(), String> {
        if self.branch.trim().is_empty() || self.branch.chars().any(char::is_whitespace) {
            return Err(format!("invalid branch name '{}'", self.branch));
        }
        if self.commit_message.trim().is_empty() {
            return Err("commit_message must not be empty".to_owned());
        }
        if self.files.is_empty() {
            return Err("change set contains no files".to_owned());
        }
        self.files.iter().try_for_each(validate_file)
    }
}

fn validate_file(file: &FileChange) -> Result<(), String> {
    let path = Path::new(&file.path);
    let escapes = path
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if file.path.trim().is_empty() || escapes {
        return Err(format!("path '{}' is not repository-relative", file.path));
    }
    match (file.action, &file.content) {
        (FileAction::Create | FileAction::Modify, None) => {
            Err(format!("{} has no content", file.path))
        }
        _ => Ok(()),
    }
}

/// Parses the change set embedded in a model response.
///
/// # Errors
///
/// Returns [`ImplementationDomainError::MalformedChangeSet`] with the raw
/// parse error when no JSON object is present, it does not deserialize, or
/// it fails validation.
pub fn parse_change_set(text: &str) -> Result<ChangeSet, ImplementationDomainError> {
    let json = extract_json_object(text).ok_or_else(|| {
        ImplementationDomainError::MalformedChangeSet("response contains no JSON object".to_owned())
    })?;
    let change_set: ChangeSet = serde_json::from_str(json)
        .map_err(|err| ImplementationDomainError::MalformedChangeSet(err.to_string()))?;
    change_set
        .validate()
        .map_err(ImplementationDomainError::MalformedChangeSet)?;
    Ok(change_set)
}
