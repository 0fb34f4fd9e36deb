//! Shared fixtures for unit tests.

use crate::implementation::domain::{ChangeSet, FileAction, FileChange, Session, SessionKind};
use crate::provider::SecretId;
use crate::provider::domain::{AiProvider, CompletionClientConfig, SecretString, TokenUsage};
use crate::task::domain::{
    CapabilityFlags, EvaluationKind, EvaluationResult, EvaluationScores, ExternalIssue,
    IssueProvider, IssueReference, IssueSourceConfig, ProjectId, RemoteStatus, Task, TaskId,
    TaskSource, Verdict,
};
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use std::sync::Mutex;

/// Clock whose time only moves when a test advances it.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex should not be poisoned");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                .single()
                .expect("valid fixed start time"),
        )
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex should not be poisoned")
    }
}

pub(crate) fn github_source(project_id: ProjectId, at: DateTime<Utc>) -> TaskSource {
    TaskSource::new(
        project_id,
        "backend",
        IssueSourceConfig::GitHub {
            host: "https://api.github.com".to_owned(),
            owner: "acme".to_owned(),
            repository: "widgets".to_owned(),
            token_secret: SecretId::new("github-token").expect("valid secret id"),
        },
        at,
    )
    .expect("valid task source")
}

pub(crate) fn github_issue(number: u64, title: &str) -> ExternalIssue {
    let reference = IssueReference::numbered(IssueProvider::GitHub, "acme/widgets", number)
        .expect("valid issue reference");
    ExternalIssue::new(reference, title, RemoteStatus::Opened).expect("valid issue")
}

pub(crate) fn evaluation_result(verdict: Verdict) -> EvaluationResult {
    EvaluationResult {
        verdict,
        scores: EvaluationScores {
            clarity: 80,
            feasibility: 75,
            complexity: 30,
        },
        flags: CapabilityFlags {
            automatable: true,
            requires_external_access: false,
            touches_ui: false,
        },
        summary: Some("Well scoped".to_owned()),
        questions: Vec::new(),
    }
}

/// Drives an evaluation axis of `task` through to `verdict`.
pub(crate) fn complete_evaluation(
    task: &mut Task,
    kind: EvaluationKind,
    verdict: Verdict,
    at: DateTime<Utc>,
) {
    task.queue_evaluation(kind, at).expect("queue evaluation");
    task.start_evaluation(kind, at).expect("start evaluation");
    task.complete_evaluation(kind, evaluation_result(verdict), at)
        .expect("complete evaluation");
}

/// Resolved completion configuration pointing at a fake endpoint.
pub(crate) fn client_config() -> CompletionClientConfig {
    CompletionClientConfig {
        provider: AiProvider::Anthropic,
        deployment_kind: "cloud",
        base_url: "https://ai.invalid".to_owned(),
        api_key: Some(SecretString::new("test-key")),
        model: "test-model".to_owned(),
        max_tokens: 1024,
        temperature: 0.0,
        extra_headers: std::collections::BTreeMap::new(),
        api_version: None,
        resolved_from: Utc::now(),
    }
}

/// Task synced from [`github_source`] whose simple evaluation is `ready`.
pub(crate) fn ready_task(project_id: ProjectId, at: DateTime<Utc>) -> Task {
    let source = github_source(project_id, at);
    let mut task = Task::new_from_issue(&source, &github_issue(12, "Add retry budget"), at);
    complete_evaluation(&mut task, EvaluationKind::Simple, Verdict::Ready, at);
    task
}

/// Completed implementation session whose change set targets `branch`.
pub(crate) fn implemented_session(task_id: TaskId, branch: &str, at: DateTime<Utc>) -> Session {
    let mut session = Session::start(
        Some(task_id),
        SessionKind::Implementation,
        "foreman",
        "implement the task",
        at,
    )
    .expect("valid session");
    let change_set = ChangeSet {
        branch: branch.to_owned(),
        commit_message: "Apply change".to_owned(),
        summary: None,
        files: vec![FileChange {
            path: "src/lib.rs".to_owned(),
            action: FileAction::Modify,
            content: Some("// changed".to_owned()),
        }],
    };
    session
        .complete(TokenUsage::default(), Some(change_set), at)
        .expect("session should complete");
    session
}
