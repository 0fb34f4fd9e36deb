//! Shared wiring for in-memory engine integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use foreman::events::DiscardEventSink;
use foreman::evaluation::services::EvaluationGate;
use foreman::implementation::{
    adapters::memory::InMemorySessionRepository, services::ImplementationDispatcher,
};
use foreman::lock::{adapters::memory::InMemoryLockStore, domain::WorkerId};
use foreman::pipeline::{
    adapters::memory::{InMemoryPipelineArtifactRepository, InMemoryPipelineExecutionRepository},
    domain::{ExecutionHandle, PipelineOutputs, PipelineStatus},
    ports::{CiError, CiPoll, CiRun, CiRunner},
    services::{ArtifactRecorder, PipelineMonitor},
};
use foreman::provider::{
    SecretId, SecretString,
    adapters::memory::{InMemoryProviderConfigRepository, InMemorySecretStore},
    domain::{
        AiProvider, AiProviderConfig, Completion, CompletionClientConfig, CompletionRequest,
        ProjectAiSettings, ProviderDeployment, TokenUsage,
    },
    ports::{CompletionClient, CompletionError, ProviderConfigRepository, SecretStore},
    services::ProviderResolver,
};
use foreman::recovery::RecoverySweeper;
use foreman::retry::RetryPolicy;
use foreman::sync::{
    domain::FetchedIssue,
    ports::{IssueSource, IssueSourceError},
    services::{SyncSettings, TaskSourceSynchronizer},
};
use foreman::task::{
    adapters::memory::{InMemoryTaskRepository, InMemoryTaskSourceRepository},
    domain::{IssueProvider, IssueReference, IssueSourceConfig, ProjectId, TaskSource},
    ports::TaskSourceRepository,
    services::TaskCommandService,
};
use mockable::Clock;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Evaluation response with a `ready` verdict.
pub const READY_EVALUATION: &str = r#"{"verdict":"ready","scores":{"clarity":90,"feasibility":70,"complexity":20},"flags":{"automatable":true,"requires_external_access":false,"touches_ui":false},"questions":[]}"#;

/// Implementation response touching one file.
pub const CHANGE_SET: &str = r#"{"branch":"foreman/retry","commit_message":"Add retry","files":[{"path":"src/lib.rs","action":"modify","content":"// retry"}]}"#;

/// Clock that moves only when advanced.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Advances the clock by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex should not be poisoned");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(
                Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                    .single()
                    .expect("valid fixed start time"),
            ),
        }
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

/// Tracker returning whatever issues the test last set.
#[derive(Debug, Default)]
pub struct StaticIssueSource {
    issues: Mutex<Vec<FetchedIssue>>,
}

impl StaticIssueSource {
    /// Replaces the issues the tracker reports.
    pub fn set(&self, issues: Vec<FetchedIssue>) {
        *self.issues.lock().expect("issue mutex should not be poisoned") = issues;
    }
}

#[async_trait]
impl IssueSource for StaticIssueSource {
    async fn list_issues(
        &self,
        _config: &IssueSourceConfig,
        _credential: Option<SecretString>,
    ) -> Result<Vec<FetchedIssue>, IssueSourceError> {
        Ok(self
            .issues
            .lock()
            .expect("issue mutex should not be poisoned")
            .clone())
    }
}

/// Completion client answering from a script, in order.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl ScriptedCompletion {
    /// Appends a reply.
    pub fn push(&self, text: &str) {
        self.replies
            .lock()
            .expect("reply mutex should not be poisoned")
            .push_back(text.to_owned());
    }

    /// Returns how many completions were requested.
    pub fn calls(&self) -> usize {
        *self.calls.lock().expect("call mutex should not be poisoned")
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        _request: &CompletionRequest,
        _config: &CompletionClientConfig,
    ) -> Result<Completion, CompletionError> {
        *self.calls.lock().expect("call mutex should not be poisoned") += 1;
        let reply = self
            .replies
            .lock()
            .expect("reply mutex should not be poisoned")
            .pop_front()
            .ok_or_else(|| CompletionError::Rejected("script exhausted".to_owned()))?;
        Ok(Completion {
            text: reply,
            usage: TokenUsage {
                input_tokens: 120,
                output_tokens: 40,
            },
        })
    }
}

/// CI runner whose polls replay a script; the last status repeats.
#[derive(Debug, Default)]
pub struct ScriptedCi {
    polls: Mutex<VecDeque<CiPoll>>,
    started: Mutex<Vec<(String, String)>>,
}

impl ScriptedCi {
    /// Appends a poll result.
    pub fn push(&self, status: PipelineStatus, outputs: PipelineOutputs) {
        self.polls
            .lock()
            .expect("poll mutex should not be poisoned")
            .push_back(CiPoll {
                status,
                outputs,
                message: None,
            });
    }

    /// Returns every `(repository, git_ref)` a run was started for.
    pub fn started(&self) -> Vec<(String, String)> {
        self.started
            .lock()
            .expect("start mutex should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl CiRunner for ScriptedCi {
    async fn start(&self, repository: &str, git_ref: &str) -> Result<CiRun, CiError> {
        let mut started = self.started.lock().expect("start mutex should not be poisoned");
        started.push((repository.to_owned(), git_ref.to_owned()));
        let handle = ExecutionHandle::new(format!("run-{}", started.len()))
            .map_err(|err| CiError::Rejected(err.to_string()))?;
        Ok(CiRun {
            handle,
            pipeline_url: Some(format!("https://ci.example.com/runs/{}", started.len())),
        })
    }

    async fn poll(&self, _handle: &ExecutionHandle) -> Result<CiPoll, CiError> {
        let mut polls = self.polls.lock().expect("poll mutex should not be poisoned");
        let next = if polls.len() > 1 {
            polls.pop_front()
        } else {
            polls.front().cloned()
        };
        next.ok_or_else(|| CiError::Transient("no status scripted".to_owned()))
    }
}

/// Builds a GitHub issue reference on `acme/widgets`.
pub fn issue(number: u64, title: &str) -> FetchedIssue {
    let reference = IssueReference::numbered(IssueProvider::GitHub, "acme/widgets", number)
        .expect("valid issue reference");
    FetchedIssue::new(reference, title)
}

pub type Synchronizer = TaskSourceSynchronizer<
    InMemoryTaskSourceRepository,
    InMemoryTaskRepository,
    InMemoryLockStore,
    InMemorySecretStore,
    ManualClock,
>;
pub type Commands =
    TaskCommandService<InMemoryTaskRepository, InMemoryTaskSourceRepository, ManualClock>;
pub type Gate = EvaluationGate<InMemoryTaskRepository, InMemorySessionRepository, ManualClock>;
pub type Dispatcher =
    ImplementationDispatcher<InMemoryTaskRepository, InMemorySessionRepository, ManualClock>;
pub type Monitor = PipelineMonitor<
    InMemoryPipelineExecutionRepository,
    InMemorySessionRepository,
    InMemoryTaskRepository,
    ManualClock,
>;
pub type Recorder =
    ArtifactRecorder<InMemoryPipelineExecutionRepository, InMemoryPipelineArtifactRepository, ManualClock>;
pub type Sweeper = RecoverySweeper<
    InMemoryTaskSourceRepository,
    InMemoryTaskRepository,
    InMemoryPipelineExecutionRepository,
    ManualClock,
>;

/// Every in-memory repository and scripted capability, wired to one clock.
pub struct Stack {
    pub clock: Arc<ManualClock>,
    pub sources: Arc<InMemoryTaskSourceRepository>,
    pub tasks: Arc<InMemoryTaskRepository>,
    pub locks: Arc<InMemoryLockStore>,
    pub secrets: Arc<InMemorySecretStore>,
    pub provider_configs: Arc<InMemoryProviderConfigRepository>,
    pub sessions: Arc<InMemorySessionRepository>,
    pub executions: Arc<InMemoryPipelineExecutionRepository>,
    pub artifacts: Arc<InMemoryPipelineArtifactRepository>,
    pub issues: Arc<StaticIssueSource>,
    pub completion: Arc<ScriptedCompletion>,
    pub ci: Arc<ScriptedCi>,
    pub source: TaskSource,
}

impl Stack {
    /// Creates a project with one GitHub source and Anthropic selected for
    /// both AI stages.
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let at = clock.utc();
        let project_id = ProjectId::new();
        let token = SecretId::new("github-token").expect("valid secret id");
        let api_key = SecretId::new("anthropic-key").expect("valid secret id");

        let source = TaskSource::new(
            project_id,
            "backend",
            IssueSourceConfig::GitHub {
                host: "https://api.github.com".to_owned(),
                owner: "acme".to_owned(),
                repository: "widgets".to_owned(),
                token_secret: token.clone(),
            },
            at,
        )
        .expect("valid task source");
        let sources = Arc::new(InMemoryTaskSourceRepository::new());
        sources.store(&source).await.expect("source should store");

        let secrets = Arc::new(InMemorySecretStore::new());
        secrets
            .put(&token, SecretString::new("ghp-test"))
            .await
            .expect("token should store");
        secrets
            .put(&api_key, SecretString::new("sk-test"))
            .await
            .expect("api key should store");

        let provider_configs = Arc::new(InMemoryProviderConfigRepository::new());
        let config = AiProviderConfig::new(
            project_id,
            AiProvider::Anthropic,
            ProviderDeployment::Cloud {
                api_key_secret: api_key,
                base_url: None,
            },
            "claude-test",
            at,
        )
        .expect("valid provider config");
        provider_configs
            .upsert_config(&config)
            .await
            .expect("config should store");
        provider_configs
            .upsert_settings(&ProjectAiSettings {
                evaluation_provider: Some(AiProvider::Anthropic),
                implementation_provider: Some(AiProvider::Anthropic),
                ..ProjectAiSettings::new(project_id)
            })
            .await
            .expect("settings should store");

        Self {
            clock,
            sources,
            tasks: Arc::new(InMemoryTaskRepository::new()),
            locks: Arc::new(InMemoryLockStore::new()),
            secrets,
            provider_configs,
            sessions: Arc::new(InMemorySessionRepository::new()),
            executions: Arc::new(InMemoryPipelineExecutionRepository::new()),
            artifacts: Arc::new(InMemoryPipelineArtifactRepository::new()),
            issues: Arc::new(StaticIssueSource::default()),
            completion: Arc::new(ScriptedCompletion::default()),
            ci: Arc::new(ScriptedCi::default()),
            source,
        }
    }

    fn resolver(&self) -> Arc<ProviderResolver<InMemoryProviderConfigRepository, InMemorySecretStore>> {
        Arc::new(ProviderResolver::new(
            Arc::clone(&self.provider_configs),
            Arc::clone(&self.secrets),
        ))
    }

    /// Synchronizer acting as `worker`.
    pub fn synchronizer(&self, worker: &str) -> Synchronizer {
        let mut settings = SyncSettings::new(WorkerId::new(worker).expect("valid worker id"));
        settings.retry = RetryPolicy::new(2, std::time::Duration::ZERO, std::time::Duration::ZERO);
        self.synchronizer_with(settings)
    }

    /// Synchronizer running with `settings`.
    pub fn synchronizer_with(&self, settings: SyncSettings) -> Synchronizer {
        TaskSourceSynchronizer::new(
            Arc::clone(&self.sources),
            Arc::clone(&self.tasks),
            Arc::clone(&self.locks),
            Arc::clone(&self.secrets),
            Arc::clone(&self.issues) as Arc<dyn IssueSource>,
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
            settings,
        )
    }

    pub fn commands(&self) -> Commands {
        TaskCommandService::new(
            Arc::clone(&self.tasks),
            Arc::clone(&self.sources),
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
        )
    }

    pub fn gate(&self) -> Gate {
        EvaluationGate::new(
            Arc::clone(&self.tasks),
            Arc::clone(&self.sessions),
            self.resolver(),
            Arc::clone(&self.completion) as Arc<dyn CompletionClient>,
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
        )
    }

    pub fn dispatcher(&self) -> Dispatcher {
        ImplementationDispatcher::new(
            Arc::clone(&self.tasks),
            Arc::clone(&self.sessions),
            self.resolver(),
            Arc::clone(&self.completion) as Arc<dyn CompletionClient>,
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
        )
    }

    pub fn monitor(&self) -> Monitor {
        PipelineMonitor::new(
            Arc::clone(&self.executions),
            Arc::clone(&self.sessions),
            Arc::clone(&self.tasks),
            Arc::clone(&self.ci) as Arc<dyn CiRunner>,
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
        )
    }

    pub fn recorder(&self) -> Recorder {
        ArtifactRecorder::new(
            Arc::clone(&self.executions),
            Arc::clone(&self.artifacts),
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
        )
    }

    pub fn sweeper(&self) -> Sweeper {
        RecoverySweeper::new(
            Arc::clone(&self.sources),
            Arc::clone(&self.tasks),
            Arc::clone(&self.executions),
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
        )
    }
}
