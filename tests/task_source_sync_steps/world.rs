//! Shared world state for task source synchronization BDD scenarios.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use foreman::events::DiscardEventSink;
use foreman::lock::{adapters::memory::InMemoryLockStore, domain::WorkerId};
use foreman::provider::{SecretString, adapters::memory::InMemorySecretStore};
use foreman::retry::RetryPolicy;
use foreman::sync::{
    domain::{FetchedIssue, SyncReport},
    ports::{IssueSource, IssueSourceError},
    services::{SyncError, SyncSettings, TaskSourceSynchronizer},
};
use foreman::task::{
    adapters::memory::{InMemoryTaskRepository, InMemoryTaskSourceRepository},
    domain::{IssueSourceConfig, TaskSource},
};
use mockable::DefaultClock;
use rstest::fixture;

/// Synchronizer type used by the BDD world.
pub type TestSynchronizer = TaskSourceSynchronizer<
    InMemoryTaskSourceRepository,
    InMemoryTaskRepository,
    InMemoryLockStore,
    InMemorySecretStore,
    DefaultClock,
>;

/// Tracker reporting the issues the scenario configured.
#[derive(Debug, Default)]
pub struct ScenarioTracker {
    pub issues: Mutex<Vec<FetchedIssue>>,
}

#[async_trait]
impl IssueSource for ScenarioTracker {
    async fn list_issues(
        &self,
        _config: &IssueSourceConfig,
        _credential: Option<SecretString>,
    ) -> Result<Vec<FetchedIssue>, IssueSourceError> {
        self.issues
            .lock()
            .map(|issues| issues.clone())
            .map_err(|err| IssueSourceError::Transient(err.to_string()))
    }
}

/// Scenario world for synchronization behaviour tests.
pub struct SyncWorld {
    pub sources: Arc<InMemoryTaskSourceRepository>,
    pub tasks: Arc<InMemoryTaskRepository>,
    pub secrets: Arc<InMemorySecretStore>,
    pub tracker: Arc<ScenarioTracker>,
    pub synchronizer: TestSynchronizer,
    pub source: Option<TaskSource>,
    pub last_result: Option<Result<SyncReport, SyncError>>,
}

impl SyncWorld {
    /// Creates a world with no source configured.
    #[must_use]
    pub fn new() -> Self {
        let sources = Arc::new(InMemoryTaskSourceRepository::new());
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let secrets = Arc::new(InMemorySecretStore::new());
        let tracker = Arc::new(ScenarioTracker::default());
        let mut settings = SyncSettings::new(WorkerId::new("bdd-worker").expect("valid worker id"));
        settings.retry = RetryPolicy::new(1, std::time::Duration::ZERO, std::time::Duration::ZERO);
        let synchronizer = TaskSourceSynchronizer::new(
            Arc::clone(&sources),
            Arc::clone(&tasks),
            Arc::new(InMemoryLockStore::new()),
            Arc::clone(&secrets),
            Arc::clone(&tracker) as Arc<dyn IssueSource>,
            Arc::new(DefaultClock),
            Arc::new(DiscardEventSink),
            settings,
        );
        Self {
            sources,
            tasks,
            secrets,
            tracker,
            synchronizer,
            source: None,
            last_result: None,
        }
    }

    /// Returns the configured source.
    ///
    /// # Errors
    ///
    /// Returns an error when no source step ran.
    pub fn source(&self) -> Result<&TaskSource, eyre::Report> {
        self.source
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing task source in scenario world"))
    }

    /// Returns the last sync result.
    ///
    /// # Errors
    ///
    /// Returns an error when no sync step ran.
    pub fn last_result(&self) -> Result<&Result<SyncReport, SyncError>, eyre::Report> {
        self.last_result
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing sync result in scenario world"))
    }
}

impl Default for SyncWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SyncWorld {
    SyncWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
