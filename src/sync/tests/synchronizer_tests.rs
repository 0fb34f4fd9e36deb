//! Synchronizer behaviour against in-memory repositories and a mocked
//! tracker.

use crate::events::DiscardEventSink;
use crate::lock::{
    adapters::memory::InMemoryLockStore,
    domain::{LockKey, WorkerId},
    services::ProcessingLockService,
};
use crate::provider::{
    SecretId,
    adapters::memory::InMemorySecretStore,
    domain::SecretString,
    ports::SecretStore,
};
use crate::retry::RetryPolicy;
use crate::sync::{
    domain::FetchedIssue,
    ports::{IssueSourceError, MockIssueSource},
    services::{IssueOutcome, SyncError, SyncSettings, TaskSourceSynchronizer},
};
use crate::task::{
    adapters::memory::{InMemoryTaskRepository, InMemoryTaskSourceRepository},
    domain::{
        IssueKey, IssueProvider, IssueReference, IssueSourceConfig, ProjectId, SyncStatus,
        TaskSource,
    },
    ports::{TaskRepository, TaskSourceRepository},
};
use crate::test_support::{ManualClock, github_source};
use chrono::Duration;
use mockable::Clock;
use rstest::rstest;
use std::sync::Arc;

type Synchronizer = TaskSourceSynchronizer<
    InMemoryTaskSourceRepository,
    InMemoryTaskRepository,
    InMemoryLockStore,
    InMemorySecretStore,
    ManualClock,
>;

struct Harness {
    sources: Arc<InMemoryTaskSourceRepository>,
    tasks: Arc<InMemoryTaskRepository>,
    locks: Arc<InMemoryLockStore>,
    secrets: Arc<InMemorySecretStore>,
    clock: Arc<ManualClock>,
    source: TaskSource,
}

impl Harness {
    async fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let source = github_source(ProjectId::new(), clock.utc());
        let sources = Arc::new(InMemoryTaskSourceRepository::new());
        sources.store(&source).await.expect("source should store");
        let secrets = Arc::new(InMemorySecretStore::new());
        secrets
            .put(
                &SecretId::new("github-token").expect("valid secret id"),
                SecretString::new("ghp-test"),
            )
            .await
            .expect("secret should store");
        Self {
            sources,
            tasks: Arc::new(InMemoryTaskRepository::new()),
            locks: Arc::new(InMemoryLockStore::new()),
            secrets,
            clock,
            source,
        }
    }

    fn synchronizer(&self, issues: MockIssueSource, worker: &str) -> Synchronizer {
        TaskSourceSynchronizer::new(
            Arc::clone(&self.sources),
            Arc::clone(&self.tasks),
            Arc::clone(&self.locks),
            Arc::clone(&self.secrets),
            Arc::new(issues),
            Arc::clone(&self.clock),
            Arc::new(DiscardEventSink),
            SyncSettings {
                retry: RetryPolicy::new(2, std::time::Duration::ZERO, std::time::Duration::ZERO),
                ..SyncSettings::new(WorkerId::new(worker).expect("valid worker id"))
            },
        )
    }

    async fn stored_source(&self) -> TaskSource {
        self.sources
            .find_by_id(self.source.id())
            .await
            .expect("lookup should succeed")
            .expect("source should exist")
    }

    async fn task_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self
            .tasks
            .list_by_source(self.source.id())
            .await
            .expect("listing should succeed")
            .iter()
            .map(|task| task.title().to_owned())
            .collect();
        titles.sort();
        titles
    }
}

fn issue(number: u64, title: &str) -> FetchedIssue {
    let reference = IssueReference::numbered(IssueProvider::GitHub, "acme/widgets", number)
        .expect("valid issue reference");
    FetchedIssue::new(reference, title)
}

fn tracker(issues: Vec<FetchedIssue>) -> MockIssueSource {
    let mut source = MockIssueSource::new();
    source
        .expect_list_issues()
        .returning(move |_, _| Ok(issues.clone()));
    source
}

fn three_issues() -> Vec<FetchedIssue> {
    vec![
        issue(1, "Add retries"),
        issue(2, "Fix flaky test"),
        issue(3, "Document config"),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn resync_updates_changed_title_without_duplicates() {
    let harness = Harness::new().await;

    let first = harness
        .synchronizer(tracker(three_issues()), "w1")
        .sync(harness.source.id())
        .await
        .expect("first sync should succeed");
    assert_eq!(first.created, 3);
    let synced = harness.stored_source().await;
    assert_eq!(synced.sync_status(), SyncStatus::Completed);
    assert_eq!(synced.last_synced_at(), Some(harness.clock.utc()));

    harness.clock.advance(Duration::minutes(5));
    let renamed = vec![
        issue(1, "Add retries"),
        issue(2, "Fix flaky integration test"),
        issue(3, "Document config"),
    ];
    let second = harness
        .synchronizer(tracker(renamed), "w1")
        .sync(harness.source.id())
        .await
        .expect("second sync should succeed");

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(second.unchanged, 2);
    assert_eq!(
        harness.task_titles().await,
        vec!["Add retries", "Document config", "Fix flaky integration test"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_tracker_creates_nothing_on_second_sync() {
    let harness = Harness::new().await;
    let synchronizer = harness.synchronizer(tracker(three_issues()), "w1");

    synchronizer.sync(harness.source.id()).await.expect("first sync");
    let second = synchronizer.sync(harness.source.id()).await.expect("second sync");

    assert_eq!(second.created, 0);
    assert_eq!(second.unchanged, 3);
    assert_eq!(harness.task_titles().await.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn blank_title_is_a_per_issue_error() {
    let harness = Harness::new().await;
    let issues = vec![issue(1, "Add retries"), issue(2, "   ")];

    let report = harness
        .synchronizer(tracker(issues), "w1")
        .sync(harness.source.id())
        .await
        .expect("sync should succeed");

    assert_eq!(report.created, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        report.errors.first().map(|error| error.issue_key.clone()),
        Some(IssueKey::parse("github:acme/widgets#2").expect("valid key"))
    );
    assert_eq!(
        harness.stored_source().await.sync_status(),
        SyncStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn issue_locked_by_another_worker_is_skipped() {
    let harness = Harness::new().await;
    let other = ProcessingLockService::new(Arc::clone(&harness.locks), Arc::clone(&harness.clock));
    let key = LockKey::new(
        harness.source.project_id(),
        IssueKey::parse("github:acme/widgets#2").expect("valid key"),
    );
    other
        .acquire(&key, &WorkerId::new("w2").expect("valid worker"), 60)
        .await
        .expect("acquire should succeed");

    let report = harness
        .synchronizer(tracker(three_issues()), "w1")
        .sync(harness.source.id())
        .await
        .expect("sync should succeed");

    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 1);
    assert!(report.errors.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_passes_dereferenced_token_and_releases_locks() {
    let harness = Harness::new().await;
    let mut issues = MockIssueSource::new();
    issues
        .expect_list_issues()
        .withf(|config, credential| {
            matches!(config, IssueSourceConfig::GitHub { .. })
                && credential.as_ref().map(SecretString::expose) == Some("ghp-test")
        })
        .returning(|_, _| Ok(vec![issue(1, "Add retries")]));

    harness
        .synchronizer(issues, "w1")
        .sync(harness.source.id())
        .await
        .expect("sync should succeed");

    let lock_service = ProcessingLockService::new(Arc::clone(&harness.locks), Arc::clone(&harness.clock));
    let key = LockKey::new(
        harness.source.project_id(),
        IssueKey::parse("github:acme/widgets#1").expect("valid key"),
    );
    assert!(
        lock_service
            .holder(&key)
            .await
            .expect("lookup should succeed")
            .is_none()
    );
}

#[rstest]
#[case::unauthorized(IssueSourceError::Unauthorized("bad token".to_owned()), 1)]
#[case::exhausted(IssueSourceError::Transient("timeout".to_owned()), 2)]
#[tokio::test(flavor = "multi_thread")]
async fn fetch_failure_marks_source_failed(#[case] error: IssueSourceError, #[case] calls: usize) {
    let harness = Harness::new().await;
    let mut issues = MockIssueSource::new();
    issues
        .expect_list_issues()
        .times(calls)
        .returning(move |_, _| Err(error.clone()));

    let err = harness
        .synchronizer(issues, "w1")
        .sync(harness.source.id())
        .await
        .expect_err("sync should fail");

    assert!(matches!(err, SyncError::Fetch { .. }));
    let failed = harness.stored_source().await;
    assert_eq!(failed.sync_status(), SyncStatus::Failed);
    assert!(failed.last_error().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_token_fails_without_fetching() {
    let harness = Harness::new().await;
    let source = TaskSource::new(
        harness.source.project_id(),
        "frontend",
        IssueSourceConfig::GitLab {
            host: "https://gitlab.invalid".to_owned(),
            project_path: "acme/frontend".to_owned(),
            token_secret: SecretId::new("gitlab-token").expect("valid secret id"),
        },
        harness.clock.utc(),
    )
    .expect("valid source");
    harness.sources.store(&source).await.expect("source should store");
    let mut issues = MockIssueSource::new();
    issues.expect_list_issues().never();

    let err = harness
        .synchronizer(issues, "w1")
        .sync(source.id())
        .await
        .expect_err("sync should fail");

    let SyncError::Fetch { message, .. } = err else {
        panic!("expected fetch failure, got {err:?}");
    };
    assert!(message.contains("gitlab-token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_source_completes_without_fetching() {
    let harness = Harness::new().await;
    let source = TaskSource::new(
        harness.source.project_id(),
        "manual",
        IssueSourceConfig::Manual {
            worker_repository: Some("acme/widgets".to_owned()),
        },
        harness.clock.utc(),
    )
    .expect("valid source");
    harness.sources.store(&source).await.expect("source should store");
    let mut issues = MockIssueSource::new();
    issues.expect_list_issues().never();

    let report = harness
        .synchronizer(issues, "w1")
        .sync(source.id())
        .await
        .expect("sync should succeed");

    assert_eq!(report.total(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_syncs_of_one_source_create_each_task_once() {
    let harness = Harness::new().await;
    let workers: Vec<Arc<Synchronizer>> = (0..8)
        .map(|index| Arc::new(harness.synchronizer(tracker(three_issues()), &format!("w{index}"))))
        .collect();
    let source_id = harness.source.id();

    let handles: Vec<_> = workers
        .iter()
        .map(|worker| {
            let synchronizer = Arc::clone(worker);
            tokio::spawn(async move { synchronizer.sync(source_id).await })
        })
        .collect();
    let mut succeeded = 0;
    for handle in handles {
        match handle.await.expect("task should join") {
            Ok(_) => succeeded += 1,
            Err(SyncError::AlreadySyncing(_)) => {}
            Err(other) => panic!("unexpected sync error: {other}"),
        }
    }

    assert!(succeeded >= 1);
    assert_eq!(harness.task_titles().await.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_racing_on_the_same_issues_create_each_task_once() {
    let harness = Harness::new().await;
    let source = harness.stored_source().await;
    let worker_count = 8;
    let start = Arc::new(tokio::sync::Barrier::new(worker_count));

    let handles: Vec<_> = (0..worker_count)
        .map(|index| {
            let synchronizer = harness.synchronizer(MockIssueSource::new(), &format!("w{index}"));
            let source = source.clone();
            let start = Arc::clone(&start);
            tokio::spawn(async move {
                start.wait().await;
                let mut outcomes = Vec::new();
                for fetched in three_issues() {
                    outcomes.push(
                        synchronizer
                            .sync_issue(&source, fetched)
                            .await
                            .expect("issue sync should succeed"),
                    );
                }
                outcomes
            })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.extend(handle.await.expect("task should join"));
    }

    let created = outcomes
        .iter()
        .filter(|outcome| **outcome == IssueOutcome::Created)
        .count();
    assert_eq!(created, 3);
    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        IssueOutcome::Created | IssueOutcome::Skipped | IssueOutcome::Unchanged
    )));
    assert_eq!(
        harness.task_titles().await,
        vec!["Add retries", "Document config", "Fix flaky test"]
    );
    let lock_service = ProcessingLockService::new(Arc::clone(&harness.locks), Arc::clone(&harness.clock));
    for fetched in three_issues() {
        let key = LockKey::new(source.project_id(), fetched.reference.key());
        assert!(
            lock_service
                .holder(&key)
                .await
                .expect("lookup should succeed")
                .is_none(),
            "every issue lock should be released"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn resync_mirrors_label_changes() {
    let harness = Harness::new().await;
    let labelled = |labels: &[&str]| {
        let mut fetched = issue(1, "Add retries");
        fetched.labels = labels.iter().map(|label| (*label).to_owned()).collect();
        vec![fetched]
    };
    harness
        .synchronizer(tracker(labelled(&["bug"])), "w1")
        .sync(harness.source.id())
        .await
        .expect("first sync should succeed");

    let second = harness
        .synchronizer(tracker(labelled(&["bug", "good first issue"])), "w1")
        .sync(harness.source.id())
        .await
        .expect("second sync should succeed");

    assert_eq!(second.updated, 1);
    let tasks = harness
        .tasks
        .list_by_source(harness.source.id())
        .await
        .expect("listing should succeed");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].labels(), ["bug", "good first issue"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn schedule_due_queues_stale_sources_once() {
    let harness = Harness::new().await;
    let synchronizer = harness.synchronizer(tracker(three_issues()), "w1");
    synchronizer.sync(harness.source.id()).await.expect("sync");
    harness.clock.advance(Duration::hours(2));

    let queued = synchronizer
        .schedule_due(Duration::hours(1), 10)
        .await
        .expect("scheduling should succeed");
    let again = synchronizer
        .schedule_due(Duration::hours(1), 10)
        .await
        .expect("scheduling should succeed");
    let reports = synchronizer.sync_queued(10).await.expect("queued syncs");

    assert_eq!(queued, 1);
    assert_eq!(again, 0);
    assert_eq!(reports.len(), 1);
    assert_eq!(
        harness.stored_source().await.sync_status(),
        SyncStatus::Completed
    );
}
