//! Task and task source repositories against `PostgreSQL`.

use super::helpers::temporary_database;
use chrono::{DateTime, Duration, Utc};
use foreman::provider::SecretId;
use foreman::task::{
    adapters::postgres::{PostgresTaskRepository, PostgresTaskSourceRepository},
    domain::{
        AxisStatus, EvaluationKind, EvaluationStatus, ExternalIssue, GuardedUpdate, IssueProvider,
        IssueReference, IssueSourceConfig, ProjectId, RemoteStatus, SyncStatus, Task, TaskAxis,
        TaskSource,
    },
    ports::{TaskRepository, TaskRepositoryError, TaskSourceRepository},
};
use mockable::DefaultClock;
use rstest::rstest;

fn timestamp() -> DateTime<Utc> {
    foreman::clock::now(&DefaultClock)
}

fn source() -> Result<TaskSource, eyre::Report> {
    Ok(TaskSource::new(
        ProjectId::new(),
        "backend",
        IssueSourceConfig::GitHub {
            host: "https://api.github.com".to_owned(),
            owner: "acme".to_owned(),
            repository: "widgets".to_owned(),
            token_secret: SecretId::new("github-token")?,
        },
        timestamp(),
    )?)
}

fn task_for(source: &TaskSource, number: u64, title: &str) -> Result<Task, eyre::Report> {
    let reference = IssueReference::numbered(IssueProvider::GitHub, "acme/widgets", number)?;
    let issue = ExternalIssue::new(reference, title, RemoteStatus::Opened)?;
    Ok(Task::new_from_issue(source, &issue, timestamp()))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_task_for_the_same_issue_is_rejected() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let sources = PostgresTaskSourceRepository::new(db.pool());
    let tasks = PostgresTaskRepository::new(db.pool());
    let source = source()?;
    sources.store(&source).await?;

    tasks.store(&task_for(&source, 5, "Cache tokens")?).await?;
    let duplicate = tasks.store(&task_for(&source, 5, "Cache tokens again")?).await;

    eyre::ensure!(
        matches!(duplicate, Err(TaskRepositoryError::DuplicateIssueKey { .. })),
        "duplicate issue stored: {duplicate:?}"
    );
    let stored = tasks.list_by_source(source.id()).await?.len();
    eyre::ensure!(stored == 1, "expected one task, found {stored}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_guard_loses_the_update() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let sources = PostgresTaskSourceRepository::new(db.pool());
    let tasks = PostgresTaskRepository::new(db.pool());
    let source = source()?;
    sources.store(&source).await?;
    let task = task_for(&source, 8, "Retry uploads")?;
    tasks.store(&task).await?;

    let axis = TaskAxis::SimpleEvaluation;
    let later = timestamp() + Duration::seconds(1);
    let mut first = task.clone();
    let mut second = task.clone();
    let guard = task.status_guard(axis);
    first.queue_evaluation(EvaluationKind::Simple, later)?;
    second.queue_evaluation(EvaluationKind::Simple, later)?;

    let winner = tasks.update_guarded(&first, &guard).await?;
    let loser = tasks.update_guarded(&second, &guard).await?;

    eyre::ensure!(winner == GuardedUpdate::Applied, "first writer was rejected");
    eyre::ensure!(loser == GuardedUpdate::Conflict, "stale writer was applied");
    let stored = tasks
        .find_by_id(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task missing"))?;
    eyre::ensure!(
        stored.axis_status(axis) == AxisStatus::Evaluation(EvaluationStatus::Queued),
        "stored status is {}",
        stored.axis_status(axis)
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sources_are_listed_by_sync_status() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let sources = PostgresTaskSourceRepository::new(db.pool());
    let mut queued = source()?;
    let idle = source()?;
    sources.store(&queued).await?;
    sources.store(&idle).await?;

    let guard = queued.sync_guard();
    queued.request_sync(timestamp() + Duration::seconds(1))?;
    eyre::ensure!(
        sources.update_guarded(&queued, &guard).await? == GuardedUpdate::Applied,
        "sync request was not written"
    );

    let listed = sources
        .list_by_sync_status(SyncStatus::Queued, None, 10)
        .await?;
    eyre::ensure!(
        listed.iter().map(TaskSource::id).collect::<Vec<_>>() == vec![queued.id()],
        "expected only the queued source"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn labels_survive_storage_and_remote_updates() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let sources = PostgresTaskSourceRepository::new(db.pool());
    let tasks = PostgresTaskRepository::new(db.pool());
    let source = source()?;
    sources.store(&source).await?;
    let reference = IssueReference::numbered(IssueProvider::GitHub, "acme/widgets", 11)?;
    let issue = ExternalIssue::new(reference.clone(), "Tidy logging", RemoteStatus::Opened)?
        .with_labels(["chore".to_owned()]);
    let mut task = Task::new_from_issue(&source, &issue, timestamp());
    tasks.store(&task).await?;

    let relabelled = ExternalIssue::new(reference, "Tidy logging", RemoteStatus::Opened)?
        .with_labels(["chore".to_owned(), "logging".to_owned()]);
    eyre::ensure!(
        task.apply_remote_changes(&relabelled, timestamp() + Duration::seconds(1)),
        "label change was not detected"
    );
    tasks.update_remote_fields(&task).await?;

    let stored = tasks
        .find_by_id(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task missing"))?;
    eyre::ensure!(
        stored.labels() == ["chore", "logging"],
        "stored labels are {:?}",
        stored.labels()
    );
    Ok(())
}
