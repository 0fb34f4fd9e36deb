//! Enqueue commands and status queries over in-memory repositories.

use super::helpers::{Stack, issue};
use foreman::task::{
    domain::{EvaluationKind, SyncStatus, TaskDomainError, TaskId},
    ports::TaskRepository,
    services::{RequestOutcome, TaskCommandError},
};
use rstest::rstest;

async fn synced_task(stack: &Stack) -> Result<TaskId, eyre::Report> {
    stack.issues.set(vec![issue(11, "Document the retry policy")]);
    stack.synchronizer("worker-a").sync(stack.source.id()).await?;
    stack
        .tasks
        .list_by_source(stack.source.id())
        .await?
        .first()
        .map(foreman::task::domain::Task::id)
        .ok_or_else(|| eyre::eyre!("synced task missing"))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repeated_sync_request_is_absorbed() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    let commands = stack.commands();

    let first = commands.request_sync(stack.source.id()).await?;
    let second = commands.request_sync(stack.source.id()).await?;

    eyre::ensure!(first == RequestOutcome::Enqueued, "first request not enqueued");
    eyre::ensure!(second == RequestOutcome::AlreadyInFlight, "second request not absorbed");
    let view = commands
        .source_status(stack.source.id())
        .await?
        .ok_or_else(|| eyre::eyre!("source status missing"))?;
    eyre::ensure!(view.sync_status == SyncStatus::Queued, "source not queued");
    eyre::ensure!(view.kind == "github", "unexpected source kind {}", view.kind);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queued_sync_is_picked_up_by_the_worker() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    stack.issues.set(vec![issue(1, "One"), issue(2, "Two")]);
    stack.commands().request_sync(stack.source.id()).await?;

    let synced = stack.synchronizer("worker-a").sync_queued(10).await?;

    eyre::ensure!(synced.len() == 1, "expected one synced source");
    let view = stack
        .commands()
        .source_status(stack.source.id())
        .await?
        .ok_or_else(|| eyre::eyre!("source status missing"))?;
    eyre::ensure!(view.task_count == 2, "expected two tasks, found {}", view.task_count);
    eyre::ensure!(view.last_synced_at.is_some(), "sync time not recorded");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repeated_evaluation_request_is_absorbed() -> Result<(), eyre::Report> {
    let kind = EvaluationKind::Simple;
    let stack = Stack::new().await;
    let task_id = synced_task(&stack).await?;
    let commands = stack.commands();

    let first = commands.request_evaluation(task_id, kind).await?;
    let second = commands.request_evaluation(task_id, kind).await?;

    eyre::ensure!(first == RequestOutcome::Enqueued, "first request not enqueued");
    eyre::ensure!(second == RequestOutcome::AlreadyInFlight, "second request not absorbed");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn advanced_evaluation_waits_for_a_ready_simple_verdict() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    let task_id = synced_task(&stack).await?;

    let result = stack
        .commands()
        .request_evaluation(task_id, EvaluationKind::Advanced)
        .await;

    eyre::ensure!(
        matches!(
            result,
            Err(TaskCommandError::Domain(TaskDomainError::Blocked { .. }))
        ),
        "advanced evaluation queued before simple verdict: {result:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn implementation_is_blocked_without_an_evaluation() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    let task_id = synced_task(&stack).await?;

    let result = stack.commands().request_implementation(task_id).await;

    eyre::ensure!(
        matches!(
            result,
            Err(TaskCommandError::Domain(TaskDomainError::Blocked { .. }))
        ),
        "implementation queued without a verdict: {result:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_ids_report_absent() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    let commands = stack.commands();

    eyre::ensure!(
        commands.task_status(TaskId::new()).await?.is_none(),
        "unknown task reported"
    );
    let missing = commands.request_implementation(TaskId::new()).await;
    eyre::ensure!(
        matches!(missing, Err(TaskCommandError::TaskNotFound(_))),
        "unexpected result {missing:?}"
    );
    Ok(())
}
