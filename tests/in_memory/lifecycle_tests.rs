//! End-to-end task lifecycle over in-memory adapters: sync, evaluate,
//! implement, build and record.

use super::helpers::{CHANGE_SET, READY_EVALUATION, Stack, issue};
use chrono::Duration;
use foreman::evaluation::services::EvaluationOutcome;
use foreman::implementation::{
    domain::{SessionKind, SessionStatus},
    ports::SessionRepository,
    services::DispatchOutcome,
};
use foreman::pipeline::{
    domain::{ArtifactType, PipelineOutputs, PipelineStatus},
    ports::{PipelineArtifactRepository, PipelineExecutionRepository},
    services::{LaunchOutcome, PollOutcome},
};
use foreman::task::{
    domain::{
        AxisStatus, EvaluationKind, EvaluationStatus, ImplementationStatus, SyncStatus, TaskAxis,
        Verdict,
    },
    ports::TaskRepository,
    services::RequestOutcome,
};
use rstest::rstest;

fn successful_outputs() -> PipelineOutputs {
    PipelineOutputs {
        merge_request_url: Some("https://github.com/acme/widgets/pull/7".to_owned()),
        branch: Some("foreman/retry".to_owned()),
        commit: Some("4f2a9c1".to_owned()),
        pipeline_url: Some("https://ci.example.com/runs/1".to_owned()),
        execution_result: Some("12 tests passed".to_owned()),
        ..PipelineOutputs::default()
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn issue_travels_from_tracker_to_recorded_artifacts() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    let commands = stack.commands();
    stack.issues.set(vec![issue(7, "Retry flaky uploads")]);

    let report = stack.synchronizer("worker-a").sync(stack.source.id()).await?;
    eyre::ensure!(report.created == 1, "expected one created task, got {report:?}");
    let tasks = stack.tasks.list_by_source(stack.source.id()).await?;
    let task_id = tasks
        .first()
        .map(foreman::task::domain::Task::id)
        .ok_or_else(|| eyre::eyre!("synced task missing"))?;

    let requested = commands
        .request_evaluation(task_id, EvaluationKind::Simple)
        .await?;
    eyre::ensure!(requested == RequestOutcome::Enqueued, "evaluation not enqueued");

    stack.completion.push(READY_EVALUATION);
    let evaluated = stack
        .gate()
        .process_queued(EvaluationKind::Simple, 10)
        .await?;
    eyre::ensure!(
        matches!(
            evaluated.as_slice(),
            [EvaluationOutcome::Completed {
                verdict: Verdict::Ready,
                ..
            }]
        ),
        "unexpected evaluation outcome {evaluated:?}"
    );

    let requested = commands.request_implementation(task_id).await?;
    eyre::ensure!(requested == RequestOutcome::Enqueued, "implementation not enqueued");

    stack.completion.push(CHANGE_SET);
    let dispatched = stack.dispatcher().process_queued(10).await?;
    let [DispatchOutcome::Completed { session_id }] = dispatched.as_slice() else {
        eyre::bail!("unexpected dispatch outcome {dispatched:?}");
    };
    let session = stack
        .sessions
        .find_by_id(*session_id)
        .await?
        .ok_or_else(|| eyre::eyre!("implementation session missing"))?;
    eyre::ensure!(session.kind() == SessionKind::Implementation, "wrong session kind");
    eyre::ensure!(session.status() == SessionStatus::Completed, "session not completed");

    let monitor = stack.monitor();
    let launched = monitor.launch_pending(10).await?;
    let [LaunchOutcome::Started { execution_id }] = launched.as_slice() else {
        eyre::bail!("unexpected launch outcome {launched:?}");
    };
    eyre::ensure!(
        stack.ci.started() == vec![("acme/widgets".to_owned(), "foreman/retry".to_owned())],
        "CI started for the wrong ref"
    );
    eyre::ensure!(
        monitor.launch_pending(10).await?.is_empty(),
        "a handed-off session launched twice"
    );

    stack.ci.push(PipelineStatus::Running, PipelineOutputs::default());
    stack.ci.push(PipelineStatus::Success, successful_outputs());
    let first = monitor.poll_active(10).await?;
    eyre::ensure!(
        first == vec![PollOutcome::Changed(PipelineStatus::Running)],
        "unexpected first poll {first:?}"
    );
    stack.clock.advance(Duration::minutes(10));
    let second = monitor.poll_active(10).await?;
    eyre::ensure!(
        second == vec![PollOutcome::Changed(PipelineStatus::Success)],
        "unexpected second poll {second:?}"
    );

    let recorder = stack.recorder();
    eyre::ensure!(recorder.record_pending(10).await? == 1, "execution not recorded");
    let artifacts = stack.artifacts.list_by_execution(*execution_id).await?;
    let merge_request = artifacts
        .iter()
        .find(|artifact| artifact.artifact_type() == ArtifactType::MergeRequest)
        .ok_or_else(|| eyre::eyre!("merge request artifact missing"))?;
    eyre::ensure!(
        merge_request.reference_url() == "https://github.com/acme/widgets/pull/7",
        "merge request reference mismatch"
    );
    for expected in [ArtifactType::Branch, ArtifactType::Commit, ArtifactType::ExecutionResult] {
        eyre::ensure!(
            artifacts.iter().any(|artifact| artifact.artifact_type() == expected),
            "{expected} artifact missing"
        );
    }

    let again = recorder.record(*execution_id).await?;
    eyre::ensure!(again.len() == artifacts.len(), "re-recording added rows");
    eyre::ensure!(
        recorder.record_pending(10).await? == 0,
        "recorded execution listed again"
    );

    let status = commands
        .task_status(task_id)
        .await?
        .ok_or_else(|| eyre::eyre!("task status missing"))?;
    eyre::ensure!(
        status.axis(TaskAxis::SimpleEvaluation).map(|view| view.status)
            == Some(AxisStatus::Evaluation(EvaluationStatus::Completed)),
        "simple evaluation not completed"
    );
    eyre::ensure!(
        status.axis(TaskAxis::Implementation).map(|view| view.status)
            == Some(AxisStatus::Implementation(ImplementationStatus::Completed)),
        "implementation not completed"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resync_keeps_evaluation_state() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    let commands = stack.commands();
    stack.issues.set(vec![issue(3, "Add audit log")]);
    stack.synchronizer("worker-a").sync(stack.source.id()).await?;
    let task_id = stack
        .tasks
        .list_by_source(stack.source.id())
        .await?
        .first()
        .map(foreman::task::domain::Task::id)
        .ok_or_else(|| eyre::eyre!("synced task missing"))?;
    commands
        .request_evaluation(task_id, EvaluationKind::Simple)
        .await?;

    stack.issues.set(vec![issue(3, "Add structured audit log")]);
    let report = stack.synchronizer("worker-b").sync(stack.source.id()).await?;
    eyre::ensure!(report.updated == 1, "expected one updated task, got {report:?}");

    let status = commands
        .task_status(task_id)
        .await?
        .ok_or_else(|| eyre::eyre!("task status missing"))?;
    eyre::ensure!(status.title == "Add structured audit log", "title not refreshed");
    eyre::ensure!(
        status.axis(TaskAxis::SimpleEvaluation).map(|view| view.status)
            == Some(AxisStatus::Evaluation(EvaluationStatus::Queued)),
        "resync disturbed the queued evaluation"
    );
    let source = commands
        .source_status(stack.source.id())
        .await?
        .ok_or_else(|| eyre::eyre!("source status missing"))?;
    eyre::ensure!(source.sync_status == SyncStatus::Completed, "sync not completed");
    eyre::ensure!(source.task_count == 1, "resync duplicated the task");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sweeper_fails_an_abandoned_pipeline() -> Result<(), eyre::Report> {
    let stack = Stack::new().await;
    let commands = stack.commands();
    stack.issues.set(vec![issue(9, "Cache tokens")]);
    stack.synchronizer("worker-a").sync(stack.source.id()).await?;
    let task_id = stack
        .tasks
        .list_by_source(stack.source.id())
        .await?
        .first()
        .map(foreman::task::domain::Task::id)
        .ok_or_else(|| eyre::eyre!("synced task missing"))?;
    commands
        .request_evaluation(task_id, EvaluationKind::Simple)
        .await?;
    stack.completion.push(READY_EVALUATION);
    stack
        .gate()
        .process_queued(EvaluationKind::Simple, 10)
        .await?;
    commands.request_implementation(task_id).await?;
    stack.completion.push(CHANGE_SET);
    stack.dispatcher().process_queued(10).await?;
    let launched = stack.monitor().launch_pending(10).await?;
    let [LaunchOutcome::Started { execution_id }] = launched.as_slice() else {
        eyre::bail!("unexpected launch outcome {launched:?}");
    };

    stack.clock.advance(Duration::minutes(31));
    let report = stack.sweeper().sweep().await?;
    eyre::ensure!(report.failed.len() == 1, "expected one failed row, got {report:?}");
    let execution = stack
        .executions
        .find_by_id(*execution_id)
        .await?
        .ok_or_else(|| eyre::eyre!("execution missing"))?;
    eyre::ensure!(execution.status() == PipelineStatus::Failed, "execution not failed");
    eyre::ensure!(
        stack.completion.calls() == 2,
        "expected one evaluation and one implementation call"
    );
    Ok(())
}
