//! The engine, wired from configuration, moving one issue from the tracker
//! to recorded artifacts on its own timers.

use super::helpers::{CHANGE_SET, READY_EVALUATION, Stack, issue};
use foreman::config::EngineConfig;
use foreman::engine::{
    ArtifactStage, Engine, EvaluationStage, ImplementationStage, PipelineStage, SweepStage,
    SyncStage,
};
use foreman::implementation::{domain::SessionKind, ports::SessionRepository};
use foreman::pipeline::{
    domain::{ArtifactType, PipelineOutputs, PipelineStatus},
    ports::{PipelineArtifactRepository, PipelineExecutionRepository},
};
use foreman::task::{
    domain::{EvaluationKind, EvaluationStatus, ImplementationStatus, Task, TaskId},
    ports::TaskRepository,
    services::RequestOutcome,
};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const WAIT_STEP: Duration = Duration::from_secs(5);
const WAIT_STEPS: usize = 1_000;

async fn eventually<F, Fut>(what: &str, check: F) -> Result<(), eyre::Report>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool, eyre::Report>>,
{
    for _ in 0..WAIT_STEPS {
        if check().await? {
            return Ok(());
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    eyre::bail!("timed out waiting for {what}")
}

async fn find_task(stack: &Stack, task_id: TaskId) -> Result<Task, eyre::Report> {
    stack
        .tasks
        .find_by_id(task_id)
        .await?
        .ok_or_else(|| eyre::eyre!("task {task_id} missing"))
}

fn configured_engine(stack: &Stack, config: &EngineConfig) -> Result<Engine, eyre::Report> {
    let batch = config.batch_size;
    let synchronizer = Arc::new(stack.synchronizer_with(config.sync_settings()?));
    let gate = Arc::new(stack.gate().with_settings(config.evaluation_settings()));
    let dispatcher = Arc::new(stack.dispatcher().with_settings(config.implementation_settings()));
    let monitor = Arc::new(stack.monitor().with_settings(config.monitor_settings()));
    let recorder = Arc::new(stack.recorder());
    let sweeper = Arc::new(stack.sweeper().with_config(config.sweep_config()));

    Ok(Engine::new()
        .with_shutdown_grace(config.shutdown_grace())
        .with_stage(
            SyncStage::new(synchronizer, config.sync_due_after(), batch),
            config.sync_interval(),
        )
        .with_stage(
            EvaluationStage::new(gate, batch),
            config.evaluation_poll_interval(),
        )
        .with_stage(
            ImplementationStage::new(dispatcher, batch),
            config.evaluation_poll_interval(),
        )
        .with_stage(
            PipelineStage::new(monitor, batch),
            config.pipeline_poll_interval(),
        )
        .with_stage(
            ArtifactStage::new(recorder, batch),
            config.evaluation_poll_interval(),
        )
        .with_stage(SweepStage::new(sweeper), config.sweep_interval()))
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn configured_engine_carries_an_issue_to_recorded_artifacts() -> Result<(), eyre::Report> {
    let config = EngineConfig::from_toml_str(
        r#"
        worker_id = "engine-test"
        evaluation_poll_interval_seconds = 20
        pipeline_poll_interval_seconds = 120
        "#,
    )?;
    config.validate()?;
    let stack = Stack::new().await;
    let commands = stack
        .commands()
        .with_policy(config.advanced_evaluation_policy);
    stack.issues.set(vec![issue(21, "Retry flaky uploads")]);
    stack.completion.push(READY_EVALUATION);
    stack.completion.push(CHANGE_SET);
    stack.ci.push(PipelineStatus::Running, PipelineOutputs::default());
    stack.ci.push(
        PipelineStatus::Success,
        PipelineOutputs {
            merge_request_url: Some("https://github.com/acme/widgets/pull/21".to_owned()),
            branch: Some("foreman/retry".to_owned()),
            commit: Some("9b1c2d3".to_owned()),
            ..PipelineOutputs::default()
        },
    );
    eyre::ensure!(
        commands.request_sync(stack.source.id()).await? == RequestOutcome::Enqueued,
        "sync not queued"
    );

    let cancel = CancellationToken::new();
    let engine = configured_engine(&stack, &config)?;
    let running = tokio::spawn(engine.run(cancel.clone()));
    let stack_ref = &stack;

    eventually("the synced task", move || async move {
        let synced = stack_ref.tasks.list_by_source(stack_ref.source.id()).await?;
        Ok::<_, eyre::Report>(synced.len() == 1)
    })
    .await?;
    let task_id = stack
        .tasks
        .list_by_source(stack.source.id())
        .await?
        .first()
        .map(Task::id)
        .ok_or_else(|| eyre::eyre!("synced task missing"))?;

    commands
        .request_evaluation(task_id, EvaluationKind::Simple)
        .await?;
    eventually("the simple evaluation", move || async move {
        let task = find_task(stack_ref, task_id).await?;
        Ok::<_, eyre::Report>(task.simple_evaluation().status() == EvaluationStatus::Completed)
    })
    .await?;

    commands.request_implementation(task_id).await?;
    eventually("the implementation", move || async move {
        let task = find_task(stack_ref, task_id).await?;
        Ok::<_, eyre::Report>(task.implementation().status() == ImplementationStatus::Completed)
    })
    .await?;

    let session = stack
        .sessions
        .list_by_task(task_id)
        .await?
        .into_iter()
        .find(|session| session.kind() == SessionKind::Implementation)
        .ok_or_else(|| eyre::eyre!("implementation session missing"))?;
    let session_id = session.id();
    eventually("the recorded artifacts", move || async move {
        let executions = stack_ref.executions.list_by_session(session_id).await?;
        Ok::<_, eyre::Report>(
            executions
                .first()
                .is_some_and(|execution| execution.artifacts_recorded_at().is_some()),
        )
    })
    .await?;

    cancel.cancel();
    running.await?;

    let executions = stack.executions.list_by_session(session_id).await?;
    let [execution] = executions.as_slice() else {
        eyre::bail!("expected one execution, found {}", executions.len());
    };
    eyre::ensure!(
        execution.status() == PipelineStatus::Success,
        "execution ended {}",
        execution.status()
    );
    eyre::ensure!(stack.ci.started().len() == 1, "CI started more than once");
    let artifacts = stack.artifacts.list_by_execution(execution.id()).await?;
    for expected in [ArtifactType::MergeRequest, ArtifactType::Branch, ArtifactType::Commit] {
        eyre::ensure!(
            artifacts.iter().any(|artifact| artifact.artifact_type() == expected),
            "{expected} artifact missing"
        );
    }
    eyre::ensure!(stack.completion.calls() == 2, "unexpected completion calls");
    Ok(())
}
