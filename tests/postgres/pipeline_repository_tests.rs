//! Pipeline execution and artifact repositories against `PostgreSQL`.

use super::helpers::temporary_database;
use chrono::{DateTime, Duration, Utc};
use foreman::implementation::{
    adapters::postgres::PostgresSessionRepository,
    domain::{ChangeSet, FileAction, FileChange, Session, SessionKind},
    ports::SessionRepository,
};
use foreman::pipeline::{
    adapters::postgres::{PostgresPipelineArtifactRepository, PostgresPipelineExecutionRepository},
    domain::{
        ExecutionHandle, PipelineExecution, PipelineOutputs, PipelineStatus, derive_artifacts,
    },
    ports::{PipelineArtifactRepository, PipelineExecutionRepository},
};
use foreman::provider::domain::TokenUsage;
use foreman::task::domain::GuardedUpdate;
use mockable::DefaultClock;
use rstest::rstest;

fn timestamp() -> DateTime<Utc> {
    foreman::clock::now(&DefaultClock)
}

async fn succeeded_execution(
    sessions: &PostgresSessionRepository,
    executions: &PostgresPipelineExecutionRepository,
) -> Result<PipelineExecution, eyre::Report> {
    let at = timestamp();
    let session = Session::start(None, SessionKind::Implementation, "foreman", "prompt", at)?;
    sessions.store(&session).await?;
    let mut execution = PipelineExecution::start(
        session.id(),
        None,
        "acme/widgets",
        "foreman/retry",
        ExecutionHandle::new("run-1")?,
        Some("https://ci.example.com/runs/1".to_owned()),
        at,
    )?;
    executions.store(&execution).await?;

    let guard = execution.guard();
    execution.observe(
        PipelineStatus::Success,
        PipelineOutputs {
            merge_request_url: Some("https://github.com/acme/widgets/pull/7".to_owned()),
            branch: Some("foreman/retry".to_owned()),
            execution_result: Some("all green".to_owned()),
            ..PipelineOutputs::default()
        },
        None,
        timestamp(),
    )?;
    let written = executions.update_guarded(&execution, &guard).await?;
    if written != GuardedUpdate::Applied {
        eyre::bail!("execution update conflicted");
    }
    Ok(execution)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn artifacts_are_deduplicated_on_their_natural_key() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let sessions = PostgresSessionRepository::new(db.pool());
    let executions = PostgresPipelineExecutionRepository::new(db.pool());
    let artifacts = PostgresPipelineArtifactRepository::new(db.pool());
    let execution = succeeded_execution(&sessions, &executions).await?;

    let derived = derive_artifacts(&execution, timestamp());
    let mut first_pass = 0;
    for artifact in &derived {
        if artifacts.insert_if_absent(artifact).await? {
            first_pass += 1;
        }
    }
    let mut second_pass = 0;
    for artifact in derive_artifacts(&execution, timestamp()) {
        if artifacts.insert_if_absent(&artifact).await? {
            second_pass += 1;
        }
    }

    eyre::ensure!(first_pass == derived.len(), "first pass wrote {first_pass} rows");
    eyre::ensure!(second_pass == 0, "second pass wrote {second_pass} rows");
    let stored = artifacts.list_by_execution(execution.id()).await?.len();
    eyre::ensure!(stored == derived.len(), "expected {} rows, found {stored}", derived.len());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recorded_successes_leave_the_unrecorded_list() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let sessions = PostgresSessionRepository::new(db.pool());
    let executions = PostgresPipelineExecutionRepository::new(db.pool());
    let mut execution = succeeded_execution(&sessions, &executions).await?;

    let pending = executions.list_unrecorded_successes(10).await?;
    eyre::ensure!(
        pending.iter().map(PipelineExecution::id).collect::<Vec<_>>() == vec![execution.id()],
        "expected the succeeded execution to await recording"
    );
    eyre::ensure!(
        executions.list_active(10).await?.is_empty(),
        "succeeded execution listed as active"
    );

    let guard = execution.guard();
    execution.mark_artifacts_recorded(timestamp())?;
    eyre::ensure!(
        executions.update_guarded(&execution, &guard).await? == GuardedUpdate::Applied,
        "recording stamp was not written"
    );
    eyre::ensure!(
        executions.list_unrecorded_successes(10).await?.is_empty(),
        "recorded execution still listed"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_claims_without_a_launch_are_listed_again() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let sessions = PostgresSessionRepository::new(db.pool());
    let at = timestamp();
    let mut session = Session::start(None, SessionKind::Implementation, "foreman", "prompt", at)?;
    let change_set = ChangeSet {
        branch: "foreman/retry".to_owned(),
        commit_message: "Retry uploads".to_owned(),
        summary: None,
        files: vec![FileChange {
            path: "src/upload.rs".to_owned(),
            action: FileAction::Modify,
            content: Some("// retried".to_owned()),
        }],
    };
    session.complete(TokenUsage::default(), Some(change_set), at)?;
    sessions.store(&session).await?;
    sessions.claim_handoff(session.id(), None, at).await?;

    let fresh = sessions.list_awaiting_pipeline(at, 10).await?;
    let stale = sessions
        .list_awaiting_pipeline(at + Duration::seconds(1), 10)
        .await?;
    eyre::ensure!(fresh.is_empty(), "fresh claim listed as awaiting");
    eyre::ensure!(stale.len() == 1, "stale claim not listed, found {}", stale.len());

    sessions.record_launch(session.id(), at).await?;
    let launched = sessions
        .list_awaiting_pipeline(at + Duration::seconds(1), 10)
        .await?;
    eyre::ensure!(launched.is_empty(), "launched session still listed");
    Ok(())
}
