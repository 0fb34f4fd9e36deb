//! Given steps for task source synchronization BDD scenarios.

use super::world::{SyncWorld, run_async};
use chrono::Utc;
use eyre::WrapErr;
use foreman::provider::{SecretId, SecretString, ports::SecretStore};
use foreman::sync::domain::FetchedIssue;
use foreman::task::{
    domain::{IssueProvider, IssueReference, IssueSourceConfig, ProjectId, TaskSource},
    ports::TaskSourceRepository,
};
use rstest_bdd_macros::given;

fn github_source(world: &mut SyncWorld, store_token: bool) -> Result<(), eyre::Report> {
    let token = SecretId::new("github-token").wrap_err("build secret id")?;
    let source = TaskSource::new(
        ProjectId::new(),
        "backend",
        IssueSourceConfig::GitHub {
            host: "https://api.github.com".to_owned(),
            owner: "acme".to_owned(),
            repository: "widgets".to_owned(),
            token_secret: token.clone(),
        },
        Utc::now(),
    )
    .wrap_err("build task source")?;
    run_async(world.sources.store(&source)).wrap_err("store task source")?;
    if store_token {
        run_async(world.secrets.put(&token, SecretString::new("ghp-test")))
            .wrap_err("store token")?;
    }
    world.source = Some(source);
    Ok(())
}

/// Pushes an issue onto the scenario tracker.
pub(super) fn report_issue(
    world: &SyncWorld,
    number: u64,
    title: &str,
) -> Result<(), eyre::Report> {
    let reference = IssueReference::numbered(IssueProvider::GitHub, "acme/widgets", number)
        .wrap_err("build issue reference")?;
    let mut issues = world
        .tracker
        .issues
        .lock()
        .map_err(|err| eyre::eyre!("tracker lock poisoned: {err}"))?;
    issues.retain(|issue| issue.reference != reference);
    issues.push(FetchedIssue::new(reference, title));
    Ok(())
}

#[given("a GitHub task source with a stored token")]
fn source_with_token(world: &mut SyncWorld) -> Result<(), eyre::Report> {
    github_source(world, true)
}

#[given("a GitHub task source without a stored token")]
fn source_without_token(world: &mut SyncWorld) -> Result<(), eyre::Report> {
    github_source(world, false)
}

#[given(r#"the tracker reports issue {number:u64} titled "{title}""#)]
fn tracker_reports_issue(
    world: &mut SyncWorld,
    number: u64,
    title: String,
) -> Result<(), eyre::Report> {
    report_issue(world, number, &title)
}

#[given("the tracker reports issue {number:u64} with a blank title")]
fn tracker_reports_blank_issue(world: &mut SyncWorld, number: u64) -> Result<(), eyre::Report> {
    report_issue(world, number, "   ")
}

#[given("the source has been synced")]
fn source_has_been_synced(world: &mut SyncWorld) -> Result<(), eyre::Report> {
    let source_id = world.source()?.id();
    run_async(world.synchronizer.sync(source_id)).wrap_err("initial sync")?;
    Ok(())
}
