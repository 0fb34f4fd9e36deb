//! Then steps for task source synchronization BDD scenarios.

use super::world::{SyncWorld, run_async};
use eyre::WrapErr;
use foreman::sync::domain::SyncReport;
use foreman::task::{
    domain::{IssueKey, IssueProvider, IssueReference, SyncStatus},
    ports::{TaskRepository, TaskSourceRepository},
};
use rstest_bdd_macros::then;

fn report(world: &SyncWorld) -> Result<&SyncReport, eyre::Report> {
    world
        .last_result()?
        .as_ref()
        .map_err(|err| eyre::eyre!("sync failed unexpectedly: {err}"))
}

#[then("the sync created {count:usize} tasks")]
fn sync_created(world: &SyncWorld, count: usize) -> Result<(), eyre::Report> {
    let created = report(world)?.created;
    eyre::ensure!(created == count, "expected {count} created, found {created}");
    Ok(())
}

#[then("the sync updated {count:usize} tasks")]
fn sync_updated(world: &SyncWorld, count: usize) -> Result<(), eyre::Report> {
    let updated = report(world)?.updated;
    eyre::ensure!(updated == count, "expected {count} updated, found {updated}");
    Ok(())
}

#[then("the sync reported {count:usize} issue errors")]
fn sync_reported_errors(world: &SyncWorld, count: usize) -> Result<(), eyre::Report> {
    let errors = report(world)?.errors.len();
    eyre::ensure!(errors == count, "expected {count} issue errors, found {errors}");
    Ok(())
}

#[then("the sync fails")]
fn sync_fails(world: &SyncWorld) -> Result<(), eyre::Report> {
    eyre::ensure!(world.last_result()?.is_err(), "sync succeeded unexpectedly");
    Ok(())
}

#[then(r#"the source sync status is "{status}""#)]
fn source_sync_status(world: &SyncWorld, status: String) -> Result<(), eyre::Report> {
    let expected = SyncStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let source_id = world.source()?.id();
    let stored = run_async(world.sources.find_by_id(source_id))
        .wrap_err("load task source")?
        .ok_or_else(|| eyre::eyre!("task source missing"))?;
    eyre::ensure!(
        stored.sync_status() == expected,
        "expected sync status {expected}, found {}",
        stored.sync_status()
    );
    Ok(())
}

#[then(r#"the task for issue {number:u64} is titled "{title}""#)]
fn task_is_titled(world: &SyncWorld, number: u64, title: String) -> Result<(), eyre::Report> {
    let reference = IssueReference::numbered(IssueProvider::GitHub, "acme/widgets", number)
        .wrap_err("build issue reference")?;
    let source_id = world.source()?.id();
    let key = IssueKey::from_reference(&reference);
    let task = run_async(world.tasks.find_by_issue_key(source_id, &key))
        .wrap_err("load task")?
        .ok_or_else(|| eyre::eyre!("no task for issue {number}"))?;
    eyre::ensure!(
        task.title() == title,
        "expected title {title:?}, found {:?}",
        task.title()
    );
    Ok(())
}
