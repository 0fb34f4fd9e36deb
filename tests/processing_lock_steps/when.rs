//! When steps for processing lock BDD scenarios.

use super::world::{LOCK_TIMEOUT_SECONDS, LockWorld, run_async};
use eyre::WrapErr;
use foreman::lock::domain::{LockKey, WorkerId};
use foreman::task::domain::IssueKey;
use rstest_bdd_macros::when;

/// Builds the lock key for `issue` in the scenario project.
pub(super) fn lock_key(world: &LockWorld, issue: &str) -> Result<LockKey, eyre::Report> {
    let issue_key = IssueKey::parse(issue).wrap_err("parse issue key")?;
    Ok(LockKey::new(world.project_id, issue_key))
}

/// Parses a worker identity.
pub(super) fn worker(name: &str) -> Result<WorkerId, eyre::Report> {
    WorkerId::new(name).wrap_err("parse worker id")
}

#[when(r#"worker "{candidate}" tries to take the lock for issue "{issue}""#)]
fn worker_tries_lock(
    world: &mut LockWorld,
    candidate: String,
    issue: String,
) -> Result<(), eyre::Report> {
    let key = lock_key(world, &issue)?;
    let outcome = run_async(world.service.acquire(
        &key,
        &worker(&candidate)?,
        LOCK_TIMEOUT_SECONDS,
    ))
    .wrap_err("attempt lock acquisition")?;
    world.last_outcome = Some(outcome);
    Ok(())
}

#[when(r#"worker "{holder}" releases the lock for issue "{issue}""#)]
fn worker_releases_lock(
    world: &mut LockWorld,
    holder: String,
    issue: String,
) -> Result<(), eyre::Report> {
    let key = lock_key(world, &issue)?;
    run_async(world.service.release(&key, &worker(&holder)?)).wrap_err("release lock")?;
    Ok(())
}
