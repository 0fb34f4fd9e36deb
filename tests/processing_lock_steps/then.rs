//! Then steps for processing lock BDD scenarios.

use super::when::lock_key;
use super::world::{LockWorld, run_async};
use eyre::WrapErr;
use foreman::lock::domain::AcquireOutcome;
use rstest_bdd_macros::then;

fn last_outcome(world: &LockWorld) -> Result<&AcquireOutcome, eyre::Report> {
    world
        .last_outcome
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing acquisition outcome"))
}

#[then("the lock is granted")]
fn lock_is_granted(world: &LockWorld) -> Result<(), eyre::Report> {
    eyre::ensure!(last_outcome(world)?.is_granted(), "lock was denied");
    Ok(())
}

#[then("the lock is denied")]
fn lock_is_denied(world: &LockWorld) -> Result<(), eyre::Report> {
    eyre::ensure!(!last_outcome(world)?.is_granted(), "lock was granted");
    Ok(())
}

#[then(r#"the lock for issue "{issue}" is held by "{holder}""#)]
fn lock_is_held_by(world: &LockWorld, issue: String, holder: String) -> Result<(), eyre::Report> {
    let key = lock_key(world, &issue)?;
    let lock = run_async(world.service.holder(&key))
        .wrap_err("read lock holder")?
        .ok_or_else(|| eyre::eyre!("no live lock for {issue}"))?;
    eyre::ensure!(
        lock.worker_id().as_str() == holder,
        "expected holder {holder}, found {}",
        lock.worker_id()
    );
    Ok(())
}
