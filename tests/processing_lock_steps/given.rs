//! Given steps for processing lock BDD scenarios.

use super::when::{lock_key, worker};
use super::world::{LOCK_TIMEOUT_SECONDS, LockWorld, run_async};
use chrono::Duration;
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given(r#"worker "{holder}" holds the lock for issue "{issue}""#)]
fn worker_holds_lock(world: &mut LockWorld, holder: String, issue: String) -> Result<(), eyre::Report> {
    let key = lock_key(world, &issue)?;
    let outcome = run_async(world.service.acquire(&key, &worker(&holder)?, LOCK_TIMEOUT_SECONDS))
        .wrap_err("acquire initial lock")?;
    eyre::ensure!(outcome.is_granted(), "initial lock was not granted");
    Ok(())
}

#[given("{seconds:i64} seconds pass")]
fn seconds_pass(world: &mut LockWorld, seconds: i64) -> Result<(), eyre::Report> {
    world.clock.advance(Duration::seconds(seconds))
}
