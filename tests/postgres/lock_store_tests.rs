//! Processing lock store against `PostgreSQL`.

use super::helpers::temporary_database;
use chrono::{DateTime, Duration, Utc};
use foreman::lock::{
    adapters::postgres::PostgresLockStore,
    domain::{AcquireOutcome, LockKey, ProcessingLock, ReleaseOutcome, WorkerId},
    ports::ProcessingLockStore,
};
use foreman::task::domain::{IssueKey, ProjectId};
use mockable::DefaultClock;
use rstest::rstest;

fn timestamp() -> DateTime<Utc> {
    foreman::clock::now(&DefaultClock)
}

fn lock_key() -> Result<LockKey, eyre::Report> {
    Ok(LockKey::new(
        ProjectId::new(),
        IssueKey::parse("github:acme/widgets#42")?,
    ))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn live_lock_is_denied_to_other_workers() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let store = PostgresLockStore::new(db.pool());
    let key = lock_key()?;
    let now = timestamp();
    let first = ProcessingLock::processing(key.clone(), WorkerId::new("worker-a")?, now, 60)?;
    let second = ProcessingLock::processing(key.clone(), WorkerId::new("worker-b")?, now, 60)?;

    let granted = store.try_acquire(&first, now).await?;
    let denied = store.try_acquire(&second, now).await?;

    eyre::ensure!(granted.is_granted(), "first worker was denied");
    let expected = AcquireOutcome::Denied {
        holder: Some(WorkerId::new("worker-a")?),
    };
    eyre::ensure!(denied == expected, "second worker was not denied: {denied:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn expired_lock_is_reclaimed() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let store = PostgresLockStore::new(db.pool());
    let key = lock_key()?;
    let start = timestamp();
    let stale = ProcessingLock::processing(key.clone(), WorkerId::new("worker-a")?, start, 60)?;
    store.try_acquire(&stale, start).await?;

    let later = start + Duration::seconds(61);
    let fresh = ProcessingLock::processing(key.clone(), WorkerId::new("worker-b")?, later, 60)?;
    let outcome = store.try_acquire(&fresh, later).await?;

    eyre::ensure!(outcome.is_granted(), "expired lock was not reclaimed");
    let holder = store.find(&key).await?.ok_or_else(|| eyre::eyre!("lock row missing"))?;
    eyre::ensure!(
        holder.worker_id().as_str() == "worker-b",
        "expected worker-b to hold the lock, found {}",
        holder.worker_id()
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn release_is_owner_only() -> Result<(), eyre::Report> {
    let Some(db) = temporary_database().await? else {
        return Ok(());
    };
    let store = PostgresLockStore::new(db.pool());
    let key = lock_key()?;
    let now = timestamp();
    let held = ProcessingLock::processing(key.clone(), WorkerId::new("worker-a")?, now, 60)?;
    store.try_acquire(&held, now).await?;

    let foreign = store.release(&key, &WorkerId::new("worker-b")?).await?;
    let own = store.release(&key, &WorkerId::new("worker-a")?).await?;

    eyre::ensure!(foreign == ReleaseOutcome::NotOwner, "non-holder released the lock");
    eyre::ensure!(own == ReleaseOutcome::Released, "holder could not release");
    let retaken = ProcessingLock::processing(key, WorkerId::new("worker-b")?, now, 60)?;
    eyre::ensure!(
        store.try_acquire(&retaken, now).await?.is_granted(),
        "released lock was not retaken"
    );
    Ok(())
}
