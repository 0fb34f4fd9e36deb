//! Acquisition, expiry and release behaviour of the processing lock.

use crate::lock::{
    adapters::memory::InMemoryLockStore,
    domain::{AcquireOutcome, LockDomainError, LockKey, ReleaseOutcome, WorkerId},
    services::{LockServiceError, ProcessingLockService},
};
use crate::task::domain::{IssueKey, ProjectId};
use crate::test_support::ManualClock;
use chrono::Duration;
use rstest::{fixture, rstest};
use std::sync::Arc;

type Service = ProcessingLockService<InMemoryLockStore, ManualClock>;

struct Harness {
    service: Arc<Service>,
    clock: Arc<ManualClock>,
    key: LockKey,
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(ManualClock::default());
    let service = Arc::new(ProcessingLockService::new(
        Arc::new(InMemoryLockStore::new()),
        Arc::clone(&clock),
    ));
    let key = LockKey::new(
        ProjectId::new(),
        IssueKey::parse("github:acme/widgets#12").expect("valid issue key"),
    );
    Harness {
        service,
        clock,
        key,
    }
}

fn worker(name: &str) -> WorkerId {
    WorkerId::new(name).expect("valid worker id")
}

#[rstest]
#[tokio::test]
async fn first_acquire_is_granted(harness: Harness) {
    let outcome = harness
        .service
        .acquire(&harness.key, &worker("w1"), 60)
        .await
        .expect("acquire should succeed");

    let AcquireOutcome::Granted(lock) = outcome else {
        panic!("expected a granted lock, got {outcome:?}");
    };
    assert_eq!(lock.worker_id().as_str(), "w1");
}

#[rstest]
#[tokio::test]
async fn live_lock_denies_other_workers(harness: Harness) {
    harness
        .service
        .acquire(&harness.key, &worker("w1"), 60)
        .await
        .expect("first acquire");

    let outcome = harness
        .service
        .acquire(&harness.key, &worker("w2"), 60)
        .await
        .expect("second acquire");

    assert_eq!(
        outcome,
        AcquireOutcome::Denied {
            holder: Some(worker("w1"))
        }
    );
}

#[rstest]
#[case::at_the_boundary(60, false)]
#[case::one_second_past(61, true)]
#[tokio::test]
async fn expired_lock_is_reclaimed(
    harness: Harness,
    #[case] elapsed_seconds: i64,
    #[case] reclaimed: bool,
) {
    harness
        .service
        .acquire(&harness.key, &worker("w1"), 60)
        .await
        .expect("first acquire");
    harness.clock.advance(Duration::seconds(elapsed_seconds));

    let outcome = harness
        .service
        .acquire(&harness.key, &worker("w2"), 60)
        .await
        .expect("second acquire");

    assert_eq!(outcome.is_granted(), reclaimed);
}

#[rstest]
#[tokio::test]
async fn released_lock_is_immediately_available(harness: Harness) {
    let w1 = worker("w1");
    harness
        .service
        .acquire(&harness.key, &w1, 60)
        .await
        .expect("first acquire");

    let released = harness
        .service
        .release(&harness.key, &w1)
        .await
        .expect("release");
    let outcome = harness
        .service
        .acquire(&harness.key, &worker("w2"), 60)
        .await
        .expect("second acquire");

    assert_eq!(released, ReleaseOutcome::Released);
    assert!(outcome.is_granted());
    assert!(
        harness
            .service
            .holder(&harness.key)
            .await
            .expect("holder lookup")
            .is_some_and(|lock| lock.worker_id().as_str() == "w2")
    );
}

#[rstest]
#[tokio::test]
async fn release_by_non_holder_changes_nothing(harness: Harness) {
    harness
        .service
        .acquire(&harness.key, &worker("w1"), 60)
        .await
        .expect("first acquire");

    let outcome = harness
        .service
        .release(&harness.key, &worker("w2"))
        .await
        .expect("release");

    assert_eq!(outcome, ReleaseOutcome::NotOwner);
    assert!(
        harness
            .service
            .holder(&harness.key)
            .await
            .expect("holder lookup")
            .is_some()
    );
}

#[rstest]
#[tokio::test]
async fn zero_timeout_is_rejected(harness: Harness) {
    let result = harness.service.acquire(&harness.key, &worker("w1"), 0).await;

    assert!(matches!(
        result,
        Err(LockServiceError::Domain(LockDomainError::ZeroTimeout))
    ));
}

#[rstest]
#[case(2)]
#[case(8)]
#[case(32)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_grant_exactly_one(harness: Harness, #[case] contenders: usize) {
    let mut handles = Vec::with_capacity(contenders);
    for index in 0..contenders {
        let service = Arc::clone(&harness.service);
        let key = harness.key.clone();
        handles.push(tokio::spawn(async move {
            service
                .acquire(&key, &worker(&format!("w{index}")), 60)
                .await
                .expect("acquire should not error")
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.expect("task should join").is_granted() {
            granted += 1;
        }
    }

    assert_eq!(granted, 1);
}

#[rstest]
fn blank_worker_id_is_rejected() {
    assert_eq!(WorkerId::new("  "), Err(LockDomainError::EmptyWorkerId));
}
