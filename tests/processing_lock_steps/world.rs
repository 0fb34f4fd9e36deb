//! Shared world state for processing lock BDD scenarios.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use foreman::lock::{
    adapters::memory::InMemoryLockStore, domain::AcquireOutcome, services::ProcessingLockService,
};
use foreman::task::domain::ProjectId;
use mockable::Clock;
use rstest::fixture;

/// Lock timeout every scenario uses.
pub const LOCK_TIMEOUT_SECONDS: u32 = 60;

/// Clock the scenarios move by hand.
#[derive(Debug)]
pub struct StepClock {
    now: Mutex<DateTime<Utc>>,
}

impl StepClock {
    /// Advances the clock by `by`.
    ///
    /// # Errors
    ///
    /// Returns an error when the clock mutex is poisoned.
    pub fn advance(&self, by: Duration) -> Result<(), eyre::Report> {
        let mut now = self
            .now
            .lock()
            .map_err(|err| eyre::eyre!("clock lock poisoned: {err}"))?;
        *now += by;
        Ok(())
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(
                Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            ),
        }
    }
}

impl Clock for StepClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |now| *now)
    }
}

/// Lock service type used by the BDD world.
pub type TestLockService = ProcessingLockService<InMemoryLockStore, StepClock>;

/// Scenario world for processing lock behaviour tests.
pub struct LockWorld {
    pub clock: Arc<StepClock>,
    pub service: TestLockService,
    pub project_id: ProjectId,
    pub last_outcome: Option<AcquireOutcome>,
}

impl LockWorld {
    /// Creates a world with an empty lock store.
    #[must_use]
    pub fn new() -> Self {
        let clock = Arc::new(StepClock::default());
        let service =
            ProcessingLockService::new(Arc::new(InMemoryLockStore::new()), Arc::clone(&clock));
        Self {
            clock,
            service,
            project_id: ProjectId::new(),
            last_outcome: None,
        }
    }
}

impl Default for LockWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> LockWorld {
    LockWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
