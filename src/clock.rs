//! Timestamp helpers over [`mockable::Clock`].

use chrono::{DateTime, SubsecRound, Utc};
use mockable::Clock;

/// Returns the current UTC time truncated to microseconds.
///
/// Stored timestamps double as optimistic-concurrency tokens, so they are
/// kept at the precision `PostgreSQL` persists.
#[must_use]
pub fn now(clock: &(impl Clock + ?Sized)) -> DateTime<Utc> {
    clock.utc().trunc_subsecs(6)
}
