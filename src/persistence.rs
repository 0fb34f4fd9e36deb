//! Shared `PostgreSQL` plumbing for the Diesel adapters.
//!
//! Diesel is synchronous, so every adapter offloads its work to
//! [`tokio::task::spawn_blocking`] through [`run_blocking`].

use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};

/// `PostgreSQL` connection pool type shared by every adapter.
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Error types that can carry an opaque persistence failure.
pub(crate) trait PersistenceFailure: Send + 'static {
    /// Wraps an infrastructure error.
    fn from_persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self;
}

/// Checks out a connection and runs `f` on the blocking thread pool.
pub(crate) async fn run_blocking<F, T, E>(pool: &PgPool, f: F) -> Result<T, E>
where
    F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: PersistenceFailure,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection = pool.get().map_err(pool_error::<E>)?;
        f(&mut connection)
    })
    .await
    .map_err(E::from_persistence)?
}

fn pool_error<E: PersistenceFailure>(err: PoolError) -> E {
    E::from_persistence(err)
}

/// Converts a stored non-negative counter.
pub(crate) fn counter_from_db<E: PersistenceFailure>(value: i32) -> Result<u32, E> {
    u32::try_from(value).map_err(E::from_persistence)
}

/// Converts a counter for storage.
pub(crate) fn counter_to_db<E: PersistenceFailure>(value: u32) -> Result<i32, E> {
    i32::try_from(value).map_err(E::from_persistence)
}

/// Converts a stored non-negative 64-bit count.
pub(crate) fn count_from_db<E: PersistenceFailure>(value: i64) -> Result<u64, E> {
    u64::try_from(value).map_err(E::from_persistence)
}

/// Converts a 64-bit count for storage.
pub(crate) fn count_to_db<E: PersistenceFailure>(value: u64) -> Result<i64, E> {
    i64::try_from(value).map_err(E::from_persistence)
}

/// Converts a query limit for storage.
pub(crate) fn limit_to_db<E: PersistenceFailure>(value: usize) -> Result<i64, E> {
    i64::try_from(value).map_err(E::from_persistence)
}

macro_rules! persistence_failure {
    ($($ty:ty),* $(,)?) => {
        $(impl $crate::persistence::PersistenceFailure for $ty {
            fn from_persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
                Self::persistence(err)
            }
        })*
    };
}

pub(crate) use persistence_failure;
