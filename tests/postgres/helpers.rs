//! Shared test helpers for `PostgreSQL` integration tests.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use eyre::WrapErr;
use foreman::persistence::PgPool;
use uuid::Uuid;

/// Server URL the tests connect to; unset skips the tests.
pub const DATABASE_URL_ENV: &str = "FOREMAN_TEST_DATABASE_URL";

const MIGRATIONS: [&str; 5] = [
    include_str!("../../migrations/2026-03-01-000000_create_processing_locks/up.sql"),
    include_str!("../../migrations/2026-03-01-000001_create_task_sources_and_tasks/up.sql"),
    include_str!("../../migrations/2026-03-01-000002_create_sessions/up.sql"),
    include_str!("../../migrations/2026-03-01-000003_create_pipeline_tables/up.sql"),
    include_str!("../../migrations/2026-03-01-000004_create_provider_configs/up.sql"),
];

/// A migrated database dropped when the value goes out of scope.
pub struct TemporaryDatabase {
    admin_url: String,
    name: String,
    pool: PgPool,
}

impl TemporaryDatabase {
    /// Returns a pool connected to the database.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

impl Drop for TemporaryDatabase {
    fn drop(&mut self) {
        let statement = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.name);
        let dropped = PgConnection::establish(&self.admin_url)
            .wrap_err("connect to drop test database")
            .and_then(|mut conn| {
                conn.batch_execute(&statement)
                    .wrap_err("drop test database")
            });
        if let Err(err) = dropped {
            tracing::warn!(database = %self.name, error = %err, "test database left behind");
        }
    }
}

fn database_url(admin_url: &str, name: &str) -> Result<String, eyre::Report> {
    let (server, _) = admin_url
        .rsplit_once('/')
        .ok_or_else(|| eyre::eyre!("{DATABASE_URL_ENV} has no database path"))?;
    Ok(format!("{server}/{name}"))
}

fn create(admin_url: String) -> Result<TemporaryDatabase, eyre::Report> {
    let name = format!("foreman_test_{}", Uuid::new_v4().simple());
    let mut admin = PgConnection::establish(&admin_url).wrap_err("connect to test server")?;
    admin
        .batch_execute(&format!("CREATE DATABASE \"{name}\""))
        .wrap_err("create test database")?;

    let url = database_url(&admin_url, &name)?;
    let mut conn = PgConnection::establish(&url).wrap_err("connect to test database")?;
    for migration in MIGRATIONS {
        conn.batch_execute(migration).wrap_err("apply migration")?;
    }

    let pool = Pool::builder()
        .max_size(4)
        .build(ConnectionManager::<PgConnection>::new(url))
        .wrap_err("build connection pool")?;
    Ok(TemporaryDatabase {
        admin_url,
        name,
        pool,
    })
}

/// Creates a migrated database, or `None` when no server is configured.
///
/// # Errors
///
/// Returns an error if the database cannot be created or migrated.
pub async fn temporary_database() -> Result<Option<TemporaryDatabase>, eyre::Report> {
    let Ok(admin_url) = std::env::var(DATABASE_URL_ENV) else {
        tracing::info!("{DATABASE_URL_ENV} is not set; skipping");
        return Ok(None);
    };
    let database = tokio::task::spawn_blocking(move || create(admin_url))
        .await
        .wrap_err("join database setup")??;
    Ok(Some(database))
}
