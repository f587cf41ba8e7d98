//! Persistence for accounts and refresh-token sessions.
//!
//! - [`repositories`] -- sqlx queries against Postgres, one zero-sized repo per table.
//! - [`store`] -- the [`UserStore`] / [`SessionStore`] traits the auth layer
//!   depends on, and [`PgStore`] which implements them over the repositories.
//! - [`memory`] -- an in-process implementation of the same traits.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use memory::MemoryStore;
pub use store::{PgStore, SessionStore, StoreError, UserStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
