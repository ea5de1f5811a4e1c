use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Builds a pool without touching the network, so the server can boot while
/// the database is still down.
pub fn connect_lazy_with_timeout(database_url: &str, acquire_timeout: Duration) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(database_url)
        .context("failed to create lazy database pool")
}
