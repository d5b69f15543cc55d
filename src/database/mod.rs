//! # Database Connection
//!
//! Pool construction, embedded migrations, and a connectivity ping for the
//! durable store backing the idempotency ledger and counter snapshots.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::Result;

/// Build a connection pool against the configured database.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the coordination schema migrations embedded at compile time.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| crate::error::CoordinationError::database("migrate", e.to_string()))?;
    Ok(())
}

/// Connectivity ping used by startup checks.
pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let row = sqlx::query("SELECT 1 as health").fetch_one(pool).await?;
    let health: i32 = row.get("health");
    Ok(health == 1)
}
