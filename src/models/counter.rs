//! # Counter Snapshot Model
//!
//! Durable, best-effort snapshot of a cache-resident counter. Maps to
//! `runtime_counters`. The live value stays in the cache; these rows are
//! written on demand and are never authoritative for increments.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

const COUNTER_COLUMNS: &str = r#"
    id,
    key,
    value,
    source,
    expires_at,
    created_at,
    updated_at
"#;

/// Whether an upsert created a new row or refreshed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Counter {
    pub id: i64,
    pub key: String,
    pub value: i64,
    /// Provenance tag, normally `"cache"`
    pub source: String,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Counter {
    /// Last-snapshot-wins upsert keyed by counter name.
    ///
    /// Tries an in-place refresh first; only a missing row inserts. The
    /// insert still carries `ON CONFLICT DO UPDATE` so a concurrent first
    /// snapshot degrades to a refresh instead of an error.
    pub async fn upsert_snapshot(
        pool: &PgPool,
        key: &str,
        value: i64,
        source: &str,
        expires_at: Option<NaiveDateTime>,
    ) -> Result<(Self, SnapshotOutcome), sqlx::Error> {
        let update = format!(
            r#"
            UPDATE runtime_counters
            SET value = $2, source = $3, expires_at = $4, updated_at = NOW()
            WHERE key = $1
            RETURNING {COUNTER_COLUMNS}
            "#
        );

        if let Some(row) = sqlx::query_as::<_, Self>(&update)
            .bind(key)
            .bind(value)
            .bind(source)
            .bind(expires_at)
            .fetch_optional(pool)
            .await?
        {
            return Ok((row, SnapshotOutcome::Updated));
        }

        let insert = format!(
            r#"
            INSERT INTO runtime_counters (key, value, source, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                source = EXCLUDED.source,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            RETURNING {COUNTER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, Self>(&insert)
            .bind(key)
            .bind(value)
            .bind(source)
            .bind(expires_at)
            .fetch_one(pool)
            .await?;

        Ok((row, SnapshotOutcome::Created))
    }

    pub async fn find_by_key(pool: &PgPool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {COUNTER_COLUMNS}
            FROM runtime_counters
            WHERE key = $1
            "#
        );

        sqlx::query_as::<_, Self>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Total persisted snapshot rows, for the health diagnostic.
    pub async fn count_rows(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM runtime_counters")
            .fetch_one(pool)
            .await
    }
}
