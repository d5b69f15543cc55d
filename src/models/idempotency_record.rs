//! # Idempotency Record Model
//!
//! Durable reservation row backing the idempotency ledger. Maps to
//! `runtime_idempotency_records`.
//!
//! The `(scope, idempotency_key)` uniqueness constraint plus row-level
//! locking is the layer's sole mutual-exclusion mechanism: the ledger holds
//! `find_for_update` / `insert` / `reinitialize` inside one transaction, so
//! those methods take `&mut PgConnection` rather than a pool.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::{FromRow, PgPool};

const RECORD_COLUMNS: &str = r#"
    id,
    scope,
    idempotency_key,
    owner_identity,
    request_fingerprint,
    status_code,
    response_payload,
    expires_at,
    created_at,
    updated_at
"#;

/// A reservation: a durable claim that `(scope, idempotency_key)` is being
/// handled or has been handled within its validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IdempotencyRecord {
    pub id: i64,
    pub scope: String,
    pub idempotency_key: String,
    /// Weak reference to the reserving identity (its cache token), never a
    /// foreign key into the domain's user table
    pub owner_identity: Option<String>,
    /// Observability only; duplicates are not checked against it
    pub request_fingerprint: String,
    pub status_code: i32,
    pub response_payload: serde_json::Value,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Field set for creating or re-initializing a reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdempotencyRecord {
    pub scope: String,
    pub idempotency_key: String,
    pub owner_identity: Option<String>,
    pub request_fingerprint: String,
    pub expires_at: NaiveDateTime,
}

impl IdempotencyRecord {
    /// Reservation has lapsed relative to `now` and may be claimed again.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        now >= self.expires_at
    }

    /// Fetch the row under a row lock, serializing concurrent reservers of
    /// the same `(scope, key)` pair.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        scope: &str,
        idempotency_key: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM runtime_idempotency_records
            WHERE scope = $1 AND idempotency_key = $2
            FOR UPDATE
            "#
        );

        sqlx::query_as::<_, Self>(&query)
            .bind(scope)
            .bind(idempotency_key)
            .fetch_optional(conn)
            .await
    }

    /// Insert a fresh reservation with the in-flight sentinel status.
    ///
    /// A concurrent loser surfaces the unique-constraint violation
    /// (SQLSTATE 23505); the ledger recovers by re-fetching under lock.
    pub async fn insert(
        conn: &mut PgConnection,
        new_record: &NewIdempotencyRecord,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO runtime_idempotency_records
                (scope, idempotency_key, owner_identity, request_fingerprint, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECORD_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Self>(&query)
            .bind(&new_record.scope)
            .bind(&new_record.idempotency_key)
            .bind(&new_record.owner_identity)
            .bind(&new_record.request_fingerprint)
            .bind(new_record.expires_at)
            .fetch_one(conn)
            .await
    }

    /// Re-initialize an expired row in place: same primary key, fresh
    /// reservation state. Reusing the row sidesteps a second
    /// unique-constraint insert race.
    pub async fn reinitialize(
        conn: &mut PgConnection,
        id: i64,
        new_record: &NewIdempotencyRecord,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE runtime_idempotency_records
            SET
                owner_identity = $2,
                request_fingerprint = $3,
                status_code = 202,
                response_payload = '{{}}'::jsonb,
                expires_at = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Self>(&query)
            .bind(id)
            .bind(&new_record.owner_identity)
            .bind(&new_record.request_fingerprint)
            .bind(new_record.expires_at)
            .fetch_one(conn)
            .await
    }

    /// Record the real outcome on an existing reservation. Returns `None`
    /// when no row matches.
    pub async fn finalize(
        pool: &PgPool,
        scope: &str,
        idempotency_key: &str,
        status_code: i32,
        response_payload: &serde_json::Value,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE runtime_idempotency_records
            SET status_code = $3, response_payload = $4, updated_at = NOW()
            WHERE scope = $1 AND idempotency_key = $2
            RETURNING {RECORD_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Self>(&query)
            .bind(scope)
            .bind(idempotency_key)
            .bind(status_code)
            .bind(response_payload)
            .fetch_optional(pool)
            .await
    }

    /// Reservations whose validity window is still open.
    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM runtime_idempotency_records
            WHERE expires_at > NOW()
            "#,
        )
        .fetch_one(pool)
        .await
    }

    /// Housekeeping reaper: drop rows whose window has lapsed. Correctness
    /// never depends on this running.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM runtime_idempotency_records
            WHERE expires_at <= NOW()
            "#,
        )
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// True when the error is a unique-constraint violation from a losing
/// concurrent insert.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = chrono::Utc::now().naive_utc();
        let record = IdempotencyRecord {
            id: 1,
            scope: "trip-join".to_string(),
            idempotency_key: "abc".to_string(),
            owner_identity: Some("user-42".to_string()),
            request_fingerprint: String::new(),
            status_code: 202,
            response_payload: serde_json::json!({}),
            expires_at: now,
            created_at: now,
            updated_at: now,
        };

        assert!(record.is_expired_at(now));
        assert!(!record.is_expired_at(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let now = chrono::Utc::now().naive_utc();
        let record = IdempotencyRecord {
            id: 7,
            scope: "review-create".to_string(),
            idempotency_key: "key-1".to_string(),
            owner_identity: None,
            request_fingerprint: "fp".to_string(),
            status_code: 201,
            response_payload: serde_json::json!({"review_id": 9}),
            expires_at: now,
            created_at: now,
            updated_at: now,
        };

        let serialized = serde_json::to_string(&record).unwrap();
        let deserialized: IdempotencyRecord = serde_json::from_str(&serialized).unwrap();
        assert_eq!(record, deserialized);
    }
}
