//! # Idempotency Ledger
//!
//! Durable, unique-keyed reservations that collapse retried or duplicate
//! requests into a single effective execution. For any `(scope, key)` pair
//! at most one caller observes [`ReservationOutcome::Reserved`] within a
//! validity window; everyone else observes `Duplicate` and replays the
//! recorded response instead of re-executing side effects.
//!
//! ## Reservation protocol
//!
//! Optimistic-then-pessimistic fetch-or-create inside one transaction:
//! `SELECT ... FOR UPDATE`, insert when absent, and on a losing concurrent
//! insert (SQLSTATE 23505 aborts the transaction) start a fresh transaction
//! and re-fetch under lock, where the loser becomes an ordinary reader.
//! An expired row is re-initialized in place, same primary key, which
//! sidesteps a second unique-constraint insert race.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::CacheClient;
use crate::constants::{
    IN_FLIGHT_STATUS, MAX_IDEMPOTENCY_KEY_LENGTH, MAX_IDEMPOTENCY_SCOPE_LENGTH,
};
use crate::error::Result;
use crate::identity::Identity;
use crate::keyspace;
use crate::models::idempotency_record::{
    is_unique_violation, IdempotencyRecord, NewIdempotencyRecord,
};

/// Losing a unique-constraint race aborts the transaction, so the protocol
/// re-runs from a fresh one. Two retries cover the winner itself rolling
/// back mid-race.
const MAX_RESERVE_ATTEMPTS: u32 = 3;

/// How a reservation attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationOutcome {
    /// This caller owns the key for the validity window and must execute
    Reserved,
    /// Someone else holds the key; replay the recorded response
    Duplicate,
    /// Scope or key normalized to empty
    Invalid,
}

/// Result of [`IdempotencyLedger::reserve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub outcome: ReservationOutcome,
    pub record_id: Option<i64>,
    /// On `Duplicate`: the finalized status, or the in-flight sentinel if
    /// the first caller has not finalized yet
    pub status_code: Option<i32>,
    pub response_payload: Option<serde_json::Value>,
    pub expires_at: Option<NaiveDateTime>,
}

impl Reservation {
    fn invalid() -> Self {
        Self {
            outcome: ReservationOutcome::Invalid,
            record_id: None,
            status_code: None,
            response_payload: None,
            expires_at: None,
        }
    }

    fn reserved(record: &IdempotencyRecord) -> Self {
        Self {
            outcome: ReservationOutcome::Reserved,
            record_id: Some(record.id),
            status_code: None,
            response_payload: None,
            expires_at: Some(record.expires_at),
        }
    }

    fn duplicate(record: &IdempotencyRecord) -> Self {
        Self {
            outcome: ReservationOutcome::Duplicate,
            record_id: Some(record.id),
            status_code: Some(record.status_code),
            response_payload: Some(record.response_payload.clone()),
            expires_at: Some(record.expires_at),
        }
    }
}

/// Durable reservation ledger with an advisory cache fast path.
#[derive(Clone)]
pub struct IdempotencyLedger {
    pool: PgPool,
    cache: CacheClient,
    default_ttl_seconds: u64,
    hint_ttl_seconds: u64,
}

impl IdempotencyLedger {
    pub fn new(
        pool: PgPool,
        cache: CacheClient,
        default_ttl_seconds: u64,
        hint_ttl_seconds: u64,
    ) -> Self {
        Self {
            pool,
            cache,
            default_ttl_seconds,
            hint_ttl_seconds,
        }
    }

    /// Claim `(scope, key)` for the caller, or learn who already holds it.
    pub async fn reserve(
        &self,
        scope: &str,
        key: &str,
        owner: Option<&Identity>,
        fingerprint: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Result<Reservation> {
        let normalized_scope = match normalize_scope(scope) {
            Some(s) => s,
            None => return Ok(Reservation::invalid()),
        };
        let normalized_key = match normalize_key(key) {
            Some(k) => k,
            None => return Ok(Reservation::invalid()),
        };

        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds).max(1);
        let new_record = NewIdempotencyRecord {
            scope: normalized_scope,
            idempotency_key: normalized_key,
            owner_identity: owner
                .filter(|identity| identity.is_authenticated())
                .map(Identity::cache_token),
            request_fingerprint: fingerprint.unwrap_or("").to_string(),
            expires_at: chrono::Utc::now().naive_utc() + chrono::Duration::seconds(ttl as i64),
        };

        let mut last_err = None;
        for attempt in 0..MAX_RESERVE_ATTEMPTS {
            match self.try_reserve_once(&new_record).await {
                Ok(reservation) => {
                    self.write_hint(&new_record, &reservation, ttl).await;
                    return Ok(reservation);
                }
                Err(e) if is_unique_violation(&e) => {
                    debug!(
                        scope = %new_record.scope,
                        attempt,
                        "Lost reservation insert race, re-fetching under lock"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Only reachable if every attempt lost an insert race to a writer
        // that then vanished before committing.
        Err(last_err
            .map(Into::into)
            .unwrap_or_else(|| crate::error::CoordinationError::database(
                "reserve",
                "Reservation attempts exhausted",
            )))
    }

    /// One full pass of the reservation protocol in its own transaction.
    async fn try_reserve_once(
        &self,
        new_record: &NewIdempotencyRecord,
    ) -> std::result::Result<Reservation, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing = IdempotencyRecord::find_for_update(
            &mut *tx,
            &new_record.scope,
            &new_record.idempotency_key,
        )
        .await?;

        let reservation = match existing {
            None => {
                let record = IdempotencyRecord::insert(&mut *tx, new_record).await?;
                info!(
                    scope = %record.scope,
                    record_id = record.id,
                    "Idempotency key reserved"
                );
                Reservation::reserved(&record)
            }
            Some(record) if record.is_expired_at(chrono::Utc::now().naive_utc()) => {
                let record = IdempotencyRecord::reinitialize(&mut *tx, record.id, new_record).await?;
                info!(
                    scope = %record.scope,
                    record_id = record.id,
                    "Expired reservation reclaimed"
                );
                Reservation::reserved(&record)
            }
            Some(record) => {
                debug!(
                    scope = %record.scope,
                    record_id = record.id,
                    status_code = record.status_code,
                    "Duplicate request collapsed onto existing reservation"
                );
                Reservation::duplicate(&record)
            }
        };

        tx.commit().await?;
        Ok(reservation)
    }

    /// Record the real outcome on a reservation. Returns `None` when no
    /// reservation exists for the pair.
    pub async fn finalize(
        &self,
        scope: &str,
        key: &str,
        status_code: i32,
        response_payload: serde_json::Value,
    ) -> Result<Option<IdempotencyRecord>> {
        let normalized_scope = match normalize_scope(scope) {
            Some(s) => s,
            None => return Ok(None),
        };
        let normalized_key = match normalize_key(key) {
            Some(k) => k,
            None => return Ok(None),
        };

        let record = IdempotencyRecord::finalize(
            &self.pool,
            &normalized_scope,
            &normalized_key,
            status_code,
            &response_payload,
        )
        .await?;

        if let Some(record) = &record {
            let hint_key = hint_cache_key(&record.scope, &record.idempotency_key);
            self.cache
                .set(
                    &hint_key,
                    &json!({ "record_id": record.id, "status_code": record.status_code })
                        .to_string(),
                    Duration::from_secs(self.hint_ttl_seconds),
                )
                .await;
        }

        Ok(record)
    }

    /// Advisory fast-path: the cached pointer for a pair, if one is live.
    /// Absence says nothing; only `reserve` is authoritative.
    pub async fn duplicate_hint(&self, scope: &str, key: &str) -> Option<serde_json::Value> {
        let normalized_scope = normalize_scope(scope)?;
        let normalized_key = normalize_key(key)?;

        let hint_key = hint_cache_key(&normalized_scope, &normalized_key);
        let raw = self.cache.get(&hint_key).await?;
        serde_json::from_str(&raw).ok()
    }

    /// Reservations still inside their validity window.
    pub async fn active_count(&self) -> Result<i64> {
        Ok(IdempotencyRecord::count_active(&self.pool).await?)
    }

    /// Housekeeping reaper; returns purged row count.
    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = IdempotencyRecord::purge_expired(&self.pool).await?;
        if purged > 0 {
            info!(purged, "Purged expired idempotency reservations");
        }
        Ok(purged)
    }

    async fn write_hint(&self, new_record: &NewIdempotencyRecord, reservation: &Reservation, ttl: u64) {
        let record_id = match reservation.record_id {
            Some(id) => id,
            None => return,
        };
        let status_code = reservation.status_code.unwrap_or(IN_FLIGHT_STATUS);
        let hint_key = hint_cache_key(&new_record.scope, &new_record.idempotency_key);
        // A hint must never outlive its reservation, or a stale Duplicate
        // pointer would survive the row's expiry reuse.
        let hint_ttl = self.hint_ttl_seconds.min(ttl);
        self.cache
            .set(
                &hint_key,
                &json!({ "record_id": record_id, "status_code": status_code }).to_string(),
                Duration::from_secs(hint_ttl.max(1)),
            )
            .await;
    }
}

fn hint_cache_key(scope: &str, key: &str) -> String {
    keyspace::build_key(&["idempotency", "hint", scope, key])
}

/// Sanitize a scope to its allow-listed token, bounded to the column width.
fn normalize_scope(scope: &str) -> Option<String> {
    let mut sanitized = keyspace::sanitize_token(scope);
    if sanitized.is_empty() {
        return None;
    }
    sanitized.truncate(MAX_IDEMPOTENCY_SCOPE_LENGTH);
    Some(sanitized)
}

/// Trim the caller-supplied token; collapse over-length keys to their
/// content hash so arbitrary client data never lands in an indexed column.
fn normalize_key(key: &str) -> Option<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
        return Some(hex::encode(Sha256::digest(trimmed.as_bytes())));
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_trims_whitespace() {
        assert_eq!(normalize_key("  abc  "), Some("abc".to_string()));
        assert_eq!(normalize_key("   "), None);
        assert_eq!(normalize_key(""), None);
    }

    #[test]
    fn test_normalize_key_hashes_long_tokens() {
        let long = "k".repeat(500);
        let normalized = normalize_key(&long).unwrap();
        assert_eq!(normalized.len(), 64);
        assert_eq!(normalized, normalize_key(&long).unwrap());
        assert_ne!(normalized, normalize_key(&format!("{long}x")).unwrap());
    }

    #[test]
    fn test_normalize_scope_sanitizes_and_bounds() {
        assert_eq!(normalize_scope("Trip-Join"), Some("trip-join".to_string()));
        assert_eq!(normalize_scope("!!!"), None);
        let long = "s".repeat(500);
        assert_eq!(normalize_scope(&long).unwrap().len(), 128);
    }

    #[test]
    fn test_invalid_reservation_shape() {
        let reservation = Reservation::invalid();
        assert_eq!(reservation.outcome, ReservationOutcome::Invalid);
        assert_eq!(reservation.record_id, None);
        assert_eq!(reservation.expires_at, None);
    }

    #[test]
    fn test_hint_key_is_namespaced() {
        let key = hint_cache_key("trip-join", "abc123");
        assert_eq!(key, "wayfarer:idempotency:hint:trip-join:abc123");
    }
}
