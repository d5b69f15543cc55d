//! # Cache Facade
//!
//! Thin client over the shared cache that absorbs every backend failure
//! into a fail-open default. Callers above this line never see a cache
//! error: rate limiting degrades to effectively-unlimited, cached payloads
//! degrade to misses, counters degrade to best-effort. This is a deliberate
//! availability-over-strictness tradeoff, not accident tolerance.

pub mod backend;

pub use backend::{CacheBackend, CacheError, CacheResult};

use std::time::Duration;
use tracing::warn;

/// Fail-open client handed to every coordination component.
///
/// Cloning is cheap; clones share the underlying backend.
#[derive(Clone)]
pub struct CacheClient {
    backend: CacheBackend,
}

impl CacheClient {
    pub fn new(backend: CacheBackend) -> Self {
        Self { backend }
    }

    /// Process-local client, the default for tests and single-instance use.
    pub fn memory() -> Self {
        Self::new(CacheBackend::new_memory())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Fetch a value; misses and backend failures both read as `None`.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get failed, treating as miss");
                None
            }
        }
    }

    /// Store a value; backend failures are a logged no-op.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(e) = self.backend.set(key, value, ttl).await {
            warn!(key = %key, error = %e, "Cache set failed, value dropped");
        }
    }

    /// Store only when absent, reporting whether this call wrote.
    ///
    /// On backend failure this reports `true`: the caller proceeds as the
    /// first writer, which keeps rate limiting at `current_count = 1`
    /// instead of rejecting all traffic.
    pub async fn add_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        match self.backend.add_if_absent(key, value, ttl).await {
            Ok(was_set) => was_set,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache add failed, failing open as first writer");
                true
            }
        }
    }

    /// Add `delta` and return the new value.
    ///
    /// Falls back from atomic increment to read-modify-write with a fresh
    /// `set`, bottoming out at `delta` when the backend is unreachable. The
    /// read-modify-write tier accepts a narrow undercount race under
    /// concurrent writers.
    pub async fn increment(&self, key: &str, delta: i64, fresh_ttl: Duration) -> i64 {
        match self.backend.increment(key, delta, fresh_ttl).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Atomic increment failed, trying read-modify-write");
                let current = self
                    .backend
                    .get(key)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                let next = current.saturating_add(delta);
                if let Err(e) = self.backend.set(key, &next.to_string(), fresh_ttl).await {
                    warn!(key = %key, error = %e, "Cache write-back failed, failing open");
                    return delta;
                }
                next
            }
        }
    }

    /// Remove a key; backend failures are a logged no-op.
    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(key = %key, error = %e, "Cache delete failed");
        }
    }

    /// Remaining TTL for a live key; absent, expired, and failure all read
    /// as `None`.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        match self.backend.ttl_remaining(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache TTL probe failed");
                None
            }
        }
    }
}
