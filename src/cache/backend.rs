//! Cache backend implementation: process-local (DashMap) or shared (Redis).
//!
//! Values are serialized strings; counters are their decimal text form so
//! the Redis tier can use native `INCRBY`. Backend methods surface real
//! errors; the facade in [`crate::cache`] decides what degrades to what.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by a cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {message}")]
    Backend { message: String },

    #[error("Cache connection pool error: {message}")]
    Pool { message: String },
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend {
            message: err.to_string(),
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::Pool {
            message: err.to_string(),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A TTL-stamped entry in the process-local tier.
#[derive(Clone, Debug)]
pub struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Shared key-value cache with two modes.
///
/// - **Memory**: single-instance deployments and tests; a `DashMap` of
///   TTL-stamped entries, expired entries treated as absent.
/// - **Redis**: multi-instance deployments; pooled connections with native
///   TTL and atomic increment.
#[derive(Clone)]
pub enum CacheBackend {
    Memory(Arc<DashMap<String, MemoryEntry>>),
    Redis(Pool),
}

impl CacheBackend {
    /// Create a process-local backend.
    pub fn new_memory() -> Self {
        CacheBackend::Memory(Arc::new(DashMap::new()))
    }

    /// Create a Redis-backed backend from a connection URL.
    ///
    /// Pool construction is lazy: an unreachable server surfaces per
    /// operation, not here, so the facade's fail-open policy applies
    /// uniformly.
    pub fn new_redis(redis_url: &str) -> CacheResult<Self> {
        let pool = RedisPoolConfig::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Pool {
                message: e.to_string(),
            })?;
        Ok(CacheBackend::Redis(pool))
    }

    /// Backend descriptor for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            CacheBackend::Memory(_) => "memory",
            CacheBackend::Redis(_) => "redis",
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            CacheBackend::Memory(map) => {
                if let Some(entry) = map.get(key) {
                    if !entry.is_expired() {
                        return Ok(Some(entry.value.clone()));
                    }
                    drop(entry);
                    map.remove(key);
                }
                Ok(None)
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                Ok(conn.get::<_, Option<String>>(key).await?)
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            CacheBackend::Memory(map) => {
                map.insert(key.to_string(), MemoryEntry::new(value.to_string(), ttl));
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
                Ok(())
            }
        }
    }

    /// Set only when the key is absent. Returns whether this call wrote.
    pub async fn add_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        match self {
            CacheBackend::Memory(map) => match map.entry(key.to_string()) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().is_expired() {
                        occupied.insert(MemoryEntry::new(value.to_string(), ttl));
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(MemoryEntry::new(value.to_string(), ttl));
                    Ok(true)
                }
            },
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let outcome: Option<String> = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl.as_secs().max(1))
                    .query_async(&mut conn)
                    .await?;
                Ok(outcome.is_some())
            }
        }
    }

    /// Atomically add `delta`, creating the key (with `fresh_ttl`) when it
    /// does not exist. Returns the new value.
    pub async fn increment(&self, key: &str, delta: i64, fresh_ttl: Duration) -> CacheResult<i64> {
        match self {
            CacheBackend::Memory(map) => match map.entry(key.to_string()) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().is_expired() {
                        occupied.insert(MemoryEntry::new(delta.to_string(), fresh_ttl));
                        Ok(delta)
                    } else {
                        let current: i64 = occupied.get().value.parse().unwrap_or(0);
                        let next = current.saturating_add(delta);
                        let expires_at = occupied.get().expires_at;
                        occupied.insert(MemoryEntry {
                            value: next.to_string(),
                            expires_at,
                        });
                        Ok(next)
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(MemoryEntry::new(delta.to_string(), fresh_ttl));
                    Ok(delta)
                }
            },
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let next: i64 = conn.incr(key, delta).await?;
                // INCRBY creates persistent keys; stamp the TTL on first write.
                if next == delta {
                    conn.expire::<_, bool>(key, fresh_ttl.as_secs().max(1) as i64)
                        .await?;
                }
                Ok(next)
            }
        }
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        match self {
            CacheBackend::Memory(map) => {
                map.remove(key);
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                conn.del::<_, ()>(key).await?;
                Ok(())
            }
        }
    }

    /// Remaining TTL for a live key, `None` when absent or expired.
    pub async fn ttl_remaining(&self, key: &str) -> CacheResult<Option<Duration>> {
        match self {
            CacheBackend::Memory(map) => Ok(map.get(key).and_then(|entry| {
                let now = Instant::now();
                if now >= entry.expires_at {
                    None
                } else {
                    Some(entry.expires_at - now)
                }
            })),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let ttl: i64 = conn.ttl(key).await?;
                if ttl > 0 {
                    Ok(Some(Duration::from_secs(ttl as u64)))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_and_get() {
        let backend = CacheBackend::new_memory();
        backend.set("k", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_expiry_reads_as_absent() {
        let backend = CacheBackend::new_memory();
        backend.set("k", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_add_if_absent() {
        let backend = CacheBackend::new_memory();
        assert!(backend.add_if_absent("k", "1", Duration::from_secs(5)).await.unwrap());
        assert!(!backend.add_if_absent("k", "2", Duration::from_secs(5)).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_memory_add_if_absent_reclaims_expired_entry() {
        let backend = CacheBackend::new_memory();
        backend.set("k", "old", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(backend.add_if_absent("k", "new", Duration::from_secs(5)).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_memory_increment_creates_then_adds() {
        let backend = CacheBackend::new_memory();
        assert_eq!(backend.increment("n", 2, Duration::from_secs(5)).await.unwrap(), 2);
        assert_eq!(backend.increment("n", 3, Duration::from_secs(5)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_memory_increment_preserves_window_expiry() {
        let backend = CacheBackend::new_memory();
        backend.add_if_absent("n", "1", Duration::from_millis(40)).await.unwrap();
        backend.increment("n", 1, Duration::from_secs(60)).await.unwrap();
        // The window TTL set by the first write must survive the increment.
        let ttl = backend.ttl_remaining("n").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let backend = CacheBackend::new_memory();
        backend.set("k", "v", Duration::from_secs(5)).await.unwrap();
        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_remaining_reports_live_keys_only() {
        let backend = CacheBackend::new_memory();
        assert_eq!(backend.ttl_remaining("missing").await.unwrap(), None);
        backend.set("k", "v", Duration::from_secs(30)).await.unwrap();
        let ttl = backend.ttl_remaining("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(30));
        assert!(ttl > Duration::from_secs(25));
    }
}
