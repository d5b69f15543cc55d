//! # Feed/Search Cache
//!
//! Warms and reads precomputed feed and search payloads per viewer
//! identity. Payload computation and ranking live elsewhere; this module
//! only owns the keying discipline and the TTL policy, so two viewers can
//! never observe each other's warmed results.

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::cache::CacheClient;
use crate::identity::Identity;
use crate::keyspace;

/// Per-identity cache-hit status backing the authenticated probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedCacheStatus {
    pub identity: String,
    pub feed_key: String,
    pub feed_cached: bool,
}

#[derive(Clone)]
pub struct FeedCache {
    cache: CacheClient,
    feed_ttl: Duration,
    search_ttl: Duration,
}

impl FeedCache {
    pub fn new(cache: CacheClient, feed_ttl_seconds: u64, search_ttl_seconds: u64) -> Self {
        Self {
            cache,
            feed_ttl: Duration::from_secs(feed_ttl_seconds.max(1)),
            search_ttl: Duration::from_secs(search_ttl_seconds.max(1)),
        }
    }

    fn feed_key(identity: &Identity, shelf: &str) -> String {
        keyspace::build_key(&["feed", shelf, &identity.cache_token()])
    }

    /// Store a computed feed payload for a viewer; returns the derived key.
    pub async fn warm_feed(
        &self,
        identity: &Identity,
        payload: &serde_json::Value,
        ttl_seconds: Option<u64>,
        shelf: &str,
    ) -> String {
        let key = Self::feed_key(identity, shelf);
        let ttl = ttl_seconds.map(Duration::from_secs).unwrap_or(self.feed_ttl);
        self.cache.set(&key, &payload.to_string(), ttl).await;
        debug!(key = %key, shelf = %shelf, "Feed cache warmed");
        key
    }

    /// Store a computed search result page for a viewer and query; the key
    /// carries a digest of the query, never the raw string.
    pub async fn warm_search(
        &self,
        identity: &Identity,
        query: &str,
        result_type: &str,
        payload: &serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> String {
        let key = keyspace::build_key(&[
            "search",
            result_type,
            &identity.cache_token(),
            &keyspace::digest_token(query),
        ]);
        let ttl = ttl_seconds.map(Duration::from_secs).unwrap_or(self.search_ttl);
        self.cache.set(&key, &payload.to_string(), ttl).await;
        debug!(key = %key, result_type = %result_type, "Search cache warmed");
        key
    }

    /// Read back a warmed payload by its derived key.
    pub async fn get_payload(&self, cache_key: &str) -> Option<serde_json::Value> {
        let raw = self.cache.get(cache_key).await?;
        serde_json::from_str(&raw).ok()
    }

    /// Cache-hit status for a viewer's home feed shelf.
    pub async fn status(&self, identity: &Identity, shelf: &str) -> FeedCacheStatus {
        let feed_key = Self::feed_key(identity, shelf);
        let feed_cached = self.cache.get(&feed_key).await.is_some();
        FeedCacheStatus {
            identity: identity.cache_token(),
            feed_key,
            feed_cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_cache() -> FeedCache {
        FeedCache::new(CacheClient::memory(), 300, 120)
    }

    #[tokio::test]
    async fn test_warm_then_read_roundtrip() {
        let cache = feed_cache();
        let viewer = Identity::user(42, "marta");
        let payload = json!({"trips": [1, 2, 3]});

        let key = cache.warm_feed(&viewer, &payload, None, "home").await;
        assert_eq!(cache.get_payload(&key).await, Some(payload));
    }

    #[tokio::test]
    async fn test_viewers_never_share_feed_keys() {
        let cache = feed_cache();
        let marta = Identity::user(1, "marta");
        let nils = Identity::user(2, "nils");

        let key = cache.warm_feed(&marta, &json!({"trips": []}), None, "home").await;
        let other_key = FeedCache::feed_key(&nils, "home");
        assert_ne!(key, other_key);
        assert_eq!(cache.get_payload(&other_key).await, None);
    }

    #[tokio::test]
    async fn test_guest_and_user_feeds_are_distinct() {
        let cache = feed_cache();
        let key = cache
            .warm_feed(&Identity::Anonymous, &json!({"trips": ["public"]}), None, "home")
            .await;
        assert!(key.contains("guest"));
        let user_key = FeedCache::feed_key(&Identity::user(5, "iris"), "home");
        assert_ne!(key, user_key);
    }

    #[tokio::test]
    async fn test_search_keys_digest_the_query() {
        let cache = feed_cache();
        let viewer = Identity::user(3, "sol");
        let key = cache
            .warm_search(&viewer, "beaches in lisbon!", "trips", &json!([1]), None)
            .await;
        assert!(!key.contains("beaches"));

        let same_query_key = cache
            .warm_search(&viewer, "beaches in lisbon!", "trips", &json!([2]), None)
            .await;
        assert_eq!(key, same_query_key);

        let other_query_key = cache
            .warm_search(&viewer, "mountains in peru", "trips", &json!([3]), None)
            .await;
        assert_ne!(key, other_query_key);
    }

    #[tokio::test]
    async fn test_status_reports_hit_and_miss() {
        let cache = feed_cache();
        let viewer = Identity::user(9, "ada");

        let cold = cache.status(&viewer, "home").await;
        assert!(!cold.feed_cached);

        cache.warm_feed(&viewer, &json!({"trips": [7]}), None, "home").await;
        let warmed = cache.status(&viewer, "home").await;
        assert!(warmed.feed_cached);
        assert_eq!(warmed.identity, "user-9");
    }
}
