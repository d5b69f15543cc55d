//! # Fixed-Window Rate Limiter
//!
//! Counts requests per `(scope, identity)` in discrete TTL-bounded windows.
//!
//! This is intentionally a fixed-window limiter, not sliding-window or
//! token-bucket: the window opens at the first request and closes when its
//! TTL lapses, which admits a known boundary burst of up to `2 x limit`
//! requests straddling a window edge. That tradeoff buys a single atomic
//! cache increment per check.
//!
//! Under cache outage the limiter fails open: every check observes
//! `current_count = 1` and traffic flows unlimited rather than being
//! rejected wholesale.

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::cache::CacheClient;
use crate::identity::Identity;
use crate::keyspace;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub current_count: i64,
    pub remaining: i64,
    pub retry_after_seconds: u64,
}

/// Fixed-window counter per `(scope, identity, window)`.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheClient,
}

impl RateLimiter {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Check and consume one request against the identity's budget.
    pub async fn check(
        &self,
        scope: &str,
        identity: &Identity,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision {
        let window = Duration::from_secs(window_seconds.max(1));
        let window_tag = format!("win-{}", window_seconds.max(1));
        let key = keyspace::build_key(&[
            "ratelimit",
            scope,
            &identity.cache_token(),
            &window_tag,
        ]);

        // First request in a window claims it; later ones count up.
        let current_count = if self.cache.add_if_absent(&key, "1", window).await {
            1
        } else {
            self.cache.increment(&key, 1, window).await
        };

        let limit = i64::from(limit);
        let allowed = current_count <= limit;
        let remaining = (limit - current_count).max(0);
        let retry_after_seconds = if allowed {
            0
        } else {
            self.cache
                .ttl_remaining(&key)
                .await
                .map(|ttl| ttl.as_secs().max(1))
                .unwrap_or(window_seconds)
        };

        if !allowed {
            debug!(
                scope = %scope,
                identity = %identity.cache_token(),
                current_count,
                retry_after_seconds,
                "Rate limit exceeded"
            );
        }

        RateLimitDecision {
            allowed,
            current_count,
            remaining,
            retry_after_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_budget_of_two_allows_two_then_rejects() {
        let limiter = RateLimiter::new(CacheClient::memory());
        let viewer = Identity::user(42, "marta");

        let first = limiter.check("trip-join", &viewer, 2, 60).await;
        assert!(first.allowed);
        assert_eq!(first.current_count, 1);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.retry_after_seconds, 0);

        let second = limiter.check("trip-join", &viewer, 2, 60).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check("trip-join", &viewer, 2, 60).await;
        assert!(!third.allowed);
        assert_eq!(third.current_count, 3);
        assert_eq!(third.remaining, 0);
        assert!(third.retry_after_seconds > 0);
        assert!(third.retry_after_seconds <= 60);
    }

    #[tokio::test]
    async fn test_identities_have_independent_budgets() {
        let limiter = RateLimiter::new(CacheClient::memory());
        let marta = Identity::user(1, "marta");
        let guest = Identity::Anonymous;

        limiter.check("search", &marta, 1, 60).await;
        let blocked = limiter.check("search", &marta, 1, 60).await;
        assert!(!blocked.allowed);

        let guest_first = limiter.check("search", &guest, 1, 60).await;
        assert!(guest_first.allowed);
    }

    #[tokio::test]
    async fn test_scopes_have_independent_budgets() {
        let limiter = RateLimiter::new(CacheClient::memory());
        let viewer = Identity::user(7, "iris");

        limiter.check("review-create", &viewer, 1, 60).await;
        assert!(!limiter.check("review-create", &viewer, 1, 60).await.allowed);
        assert!(limiter.check("blog-create", &viewer, 1, 60).await.allowed);
    }

    #[tokio::test]
    async fn test_window_expiry_resets_the_count() {
        let limiter = RateLimiter::new(CacheClient::memory());
        let viewer = Identity::user(9, "sol");

        // 1-second window is the smallest the key schema expresses.
        limiter.check("comment-create", &viewer, 1, 1).await;
        assert!(!limiter.check("comment-create", &viewer, 1, 1).await.allowed);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.check("comment-create", &viewer, 1, 1).await.allowed);
    }

    #[tokio::test]
    async fn test_cache_outage_fails_open() {
        let backend = crate::cache::CacheBackend::new_redis("redis://127.0.0.1:6399").unwrap();
        let limiter = RateLimiter::new(CacheClient::new(backend));
        let viewer = Identity::user(3, "nils");

        for _ in 0..5 {
            let decision = limiter.check("trip-join", &viewer, 2, 60).await;
            assert!(decision.allowed);
            assert_eq!(decision.current_count, 1);
        }
    }
}
