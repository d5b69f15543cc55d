//! # Probe Handlers

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::debug;

use crate::coordinator::RuntimeCoordinator;
use crate::feed_cache::FeedCacheStatus;
use crate::health::HealthSnapshot;
use crate::identity::Identity;

/// Header carrying the probe API key
pub const PROBE_KEY_HEADER: &str = "x-probe-key";
/// Forwarded identity headers set by the fronting auth layer
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-user-name";

/// Unauthenticated health snapshot: GET /health
pub async fn health_snapshot(
    State(coordinator): State<RuntimeCoordinator>,
) -> Json<HealthSnapshot> {
    Json(coordinator.health_snapshot().await)
}

/// Authenticated cache-status probe: GET /internal/cache-status
///
/// Rejects unless the configured probe key matches and the fronting layer
/// forwarded an identity. With no key configured the route always rejects.
pub async fn cache_status(
    State(coordinator): State<RuntimeCoordinator>,
    headers: HeaderMap,
) -> Result<Json<FeedCacheStatus>, StatusCode> {
    let configured_key = coordinator
        .config()
        .probe_api_key
        .as_deref()
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let presented_key = header_value(&headers, PROBE_KEY_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;
    if presented_key != configured_key {
        debug!("Cache-status probe rejected: key mismatch");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let identity = forwarded_identity(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(coordinator.feed_cache_status(&identity).await))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn forwarded_identity(headers: &HeaderMap) -> Option<Identity> {
    let id = header_value(headers, USER_ID_HEADER).and_then(|raw| raw.parse::<i64>().ok());
    let username = header_value(headers, USERNAME_HEADER);

    match (id, username) {
        (None, None) => None,
        (id, username) => Some(Identity::Authenticated {
            id,
            username: username.unwrap_or("").to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_identity_prefers_numeric_id() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("42"));
        headers.insert(USERNAME_HEADER, HeaderValue::from_static("marta"));
        let identity = forwarded_identity(&headers).unwrap();
        assert_eq!(identity.cache_token(), "user-42");
    }

    #[test]
    fn test_forwarded_identity_requires_some_header() {
        assert_eq!(forwarded_identity(&HeaderMap::new()), None);
    }

    #[test]
    fn test_forwarded_identity_falls_back_to_username() {
        let mut headers = HeaderMap::new();
        headers.insert(USERNAME_HEADER, HeaderValue::from_static("marta"));
        let identity = forwarded_identity(&headers).unwrap();
        assert_eq!(identity.cache_token(), "user-marta");
    }
}
