//! # HTTP Probe Surface
//!
//! Two read-only endpoints over the coordination layer:
//!
//! - `GET /health`: unauthenticated health snapshot for load balancers
//!   and operators
//! - `GET /internal/cache-status`: feed-cache hit status for the calling
//!   identity, guarded by the configured probe API key
//!
//! Authentication proper lives in the fronting layer; the internal probe
//! trusts forwarded identity headers once the key matches.

pub mod handlers;

use axum::routing::get;
use axum::Router;

use crate::coordinator::RuntimeCoordinator;

/// Build the probe router over a wired coordinator.
pub fn probe_router(coordinator: RuntimeCoordinator) -> Router {
    Router::new()
        .route("/health", get(handlers::health_snapshot))
        .route("/internal/cache-status", get(handlers::cache_status))
        .with_state(coordinator)
}
