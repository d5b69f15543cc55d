#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Wayfarer Runtime
//!
//! Runtime coordination core for the Wayfarer travel platform. The domain
//! and view layers call into this crate for the operational plumbing every
//! request handler shares:
//!
//! - **Idempotency ledger**: durable reservations that collapse retried or
//!   duplicate requests into a single effective execution
//! - **Rate limiter**: fixed-window budgets per `(scope, identity)`
//! - **Feed/search cache**: per-viewer warming and reads of precomputed
//!   payloads
//! - **Counter service**: cache-live counters with on-demand durable
//!   snapshots
//! - **Task queue shim**: envelopes toward a real broker, or bounded local
//!   buffering when none is configured
//! - **Health snapshot**: one read-only diagnostic over all of the above
//!
//! The only external dependencies are a shared key-value cache (in-process
//! or Redis) and a PostgreSQL store. Cache failures never surface to
//! callers: the layer fails open, trading strictness for availability.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wayfarer_runtime::cache::CacheClient;
//! use wayfarer_runtime::config::RuntimeConfig;
//! use wayfarer_runtime::coordinator::RuntimeCoordinator;
//! use wayfarer_runtime::identity::Identity;
//!
//! # async fn example(pool: sqlx::PgPool) -> wayfarer_runtime::error::Result<()> {
//! let config = RuntimeConfig::from_env()?;
//! let coordinator = RuntimeCoordinator::new(pool, CacheClient::memory(), config);
//!
//! let viewer = Identity::user(42, "marta");
//! let decision = coordinator.check_rate_limit("trip-join", &viewer, None, None).await;
//! if decision.allowed {
//!     let reservation = coordinator
//!         .reserve_idempotency_key("trip-join", "client-token-123", Some(&viewer), None, None)
//!         .await?;
//!     println!("outcome: {:?}", reservation.outcome);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod counters;
pub mod database;
pub mod error;
pub mod feed_cache;
pub mod health;
pub mod identity;
pub mod keyspace;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod queue;
pub mod ratelimit;
pub mod web;

pub use cache::{CacheBackend, CacheClient};
pub use config::{CacheBackendKind, RuntimeConfig};
pub use coordinator::RuntimeCoordinator;
pub use counters::{CounterService, CounterSnapshot};
pub use error::{CoordinationError, Result};
pub use feed_cache::{FeedCache, FeedCacheStatus};
pub use health::{HealthMonitor, HealthSnapshot};
pub use identity::Identity;
pub use ledger::{IdempotencyLedger, Reservation, ReservationOutcome};
pub use models::{Counter, IdempotencyRecord, SnapshotOutcome};
pub use queue::{DeliveryMode, TaskEnvelope, TaskQueueShim};
pub use ratelimit::{RateLimitDecision, RateLimiter};
