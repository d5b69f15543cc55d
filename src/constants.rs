//! # System Constants
//!
//! Operational boundaries of the coordination layer: key namespace limits,
//! TTL and rate-limit defaults, and the well-known counter names other
//! subsystems read for observability.

/// Root prefix every cache key is namespaced under
pub const KEY_ROOT: &str = "wayfarer";

/// Maximum cache key length before truncate-and-digest kicks in.
/// Memcached caps keys at 250 bytes; 200 leaves headroom for backend
/// prefixes added outside this layer.
pub const MAX_KEY_LENGTH: usize = 200;

/// Hex characters of the SHA-256 digest appended to truncated keys
pub const KEY_DIGEST_LENGTH: usize = 12;

/// Placeholder key when every part sanitizes to empty
pub const UNKEYED_PLACEHOLDER: &str = "unkeyed";

/// Idempotency keys longer than this are replaced by their content hash
pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 120;

/// Sanitized idempotency scopes are cut to the ledger column width
pub const MAX_IDEMPOTENCY_SCOPE_LENGTH: usize = 128;

/// HTTP-like sentinel recorded on a reservation until its owner finalizes it
pub const IN_FLIGHT_STATUS: i32 = 202;

/// Well-known counter names maintained by the coordination layer
pub mod counters {
    /// Every enqueue, regardless of delivery mode
    pub const TASKS_QUEUED_TOTAL: &str = "tasks-queued-total";
    /// Enqueues that fell back to the buffered-local shelf; a nonzero rate
    /// with a broker supposedly configured means the broker URL is wrong
    pub const TASKS_QUEUED_BUFFERED: &str = "tasks-queued-buffered";
}

/// Hard-coded defaults applied when the environment leaves a knob unset
pub mod defaults {
    /// Requests allowed per rate-limit window
    pub const RATE_LIMIT: u32 = 60;
    /// Rate-limit window length in seconds
    pub const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
    /// Idempotency reservation validity window in seconds (24h)
    pub const IDEMPOTENCY_TTL_SECONDS: u64 = 86_400;
    /// TTL on the advisory duplicate-check cache hint
    pub const IDEMPOTENCY_HINT_TTL_SECONDS: u64 = 300;
    /// TTL on cache-resident counter values (7 days)
    pub const COUNTER_TTL_SECONDS: u64 = 604_800;
    /// TTL on warmed feed payloads
    pub const FEED_CACHE_TTL_SECONDS: u64 = 300;
    /// TTL on warmed search payloads
    pub const SEARCH_CACHE_TTL_SECONDS: u64 = 120;
    /// Maximum envelopes retained per buffered queue shelf
    pub const TASK_BUFFER_CAPACITY: usize = 100;
    /// TTL on each buffered queue shelf
    pub const TASK_SHELF_TTL_SECONDS: u64 = 3_600;
    /// TTL on the health snapshot's transient probe key
    pub const HEALTH_PROBE_TTL_SECONDS: u64 = 10;
    /// Database pool size
    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;
}
