//! # Durable Models
//!
//! The two rows the coordination layer owns in the relational store:
//! idempotency reservations and counter snapshots. Everything else this
//! layer touches is cache-resident and reconstructable.

pub mod counter;
pub mod idempotency_record;

pub use counter::{Counter, SnapshotOutcome};
pub use idempotency_record::{IdempotencyRecord, NewIdempotencyRecord};
