//! # Task Envelopes
//!
//! The unit the task-queue shim produces: one envelope per enqueue call,
//! tagged with how it was (or was not) delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json;
use uuid::Uuid;

/// Where an envelope went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Handed toward a real external broker; delivery is someone else's job
    #[serde(rename = "broker-configured")]
    BrokerConfigured,
    /// No broker configured; parked on the bounded in-cache shelf
    #[serde(rename = "buffered-local")]
    BufferedLocal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Opaque unique token
    pub task_id: String,
    pub task_name: String,
    pub queue_name: String,
    pub mode: DeliveryMode,
    /// Empty when no broker is configured
    pub broker_url: String,
    pub payload: serde_json::Value,
    /// When the task becomes eligible to run
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(
        task_name: impl Into<String>,
        queue_name: impl Into<String>,
        payload: serde_json::Value,
        mode: DeliveryMode,
        broker_url: impl Into<String>,
        countdown_seconds: u64,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            task_name: task_name.into(),
            queue_name: queue_name.into(),
            mode,
            broker_url: broker_url.into(),
            payload,
            scheduled_for: created_at + chrono::Duration::seconds(countdown_seconds as i64),
            created_at,
        }
    }

    /// Convert to JSON for shelf storage
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Create from JSON read off a shelf
    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }

    /// The countdown has elapsed and the task is runnable
    pub fn is_due(&self) -> bool {
        Utc::now() >= self.scheduled_for
    }
}
