//! # Coordination Error Types
//!
//! Structured error handling for the runtime coordination layer using
//! thiserror instead of `Box<dyn Error>` patterns.
//!
//! Transient cache failures never appear here: the cache facade absorbs
//! them into fail-open defaults before callers see a `Result`. What remains
//! is the durable store being unavailable, serialization of payloads, and
//! configuration parsing.

use thiserror::Error;

/// Errors surfaced by the coordination layer.
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Database error: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Payload serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {setting}: {message}")]
    Configuration { setting: String, message: String },
}

impl CoordinationError {
    /// Create a database error tagged with the failing operation
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error for a specific setting
    pub fn configuration(setting: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            setting: setting.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for CoordinationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoordinationError::database("query", "No rows found"),
            sqlx::Error::Database(db_err) => {
                CoordinationError::database("database", db_err.to_string())
            }
            sqlx::Error::PoolTimedOut => {
                CoordinationError::database("database_pool", "Connection pool timed out")
            }
            sqlx::Error::PoolClosed => {
                CoordinationError::database("database_pool", "Connection pool is closed")
            }
            sqlx::Error::Configuration(config_err) => {
                CoordinationError::configuration("database", config_err.to_string())
            }
            other => CoordinationError::database("connection", other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::serialization(err.to_string())
    }
}

/// Result type alias for coordination operations
pub type Result<T> = std::result::Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation_and_display() {
        let db_err = CoordinationError::database("reserve", "connection refused");
        assert!(matches!(db_err, CoordinationError::Database { .. }));
        let display = format!("{db_err}");
        assert!(display.contains("reserve"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: CoordinationError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, CoordinationError::Database { .. }));
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err: CoordinationError = json_err.into();
        assert!(matches!(err, CoordinationError::Serialization { .. }));
    }
}
