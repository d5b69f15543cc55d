//! # Structured Logging
//!
//! Environment-aware tracing initialization. Production gets JSON output
//! for log aggregation; everything else gets the human-readable console
//! format.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// Safe to call repeatedly; later calls are no-ops. Tolerates a global
/// subscriber already installed by an embedding application.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let registry = tracing_subscriber::registry();
        let result = if environment == "production" {
            registry
                .with(fmt::layer().with_target(true).with_ansi(false).json().with_filter(filter))
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(true).with_filter(filter))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}

fn get_environment() -> String {
    std::env::var("WAYFARER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("test"), "debug");
    }
}
