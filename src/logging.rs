//! Tracing subscriber setup for binaries and tests embedding the client.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ImportConfig;
use crate::error::AppError;

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; `default_filter` (usually
/// `ImportConfig::log_filter`) is used when it is unset or invalid.
/// Returns `AppError::Internal` if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| AppError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}

/// Installs the subscriber with `config.log_filter` as the fallback filter.
pub fn init_from_config(config: &ImportConfig) -> Result<(), AppError> {
    init_tracing(&config.log_filter)
}
