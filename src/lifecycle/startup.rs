//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration, or fall back to defaults
//! - Start the metrics exporter when enabled
//! - Bind the listener last, once everything else is ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - No config file is not an error; defaults describe the two-tier layout

use std::net::SocketAddr;
use std::path::Path;

use tokio::net::TcpListener;

use crate::config::{load_config, ConfigError, ObservabilityConfig, RelayConfig};
use crate::observability::metrics;

/// Load the config file when one is given.
pub fn load_or_default(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(RelayConfig::default()),
    }
}

/// Install the Prometheus exporter if metrics are enabled.
/// Returns the address it listens on.
pub fn start_metrics(config: &ObservabilityConfig) -> Option<SocketAddr> {
    if !config.metrics_enabled {
        return None;
    }
    match config.metrics_address.parse::<SocketAddr>() {
        Ok(addr) => {
            metrics::init_metrics(addr);
            Some(addr)
        }
        Err(e) => {
            tracing::error!(
                metrics_address = %config.metrics_address,
                error = %e,
                "Failed to parse metrics address, metrics disabled"
            );
            None
        }
    }
}

/// Bind the public listener.
pub async fn bind(config: &RelayConfig) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}
