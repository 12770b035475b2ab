//! Tracing initialization for the registry CLI
//!
//! Uses standard RUST_LOG environment variable for filtering:
//! - `RUST_LOG=debug` - Set global level
//! - `RUST_LOG=k3d_registry=debug,k3d_runtime=trace` - Set per-crate levels
//!
//! Uses RUST_LOG_FORMAT for output format (optional):
//! - `json` - JSON formatted output
//! - `pretty` - Pretty formatted output
//! - `compact` - Compact single-line output (default)
//!
//! Logs always go to stderr; stdout carries command output only.

use k3d_core::{K3dError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize with a default filter if RUST_LOG is not set
pub fn init_with_defaults(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format.as_str() {
        "json" => registry
            .with(fmt::layer().with_ansi(false).json().with_writer(std::io::stderr))
            .try_init(),
        "pretty" => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| K3dError::Internal(format!("Failed to initialize tracing: {}", e)))
}
