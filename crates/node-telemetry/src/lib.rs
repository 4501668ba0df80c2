//! # Node Telemetry
//!
//! Logging bootstrap for the PBFT node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use node_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Structured logs are now emitted through `tracing`
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PBFT_SERVICE_NAME` | `pbft-node` | Service name attached to every log line |
//! | `PBFT_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `PBFT_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `PBFT_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
mod logging;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid log filter: {0}")]
    Filter(String),
}

/// Install the global tracing subscriber.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let tracing_guard = tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard {
        _tracing: tracing_guard,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with subsystem context.
///
/// ```rust,ignore
/// let _span = node_telemetry::subsystem_span!("commit", subsystem = "pbft", height = 12);
/// ```
#[macro_export]
macro_rules! subsystem_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "pbft-node");
    }
}
