//! # Shardline Telemetry
//!
//! Observability for the sharding kernel.
//!
//! - **Logs**: `tracing` events through a `tracing-subscriber` registry,
//!   pretty or JSON, filtered by `RUST_LOG` or the configured level.
//! - **Metrics**: a process-wide Prometheus registry with pipeline counters
//!   and a unit-duration histogram.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shardline_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("telemetry");
//!     // Route, execute, merge...
//!     println!("{}", shardline_telemetry::encode_metrics().unwrap());
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SHARDLINE_SERVICE_NAME` | `shardline` | Service name on log lines |
//! | `SHARDLINE_LOG_LEVEL` | `info` | Log level filter |
//! | `SHARDLINE_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `SHARDLINE_JSON_LOGS` | `false` | JSON instead of pretty logs |

#![warn(missing_docs)]

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MERGES, REGISTRY, ROUTES, UNITS_EXECUTED, UNIT_DURATION,
    UNIT_FAILURES,
};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The subscriber could not be installed.
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics, then install the tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_tracing(config)
}

/// Record a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_inc_macro() {
        let before = ROUTES.with_label_values(&["single"]).get();
        metric_inc!(ROUTES, &["single"]);
        assert!(ROUTES.with_label_values(&["single"]).get() >= before + 1.0);
    }
}
