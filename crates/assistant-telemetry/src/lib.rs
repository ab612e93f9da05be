//! # Assistant Telemetry
//!
//! Log and metric plumbing for the broadcast assistant.
//!
//! - **Logs**: `tracing-subscriber` with an env filter, human readable or
//!   JSON output.
//! - **Metrics**: Prometheus counters and gauges under the `bass_` prefix.
//!
//! ```rust,ignore
//! use assistant_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BASS_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `BASS_JSON_LOGS` | `false` | Emit JSON lines instead of pretty text |
//! | `BASS_LOG_TARGETS` | `true` | Include the module target in each line |
//! | `BASS_METRICS` | `true` | Register Prometheus metrics |

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, ACTIVE_SYNCS, EVENTS_PUBLISHED,
    EVENT_DISPATCH_DURATION, SOURCES_FOUND, SOURCE_OPERATIONS, SYNCS_ESTABLISHED, SYNCS_LOST,
    SYNC_FAILURES,
};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and, when enabled, metrics.
///
/// The returned guard must be held for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = if config.metrics_enabled {
        Some(register_metrics()?)
    } else {
        None
    };
    let tracing = init_tracing(config)?;

    Ok(TelemetryGuard {
        _tracing: tracing,
        _metrics: metrics,
    })
}

/// Keeps telemetry alive.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: Option<MetricsHandle>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}

/// Increment a counter, optionally with label values.
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
        let before = SYNCS_LOST.get();
        metric_inc!(SYNCS_LOST);
        assert!(SYNCS_LOST.get() >= before + 1.0);

        metric_inc!(SOURCE_OPERATIONS, &["add", "success"]);
        assert!(SOURCE_OPERATIONS.with_label_values(&["add", "success"]).get() >= 1.0);
    }
}
