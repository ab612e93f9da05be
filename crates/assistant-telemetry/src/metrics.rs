//! Prometheus metrics for the broadcast assistant.
//!
//! All metrics follow the naming convention `bass_<metric>_<unit>`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Registry holding every assistant metric.
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PERIODIC SYNC
    // =========================================================================

    pub static ref SYNCS_ESTABLISHED: Counter = Counter::new(
        "bass_syncs_established_total",
        "Periodic advertising syncs established"
    ).expect("metric creation failed");

    pub static ref SYNCS_LOST: Counter = Counter::new(
        "bass_syncs_lost_total",
        "Periodic advertising syncs lost"
    ).expect("metric creation failed");

    pub static ref SYNC_FAILURES: Counter = Counter::new(
        "bass_sync_failures_total",
        "Sync registrations that failed to establish"
    ).expect("metric creation failed");

    pub static ref ACTIVE_SYNCS: Gauge = Gauge::new(
        "bass_active_syncs",
        "Currently established periodic advertising syncs"
    ).expect("metric creation failed");

    // =========================================================================
    // DISCOVERY AND SOURCE OPERATIONS
    // =========================================================================

    pub static ref SOURCES_FOUND: Counter = Counter::new(
        "bass_sources_found_total",
        "Broadcast sources reported to applications"
    ).expect("metric creation failed");

    /// Source operation outcomes, labelled `operation` (add/modify/remove)
    /// and `outcome` (success/failure).
    pub static ref SOURCE_OPERATIONS: CounterVec = CounterVec::new(
        Opts::new("bass_source_operations_total", "Source operation outcomes per sink"),
        &["operation", "outcome"]
    ).expect("metric creation failed");

    // =========================================================================
    // RUNTIME
    // =========================================================================

    pub static ref EVENTS_PUBLISHED: Counter = Counter::new(
        "bass_events_published_total",
        "Callbacks published to applications"
    ).expect("metric creation failed");

    pub static ref EVENT_DISPATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "bass_event_dispatch_duration_seconds",
            "Time spent handling one queued event"
        ).buckets(exponential_buckets(0.000_01, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register every metric with [`REGISTRY`]. Registering twice is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SYNCS_ESTABLISHED.clone()),
        Box::new(SYNCS_LOST.clone()),
        Box::new(SYNC_FAILURES.clone()),
        Box::new(ACTIVE_SYNCS.clone()),
        Box::new(SOURCES_FOUND.clone()),
        Box::new(SOURCE_OPERATIONS.clone()),
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENT_DISPATCH_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes the elapsed time into a histogram when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
