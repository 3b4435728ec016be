//! Prometheus metrics for the sharding pipeline.
//!
//! All metrics follow the naming convention: `shardline_<stage>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Statements routed, by route kind
    pub static ref ROUTES: CounterVec = CounterVec::new(
        Opts::new("shardline_route_statements_total", "Statements routed"),
        &["kind"]  // default/single/pruned/broadcast/cartesian
    ).expect("metric creation failed");

    /// Units that completed successfully
    pub static ref UNITS_EXECUTED: Counter = Counter::new(
        "shardline_execute_units_total",
        "Execution units completed successfully"
    ).expect("metric creation failed");

    /// Units that failed, by reason
    pub static ref UNIT_FAILURES: CounterVec = CounterVec::new(
        Opts::new("shardline_execute_unit_failures_total", "Execution units that failed"),
        &["reason"]  // data_source/timeout/cancelled/task
    ).expect("metric creation failed");

    /// Unit execution time
    pub static ref UNIT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "shardline_execute_unit_duration_seconds",
            "Time from submitting a unit to receiving its result"
        ).buckets(exponential_buckets(0.0005, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Query results merged, by merge mode
    pub static ref MERGES: CounterVec = CounterVec::new(
        Opts::new("shardline_merge_results_total", "Query results merged"),
        &["mode"]  // pass_through/iterator/order_by/stream_group_by/memory_group_by
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Calling it again is a
/// no-op.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ROUTES.clone()),
        Box::new(UNITS_EXECUTED.clone()),
        Box::new(UNIT_FAILURES.clone()),
        Box::new(UNIT_DURATION.clone()),
        Box::new(MERGES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
