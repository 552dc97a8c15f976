//! Metrics and telemetry for the counter engine
//!
//! Prometheus collectors registered in the default registry on first use.
//! Engines built with `monitoring.metrics_enabled = false` never touch them.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Encoder,
    Histogram, IntCounter, TextEncoder,
};

lazy_static! {
    /// Increments by outcome (inserted, incremented, rejected)
    pub static ref INCREMENTS_TOTAL: CounterVec = register_counter_vec!(
        "counter_increments_total",
        "Total increment operations by outcome",
        &["outcome"]
    )
    .expect("counter_increments_total registers once");

    /// Day cubes created
    pub static ref CUBES_TOTAL: IntCounter = register_int_counter!(
        "counter_cubes_total",
        "Total day cubes created"
    )
    .expect("counter_cubes_total registers once");

    /// Queries answered
    pub static ref QUERIES_TOTAL: IntCounter = register_int_counter!(
        "counter_queries_total",
        "Total queries answered"
    )
    .expect("counter_queries_total registers once");

    /// Query latency
    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        "counter_query_duration_seconds",
        "Query latency in seconds",
        vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("counter_query_duration_seconds registers once");
}

/// Outcome label of an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// A new counter node was linked
    Inserted,
    /// An existing counter absorbed the delta
    Incremented,
    /// The increment failed (bad minute or invalid labels)
    Rejected,
}

impl IncrementOutcome {
    fn label(self) -> &'static str {
        match self {
            IncrementOutcome::Inserted => "inserted",
            IncrementOutcome::Incremented => "incremented",
            IncrementOutcome::Rejected => "rejected",
        }
    }
}

/// Register every collector so they show up before the first event
pub fn init() {
    for outcome in [
        IncrementOutcome::Inserted,
        IncrementOutcome::Incremented,
        IncrementOutcome::Rejected,
    ] {
        INCREMENTS_TOTAL.with_label_values(&[outcome.label()]);
    }
    lazy_static::initialize(&CUBES_TOTAL);
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);

    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record an increment
#[inline]
pub fn record_increment(outcome: IncrementOutcome) {
    INCREMENTS_TOTAL.with_label_values(&[outcome.label()]).inc();
}

/// Record a new day cube
#[inline]
pub fn record_cube_created() {
    CUBES_TOTAL.inc();
}

/// Record a completed query
#[inline]
pub fn record_query(duration_secs: f64) {
    QUERIES_TOTAL.inc();
    QUERY_DURATION.observe(duration_secs);
}
