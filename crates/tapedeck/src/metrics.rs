//! Prometheus metrics for tapedeck.
//!
//! Tracks resolution outcomes per tier, upstream forwarding and tape saves.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Resolution outcomes
    pub static ref RESOLUTIONS_TOTAL: CounterVec = register_counter_vec!(
        "tapedeck_resolutions_total",
        "Total number of resolved requests",
        &["tier", "status"]  // tier: replay|record|create, status: found|not_found|conflict
    )
    .unwrap();

    /// Upstream forwarding outcomes
    pub static ref UPSTREAM_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "tapedeck_upstream_requests_total",
        "Total number of requests forwarded upstream",
        &["result"]  // result: ok|no_route|timeout|error
    )
    .unwrap();

    /// Upstream call duration
    pub static ref UPSTREAM_DURATION_MS: HistogramVec = register_histogram_vec!(
        "tapedeck_upstream_duration_ms",
        "Duration of upstream requests in milliseconds",
        &["result"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 30000.0]
    )
    .unwrap();

    /// Tape persistence outcomes
    pub static ref TAPE_SAVES_TOTAL: CounterVec = register_counter_vec!(
        "tapedeck_tape_saves_total",
        "Total number of tape save attempts",
        &["result"]  // result: ok|error
    )
    .unwrap();

    /// Tapes currently held by the catalog
    pub static ref TAPES: Gauge = register_gauge!(
        "tapedeck_tapes",
        "Number of tapes in the catalog"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {e}\n");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_resolution(tier: &str, status: &str) {
    RESOLUTIONS_TOTAL.with_label_values(&[tier, status]).inc();
}

pub fn record_upstream(result: &str, duration_ms: f64) {
    UPSTREAM_REQUESTS_TOTAL.with_label_values(&[result]).inc();
    UPSTREAM_DURATION_MS
        .with_label_values(&[result])
        .observe(duration_ms);
}

pub fn record_tape_save(ok: bool) {
    TAPE_SAVES_TOTAL
        .with_label_values(&[if ok { "ok" } else { "error" }])
        .inc();
}

pub fn set_tape_count(count: usize) {
    TAPES.set(count as f64);
}
