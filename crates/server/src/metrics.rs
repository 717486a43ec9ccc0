//! Prometheus metrics: request counters/histograms and background
//! gauges, exposed on `/metrics`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Idempotent: a second call is a
/// no-op (returns `false`) rather than panicking — useful under tests that
/// build the app repeatedly.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if metrics::set_global_recorder(recorder).is_err() {
        return false;
    }
    let _ = PROMETHEUS_HANDLE.set(handle);
    describe_metrics();
    true
}

fn describe_metrics() {
    describe_counter!("http_requests_total", "Total HTTP requests handled, by route");
    describe_histogram!("http_request_duration_seconds", "HTTP request duration in seconds");
    describe_gauge!("indexed_sessions", "Number of sessions currently in the index");
    describe_gauge!("sse_active_connections", "Currently open SSE connections");
    describe_gauge!("tail_watcher_lag_seconds", "Seconds since the tail watcher's last scan");
}

pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_request(route: impl Into<String>, duration_secs: f64) {
    let route = route.into();
    counter!("http_requests_total", "route" => route.clone()).increment(1);
    histogram!("http_request_duration_seconds", "route" => route).record(duration_secs);
}

pub fn set_indexed_sessions(count: i64) {
    gauge!("indexed_sessions").set(count as f64);
}

pub fn set_sse_active_connections(count: i64) {
    gauge!("sse_active_connections").set(count as f64);
}

static SSE_ACTIVE_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Adjust the SSE connection gauge by `delta` (+1 on connect, -1 on
/// disconnect) and publish the new total.
pub fn bump_sse_active_connections(delta: i64) {
    let updated = SSE_ACTIVE_CONNECTIONS.fetch_add(delta, Ordering::Relaxed) + delta;
    set_sse_active_connections(updated);
}

/// A small RAII timer a handler starts on entry and reads at response time.
pub struct RequestTimer {
    started: Instant,
    route: &'static str,
}

impl RequestTimer {
    pub fn start(route: &'static str) -> Self {
        RequestTimer { started: Instant::now(), route }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request(self.route, self.started.elapsed().as_secs_f64());
    }
}
