//! Prometheus metrics endpoint and recording helpers.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics::{describe_counter, describe_histogram, histogram, increment_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// State for metrics routes.
#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
}

impl MetricsState {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn new() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {e}"))?;

        describe_metrics();
        Ok(Self { handle })
    }

    /// A handle backed by a recorder that is not installed globally.
    ///
    /// Renders an empty exposition; used where several routers share a process.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }
}

fn describe_metrics() {
    describe_counter!(
        "sisgpo_proxy_requests_total",
        "Total number of proxied SISGPO requests"
    );
    describe_histogram!(
        "sisgpo_proxy_request_duration_seconds",
        "End-to-end duration of proxied requests in seconds"
    );
    describe_counter!(
        "sisgpo_cache_lookups_total",
        "Response cache lookups by result"
    );
    describe_counter!(
        "sisgpo_upstream_errors_total",
        "Upstream failures by kind"
    );
    describe_histogram!(
        "sisgpo_token_exchange_seconds",
        "Duration of SSO token exchanges in seconds"
    );
}

/// Create metrics routes.
pub fn metrics_routes(state: Arc<MetricsState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Metrics handler - returns Prometheus format.
async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    let output = state.handle.render();

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )
        .body(Body::from(output))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Record a completed proxy request.
pub fn record_proxy_request(method: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];

    increment_counter!("sisgpo_proxy_requests_total", &labels);
    histogram!(
        "sisgpo_proxy_request_duration_seconds",
        duration.as_secs_f64(),
        &[("method", method.to_string())]
    );
}

/// Record a response cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    increment_counter!("sisgpo_cache_lookups_total", "result" => result);
}

/// Record an upstream failure. `kind` is a short label such as `timeout`.
pub fn record_upstream_error(kind: &'static str) {
    increment_counter!("sisgpo_upstream_errors_total", "kind" => kind);
}

/// Record a successful token exchange.
pub fn record_token_exchange(duration: Duration) {
    histogram!("sisgpo_token_exchange_seconds", duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder the macros are no-ops; these only check
    // that recording never panics.
    #[test]
    fn test_recording_without_recorder() {
        record_proxy_request("GET", 200, Duration::from_millis(12));
        record_cache_lookup(true);
        record_cache_lookup(false);
        record_upstream_error("timeout");
        record_token_exchange(Duration::from_millis(3));
    }

    #[test]
    fn test_detached_state_renders() {
        let state = MetricsState::detached();
        assert!(!state.handle.render().contains("sisgpo_proxy_requests_total"));
    }
}
