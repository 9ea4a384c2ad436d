//! Health check endpoint with an upstream probe.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::state::AppState;

/// Outer bound on the upstream probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub sso_configured: bool,
    pub upstream: UpstreamHealth,
}

/// Overall health status.
///
/// The gateway itself is up whenever it answers; an unreachable upstream or
/// a missing SSO secret only degrades it.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// SISGPO health as seen from the gateway.
#[derive(Debug, Serialize)]
pub struct UpstreamHealth {
    pub status: UpstreamStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Healthy,
    Unhealthy,
}

/// Create health check routes.
pub fn health_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let upstream = probe_upstream(&state).await;

    let status = if upstream.status == UpstreamStatus::Healthy && state.sso_configured {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sso_configured: state.sso_configured,
        upstream,
    })
}

async fn probe_upstream(state: &AppState) -> UpstreamHealth {
    match timeout(PROBE_TIMEOUT, state.upstream.health_check(&state.health_path)).await {
        Ok(Ok(latency)) => {
            debug!(latency_ms = %latency.as_millis(), "SISGPO healthy");
            UpstreamHealth {
                status: UpstreamStatus::Healthy,
                latency_ms: Some(latency.as_millis() as u64),
                error: None,
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, "SISGPO unhealthy");
            UpstreamHealth {
                status: UpstreamStatus::Unhealthy,
                latency_ms: None,
                error: Some(e),
            }
        }
        Err(_) => {
            warn!("SISGPO health check timed out");
            UpstreamHealth {
                status: UpstreamStatus::Unhealthy,
                latency_ms: None,
                error: Some("Health check timed out".to_string()),
            }
        }
    }
}
