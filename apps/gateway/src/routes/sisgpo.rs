//! SISGPO proxy and cache administration routes.
//!
//! All routes here sit behind the local session layer.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, delete, get},
    Extension, Json, Router,
};
use tracing::info;

use crate::cache::CacheStats;
use crate::error::GatewayError;
use crate::middleware::LocalIdentity;
use crate::proxy::PROXY_ROUTE_PREFIX;
use crate::routes::metrics::record_proxy_request;
use crate::state::AppState;

/// Create the proxy and cache routes.
pub fn sisgpo_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route(PROXY_ROUTE_PREFIX, any(proxy_handler))
        .route(&format!("{PROXY_ROUTE_PREFIX}/"), any(proxy_handler))
        .route(&format!("{PROXY_ROUTE_PREFIX}/*path"), any(proxy_handler))
        .route("/api/sisgpo/cache/stats", get(cache_stats_handler))
        .route("/api/sisgpo/cache", delete(cache_flush_handler))
        .with_state(state)
}

async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<LocalIdentity>>,
    request: Request,
) -> Response {
    let Some(Extension(identity)) = identity else {
        return GatewayError::Unauthorized.into_response();
    };

    let started = Instant::now();
    let method = request.method().clone();

    let response = state
        .forwarder
        .handle(&identity.to_federated(), request)
        .await;

    record_proxy_request(method.as_str(), response.status().as_u16(), started.elapsed());
    response
}

async fn cache_stats_handler(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

async fn cache_flush_handler(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<LocalIdentity>>,
) -> StatusCode {
    state.cache.flush();
    info!(
        user_id = identity.as_ref().map_or("unknown", |Extension(i)| i.id.as_str()),
        "response cache flushed"
    );
    StatusCode::NO_CONTENT
}
