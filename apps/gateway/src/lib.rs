//! SISGPO integration gateway.
//!
//! Authenticates callers with their local session, exchanges that identity
//! for a SISGPO session through a signed SSO assertion, and forwards an
//! allowlisted set of admin API calls with short-lived response caching.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::AuthLayer;
use crate::routes::{health_routes, metrics_routes, sisgpo_routes, MetricsState};
use crate::state::AppState;

pub use crate::config::GatewayConfig;
pub use crate::error::{GatewayError, GatewayResult};

/// Assemble the full application router.
pub fn build_router(
    state: Arc<AppState>,
    auth: AuthLayer,
    metrics: Arc<MetricsState>,
    cors_origins: &[String],
) -> Router {
    let body_limit = state.max_body_size_bytes;

    let protected = sisgpo_routes(state.clone()).route_layer(auth);

    Router::new()
        .merge(protected)
        .merge(health_routes(state))
        .merge(metrics_routes(metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(build_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// CORS policy for browser clients of the admin UI.
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let is_wildcard = origins.is_empty() || (origins.len() == 1 && origins[0] == "*");

    let allow_origin = if is_wildcard {
        AllowOrigin::any()
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(allowed)
    };

    let layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .expose_headers([header::ETAG])
        .max_age(Duration::from_secs(3600));

    if is_wildcard {
        layer.allow_methods(Any).allow_headers(Any)
    } else {
        layer
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::IF_MATCH,
            ])
            .allow_credentials(true)
    }
}
