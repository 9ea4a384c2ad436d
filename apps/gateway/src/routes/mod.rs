//! HTTP routes.

pub mod health;
pub mod metrics;
pub mod sisgpo;

pub use health::health_routes;
pub use metrics::{metrics_routes, MetricsState};
pub use sisgpo::sisgpo_routes;
