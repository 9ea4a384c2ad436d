//! Proxy components for SISGPO communication.

pub mod allowlist;
pub mod client;
pub mod forwarder;

pub use allowlist::Allowlist;
pub use client::UpstreamClient;
pub use forwarder::{Forwarder, ProxyRequest, PROXY_ROUTE_PREFIX};
