//! Application state shared across all request handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sisgpo_federation::{IdentityDirectory, InMemoryDirectory, TokenFederationService};

use crate::cache::{ResponseCache, TtlPolicy};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::proxy::{Allowlist, Forwarder, UpstreamClient};

/// Application state shared across all handlers.
///
/// Held behind an `Arc`; every component is built once at startup.
pub struct AppState {
    pub forwarder: Forwarder,
    pub cache: Arc<ResponseCache>,
    pub upstream: UpstreamClient,
    pub health_path: String,
    pub sso_configured: bool,
    pub max_body_size_bytes: usize,
    pub start_time: Instant,
    pub version: String,
}

impl AppState {
    /// Build the state with the default allowlist and TTL tiers.
    pub fn new(
        config: &GatewayConfig,
        directory: Arc<dyn IdentityDirectory>,
    ) -> GatewayResult<Self> {
        let policy =
            TtlPolicy::sisgpo_default(Duration::from_secs(config.cache.default_ttl_secs));
        Self::with_parts(config, directory, Allowlist::sisgpo_default(), policy)
    }

    /// Build the state with an explicit allowlist and TTL policy.
    pub fn with_parts(
        config: &GatewayConfig,
        directory: Arc<dyn IdentityDirectory>,
        allowlist: Allowlist,
        policy: TtlPolicy,
    ) -> GatewayResult<Self> {
        let federation = TokenFederationService::with_directory(config.federation_config(), directory)
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("federation client: {e}")))?;
        let upstream = UpstreamClient::new(config.sisgpo.base_url.clone(), config.proxy_timeout())?;
        let cache = Arc::new(ResponseCache::new(config.cache.max_entries, policy));

        let forwarder = Forwarder::new(allowlist, federation, cache.clone(), upstream.clone());

        Ok(Self {
            forwarder,
            cache,
            upstream,
            health_path: config.sisgpo.health_path.clone(),
            sso_configured: config.sisgpo.sso_secret.is_some(),
            max_body_size_bytes: config.max_body_size_bytes,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// State with an empty identity directory.
    pub fn without_directory(config: &GatewayConfig) -> GatewayResult<Self> {
        Self::new(config, Arc::new(InMemoryDirectory::new()))
    }
}
