//! SISGPO integration gateway binary.

use std::sync::Arc;

use anyhow::Context;
use sisgpo_federation::{IdentityDirectory, InMemoryDirectory};
use tokio::signal;
use tracing::{info, warn};

use sisgpo_gateway::config::GatewayConfig;
use sisgpo_gateway::logging::init_logging;
use sisgpo_gateway::middleware::AuthLayer;
use sisgpo_gateway::routes::MetricsState;
use sisgpo_gateway::state::AppState;
use sisgpo_gateway::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    init_logging(&config.logging)?;

    info!(
        listen_addr = %config.listen_addr,
        sisgpo_url = %config.sisgpo.base_url,
        "Starting SISGPO gateway"
    );
    if config.sisgpo.sso_secret.is_none() {
        warn!("SISGPO_SSO_SECRET is not set; every proxied request will fail with CONFIG_ERROR");
    }

    let directory = load_directory(&config)?;
    let state = Arc::new(AppState::new(&config, directory).context("failed to build state")?);
    let metrics = Arc::new(MetricsState::new()?);
    let auth = AuthLayer::from_secret(&config.auth.jwt_secret);

    let app = build_router(state, auth, metrics, &config.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn load_directory(config: &GatewayConfig) -> anyhow::Result<Arc<dyn IdentityDirectory>> {
    let Some(path) = &config.identity_directory_path else {
        return Ok(Arc::new(InMemoryDirectory::new()));
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read identity directory {}", path.display()))?;
    let directory = InMemoryDirectory::from_json(&content)
        .with_context(|| format!("invalid identity directory {}", path.display()))?;

    info!(entries = directory.len(), path = %path.display(), "Identity directory loaded");
    Ok(Arc::new(directory))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
