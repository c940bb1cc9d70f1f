use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use livescore_hub::api;
use livescore_hub::config::Config;
use livescore_hub::live_scores::{ProviderManager, RateLimiterRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }

    // One limiter per provider, shared by every adapter instance
    let limiters = RateLimiterRegistry::new(config.rate_limit_max_wait());
    let manager = ProviderManager::initialize(&config.provider_settings(), &limiters)
        .context("failed to build score providers")?;

    let app = api::router(Arc::new(manager));
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid LISTEN_ADDR {}", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Live-score API listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
