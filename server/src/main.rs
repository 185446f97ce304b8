use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client::{NodeBackend, NodeConfig};
use server::api::{run_api_server, ApiState};
use server::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if exists
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    info!(
        "Using node {} (chain {}, dapp {})",
        config.node_url, config.chain_id, config.dapp_address
    );
    if config.invite_codes.is_empty() {
        warn!("RIVES_INVITE_CODES is empty: nobody can log in");
    }
    if let Some(gif_server) = &config.gif_server_url {
        info!("Preview GIFs served by {}", gif_server);
    }
    info!("Protected paths: {:?}", config.protected_paths);

    let backend = Arc::new(NodeBackend::new(NodeConfig::new(config.node_url.clone())));
    let state = ApiState::from_config(&config, backend);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal. Shutting down gracefully...");
                signal.cancel();
            }
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    });

    run_api_server(&config.listen_addr.to_string(), state, shutdown).await?;
    info!("Server shut down successfully");
    Ok(())
}
