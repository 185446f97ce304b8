use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use client::backend::BackendApi;
use common::Contest;

use crate::config::ServerConfig;

use super::auth;
use super::cartridges;
use super::contests;
use super::invites::{InviteRegistry, MemoryInvites};
use super::jwt::SessionManager;
use super::leaderboard;
use super::players;
use super::middleware::{refresh_session, require_session};

/// Shared handles for every route.
#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<dyn BackendApi>,
    pub sessions: Arc<SessionManager>,
    pub invites: Arc<dyn InviteRegistry>,
    /// Contest metadata keyed by normalised rule id.
    pub contests: Arc<HashMap<String, Contest>>,
    pub protected_paths: Arc<Vec<String>>,
    /// Score NFT contract the mint endpoint points wallets at.
    pub nft_address: Arc<String>,
    pub chain_id: u64,
}

impl ApiState {
    /// State for `config`, with invite codes held in memory.
    pub fn from_config(config: &ServerConfig, backend: Arc<dyn BackendApi>) -> Self {
        Self {
            backend,
            sessions: Arc::new(SessionManager::new(&config.invite_code_key, config.session_ttl)),
            invites: Arc::new(MemoryInvites::new(config.invite_codes.iter().cloned())),
            contests: Arc::new(config.contests.clone()),
            protected_paths: Arc::new(config.protected_paths.clone()),
            nft_address: Arc::new(config.nft_address.clone()),
            chain_id: config.chain_id,
        }
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/auth/code", post(auth::validate_code))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/session", get(auth::current_session))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/leaderboard", get(leaderboard::get_leaderboard))
        .route("/api/contests", get(contests::list_contests))
        .route("/api/contests/:rule_id", get(contests::get_contest))
        .route("/api/mint/:input_index", get(players::get_mint))
        .route("/api/players/:address/submissions", get(players::get_submissions))
        .route(
            "/cartridges/:cartridge_id",
            get(cartridges::get_cartridge).options(cartridges::cartridge_preflight),
        )
        // The last layer added runs first, so the guard sees refreshed claims.
        .layer(middleware::from_fn_with_state(state.clone(), require_session))
        .layer(middleware::from_fn_with_state(state.clone(), refresh_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(addr: &str, state: ApiState, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server to {}", addr))?;
    run_api_server_with_listener(listener, state, shutdown).await
}

pub async fn run_api_server_with_listener(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = build_router(state);
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))
}

async fn health_check() -> &'static str {
    "OK"
}
