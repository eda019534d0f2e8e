// src/server/initialization.rs

//! Builds the repository, hub, and service, and binds the listener.

use super::context::{AppState, LogReloadHandle, ServerContext};
use crate::config::Config;
use crate::core::hub::Hub;
use crate::core::live_result::LiveResultService;
use crate::core::repository::InMemoryResultRepository;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(
    config: Config,
    log_reload_handle: Arc<LogReloadHandle>,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let repository = Arc::new(InMemoryResultRepository::new());
    let (hub, hub_loop) = Hub::new(&config.hub);
    let service = LiveResultService::new(repository, hub);
    info!("Live results service initialized.");

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(
        "Live results server listening on {}:{} (WebSocket endpoint {}/live/ws)",
        config.host,
        config.port,
        config.api.base_path.trim_end_matches('/')
    );

    let app = AppState::new(service, Arc::new(config), Some(log_reload_handle));

    Ok(ServerContext {
        app,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        hub_loop: Some(hub_loop),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Hub queues: broadcast={}, per-session={}; heartbeat every {:?}, stale after {:?}.",
        config.hub.broadcast_queue_capacity,
        config.hub.session_queue_capacity,
        config.hub.heartbeat_interval,
        config.hub.stale_threshold
    );
    info!(
        "Connections: read deadline {:?}, ping every {:?}, write timeout {:?}, max {} clients.",
        config.connection.read_deadline,
        config.connection.ping_interval,
        config.connection.write_timeout,
        config.max_clients
    );
}
