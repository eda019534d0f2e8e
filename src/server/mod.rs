// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
pub mod routes;
mod spawner;

pub use context::{AppState, LogReloadHandle};
pub use routes::router;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config, log_reload_handle: Arc<LogReloadHandle>) -> Result<()> {
    // 1. Build the hub and service, bind the listener.
    let mut server_context = initialization::setup(config, log_reload_handle).await?;

    // 2. Spawn the hub loop and the other background tasks.
    spawner::spawn_all(&mut server_context)?;

    // 3. Serve until shutdown.
    connection_loop::run(server_context).await
}
