// src/server/context.rs

use crate::config::Config;
use crate::core::LiveResultService;
use crate::core::hub::HubLoop;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Handle used to swap the active tracing filter at runtime.
pub type LogReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// State shared by every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub service: LiveResultService,
    pub config: Arc<Config>,
    /// Absent in tests that never install a global subscriber.
    pub log_reload_handle: Option<Arc<LogReloadHandle>>,
    /// The filter string currently in effect.
    pub log_level: Arc<Mutex<String>>,
}

impl AppState {
    pub fn new(
        service: LiveResultService,
        config: Arc<Config>,
        log_reload_handle: Option<Arc<LogReloadHandle>>,
    ) -> Self {
        let log_level = Arc::new(Mutex::new(config.log_level.clone()));
        Self {
            service,
            config,
            log_reload_handle,
            log_level,
        }
    }
}

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub app: AppState,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    /// Taken by the spawner when the hub loop task starts.
    pub hub_loop: Option<HubLoop>,
}
