// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns all critical background tasks into the provided JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;
    let config = ctx.app.config.clone();

    // --- Hub Event Loop ---
    let hub_loop = ctx
        .hub_loop
        .take()
        .ok_or_else(|| anyhow!("hub event loop has already been spawned"))?;
    let shutdown_rx_hub = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        hub_loop.run(shutdown_rx_hub).await;
        Ok(())
    });

    // --- Periodic Statistics Broadcast ---
    let interval = config.live.periodic_broadcast_interval;
    if interval.is_zero() {
        info!("Periodic statistics broadcast is disabled in the configuration.");
    } else {
        let service = ctx.app.service.clone();
        let shutdown_rx_periodic = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            service
                .start_periodic_broadcast(interval, shutdown_rx_periodic)
                .await;
            Ok(())
        });
    }

    // --- Metrics Server ---
    if config.metrics.enabled {
        let port = config.metrics.port;
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(port, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
