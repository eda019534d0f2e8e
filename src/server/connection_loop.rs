// src/server/connection_loop.rs

//! Contains the main server loop: serves HTTP and WebSocket connections until a
//! signal or a failed background task, then shuts everything down in order.

use super::context::ServerContext;
use super::routes;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// How long shutdown waits for the HTTP server and background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The main server loop that serves connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let app = routes::router(ctx.app.clone());
    let listener = ctx.listener;
    let mut server_shutdown_rx = ctx.shutdown_tx.subscribe();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_shutdown_rx.recv().await.ok();
                info!("HTTP server no longer accepting connections.");
            })
            .await
    });

    let mut server_finished = false;
    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly. Shutting down."),
                    Ok(Err(e)) => error!("CRITICAL: Background task failed: {}. Shutting down.", e),
                    Err(e) => error!("CRITICAL: Background task panicked: {e:?}. Shutting down."),
                }
                break;
            }

            res = &mut server => {
                server_finished = true;
                match res {
                    Ok(Ok(())) => warn!("HTTP server stopped unexpectedly. Shutting down."),
                    Ok(Err(e)) => error!("CRITICAL: HTTP server failed: {}. Shutting down.", e),
                    Err(e) => error!("CRITICAL: HTTP server task panicked: {e:?}. Shutting down."),
                }
                break;
            }
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("No task was listening for the shutdown signal.");
    }

    if !server_finished {
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(_) => info!("All client connections closed."),
            Err(_) => {
                warn!("Timed out waiting for client connections to close.");
                server.abort();
            }
        }
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
        ctx.background_tasks.shutdown().await;
    };
    info!("Server shutdown complete.");
    Ok(())
}
