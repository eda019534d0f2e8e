// src/core/hub/event_loop.rs

//! The hub's single sequencer: every registry mutation and every delivery
//! decision happens inside `HubLoop::run`.

use super::liveness;
use super::registry::SessionRegistry;
use super::router::should_deliver;
use crate::core::metrics;
use crate::core::protocol::LiveMessage;
use crate::core::session::{OfferOutcome, Session, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The connection asked to be removed (transport closed or errored).
    Disconnect,
    /// Its outbound queue was full when a message was routed to it.
    Backpressure,
    /// Its outbound queue was already closed from the writer side.
    WriterGone,
    /// No inbound traffic within the stale threshold.
    Stale,
    /// The hub is shutting down.
    Shutdown,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Disconnect => "disconnect",
            EvictionReason::Backpressure => "backpressure",
            EvictionReason::WriterGone => "writer_gone",
            EvictionReason::Stale => "stale",
            EvictionReason::Shutdown => "shutdown",
        }
    }
}

/// The receiving side of the hub. Created by `Hub::new` and driven by `run`.
pub struct HubLoop {
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) register_rx: mpsc::Receiver<Arc<Session>>,
    pub(super) unregister_rx: mpsc::UnboundedReceiver<SessionId>,
    pub(super) broadcast_rx: mpsc::Receiver<LiveMessage>,
    pub(super) heartbeat_interval: Duration,
    pub(super) stale_threshold: Duration,
}

impl HubLoop {
    /// Runs until `shutdown_rx` fires (or its sender is dropped), then closes
    /// every session and empties the registry.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Live results hub started (heartbeat every {:?}, stale after {:?}).",
            self.heartbeat_interval, self.stale_threshold
        );
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Registration is polled before unregistration so a session
                // that connects and drops immediately is never inserted after
                // its own removal.
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Live results hub received shutdown signal.");
                    break;
                }
                Some(session) = self.register_rx.recv() => {
                    self.register(session);
                }
                Some(id) = self.unregister_rx.recv() => {
                    self.unregister(&id, EvictionReason::Disconnect);
                }
                Some(message) = self.broadcast_rx.recv() => {
                    self.broadcast(&message);
                }
                _ = ticker.tick() => {
                    self.liveness_tick();
                }
            }
        }

        self.shutdown();
    }

    fn register(&mut self, session: Arc<Session>) {
        let id = session.id().clone();
        if let Some(previous) = self.registry.insert(session.clone()) {
            warn!(session_id = %id, "Session id registered twice; replacing the existing entry.");
            if !Arc::ptr_eq(&previous, &session) {
                previous.close();
            }
        }
        info!(
            session_id = %id,
            total_clients = self.registry.len(),
            "Client registered."
        );

        let welcome = liveness::welcome(&id);
        match welcome.encode() {
            Ok(frame) => match session.offer(frame) {
                OfferOutcome::Queued => metrics::MESSAGES_DELIVERED_TOTAL.inc(),
                OfferOutcome::Full => self.unregister(&id, EvictionReason::Backpressure),
                OfferOutcome::Closed => self.unregister(&id, EvictionReason::WriterGone),
            },
            Err(e) => warn!(session_id = %id, "Failed to encode welcome message: {}", e),
        }
    }

    /// Removes a session and closes its outbound queue. A session that is not
    /// registered (already removed by another path) is left alone.
    fn unregister(&mut self, id: &SessionId, reason: EvictionReason) {
        let Some(session) = self.registry.remove(id) else {
            debug!(session_id = %id, reason = reason.as_str(), "Unregister for unknown session ignored.");
            return;
        };
        session.close();
        metrics::SESSIONS_EVICTED_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();
        info!(
            session_id = %id,
            reason = reason.as_str(),
            total_clients = self.registry.len(),
            "Client unregistered."
        );
    }

    /// Fans a message out to every matching session. Sessions whose queue
    /// cannot take the message are evicted after the scan.
    fn broadcast(&mut self, message: &LiveMessage) {
        metrics::MESSAGES_BROADCAST_TOTAL
            .with_label_values(&[message.kind.as_str()])
            .inc();

        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = %message.kind, "Failed to encode broadcast message: {}", e);
                return;
            }
        };

        let mut evictions: Vec<(SessionId, EvictionReason)> = Vec::new();
        let mut recipients = 0usize;
        self.registry.for_each(|session| {
            if !should_deliver(session, message) {
                return;
            }
            match session.offer(frame.clone()) {
                OfferOutcome::Queued => recipients += 1,
                OfferOutcome::Full => {
                    warn!(session_id = %session.id(), kind = %message.kind, "Outbound queue full, dropping slow client.");
                    evictions.push((session.id().clone(), EvictionReason::Backpressure));
                }
                OfferOutcome::Closed => {
                    evictions.push((session.id().clone(), EvictionReason::WriterGone));
                }
            }
        });
        metrics::MESSAGES_DELIVERED_TOTAL.inc_by(recipients as f64);
        debug!(kind = %message.kind, recipients, "Broadcast delivered.");

        for (id, reason) in evictions {
            self.unregister(&id, reason);
        }
    }

    fn liveness_tick(&mut self) {
        let heartbeat = liveness::heartbeat(self.registry.len());
        self.broadcast(&heartbeat);

        let stale =
            liveness::stale_sessions(&self.registry, Instant::now(), self.stale_threshold);
        for id in stale {
            info!(session_id = %id, "Evicting stale client.");
            self.unregister(&id, EvictionReason::Stale);
        }
    }

    fn shutdown(&mut self) {
        let sessions = self.registry.drain();
        let count = sessions.len();
        for session in sessions {
            if session.close() {
                metrics::SESSIONS_EVICTED_TOTAL
                    .with_label_values(&[EvictionReason::Shutdown.as_str()])
                    .inc();
            }
        }
        // Requests that arrive from now on find nothing to do.
        self.register_rx.close();
        while let Ok(session) = self.register_rx.try_recv() {
            session.close();
        }
        self.unregister_rx.close();
        self.broadcast_rx.close();
        info!("Live results hub stopped; closed {} client session(s).", count);
    }
}
