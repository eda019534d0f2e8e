// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::hub::Hub;
use crate::core::metrics;
use crate::core::session::SessionId;
use tracing::debug;

/// An RAII guard to ensure a connection is always removed from the hub when
/// its handler's scope is exited, whichever way that happens.
pub struct ConnectionGuard {
    hub: Hub,
    session_id: SessionId,
}

impl ConnectionGuard {
    /// Creates a new `ConnectionGuard` and counts the connection as live.
    pub(crate) fn new(hub: Hub, session_id: SessionId) -> Self {
        metrics::CONNECTIONS_TOTAL.inc();
        metrics::CONNECTED_CLIENTS.inc();
        Self { hub, session_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            session_id = %self.session_id,
            "ConnectionGuard dropping, requesting unregister."
        );
        // Removal is a no-op if the hub already evicted this session.
        self.hub.unregister(&self.session_id);
    }
}
