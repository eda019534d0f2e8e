// src/core/hub/liveness.rs

//! Application-level liveness: heartbeat messages and stale-session detection.
//!
//! Both run from the hub loop's timer tick, so they are serialized with every
//! other registry mutation. Transport-level ping/pong lives in the connection
//! writer and works independently of this.

use super::registry::SessionRegistry;
use crate::core::protocol::{LiveMessage, MessageKind};
use crate::core::session::SessionId;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

/// The periodic keepalive sent to every session.
pub fn heartbeat(client_count: usize) -> LiveMessage {
    LiveMessage::new(
        MessageKind::Heartbeat,
        Some(json!({
            "status": "alive",
            "clients": client_count,
        })),
        None,
    )
}

/// The first message a session receives, carrying its assigned id.
pub fn welcome(id: &SessionId) -> LiveMessage {
    LiveMessage::new(
        MessageKind::Heartbeat,
        Some(json!({
            "status": "connected",
            "client_id": id.as_str(),
        })),
        None,
    )
}

/// Ids of sessions with no inbound traffic for longer than `threshold`.
pub fn stale_sessions(registry: &SessionRegistry, now: Instant, threshold: Duration) -> Vec<SessionId> {
    let mut stale = Vec::new();
    registry.for_each(|session| {
        if session.idle_for(now) > threshold {
            stale.push(session.id().clone());
        }
    });
    stale
}
