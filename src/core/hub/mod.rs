// src/core/hub/mod.rs

//! The live results hub: a session registry owned by a single event loop,
//! fed through channels by connections and by producers of result updates.
//!
//! `Hub` is the cloneable handle used everywhere else; `HubLoop` is the
//! consuming side and must be spawned exactly once.

pub mod event_loop;
pub mod liveness;
pub mod registry;
pub mod router;

pub use event_loop::{EvictionReason, HubLoop};
pub use registry::SessionRegistry;

use crate::core::LiveResultError;
use crate::core::metrics;
use crate::core::model::{ElectionResult, RegionResult, VoteResult, VoteStatistics};
use crate::core::protocol::{LiveMessage, MessageFilter, MessageKind, OutboundFrame};
use crate::core::session::{Session, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Capacity of the queue connections use to hand new sessions to the loop.
const REGISTER_QUEUE_CAPACITY: usize = 64;

/// Floor for the heartbeat period; the timer cannot tick at a zero interval.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Tunables for the hub, read from the `[hub]` section of the config file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HubConfig {
    #[serde(default = "default_queue_capacity")]
    pub broadcast_queue_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub session_queue_capacity: usize,
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_stale_threshold", with = "humantime_serde")]
    pub stale_threshold: Duration,
}

fn default_queue_capacity() -> usize {
    256
}
fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_stale_threshold() -> Duration {
    Duration::from_secs(120)
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_queue_capacity: default_queue_capacity(),
            session_queue_capacity: default_queue_capacity(),
            heartbeat_interval: default_heartbeat_interval(),
            stale_threshold: default_stale_threshold(),
        }
    }
}

/// Handle to a running hub.
#[derive(Clone, Debug)]
pub struct Hub {
    registry: Arc<SessionRegistry>,
    register_tx: mpsc::Sender<Arc<Session>>,
    unregister_tx: mpsc::UnboundedSender<SessionId>,
    broadcast_tx: mpsc::Sender<LiveMessage>,
    session_queue_capacity: usize,
}

impl Hub {
    /// Builds a hub handle and its event loop. Nothing is delivered until
    /// `HubLoop::run` is spawned.
    ///
    /// Zero capacities are raised to one and a zero heartbeat interval to
    /// `MIN_HEARTBEAT_INTERVAL`; `Config::validate` rejects both for file-based
    /// configuration.
    pub fn new(config: &HubConfig) -> (Hub, HubLoop) {
        let registry = Arc::new(SessionRegistry::new());
        let (register_tx, register_rx) = mpsc::channel(REGISTER_QUEUE_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_queue_capacity.max(1));

        let hub = Hub {
            registry: registry.clone(),
            register_tx,
            unregister_tx,
            broadcast_tx,
            session_queue_capacity: config.session_queue_capacity.max(1),
        };
        let event_loop = HubLoop {
            registry,
            register_rx,
            unregister_rx,
            broadcast_rx,
            heartbeat_interval: config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            stale_threshold: config.stale_threshold,
        };
        (hub, event_loop)
    }

    /// Creates a session with a fresh id and an outbound queue sized for this
    /// hub. The session is not registered yet.
    pub fn open_session(&self) -> (Arc<Session>, mpsc::Receiver<OutboundFrame>) {
        Session::new(SessionId::generate(), self.session_queue_capacity)
    }

    /// Hands a session to the event loop for registration.
    pub async fn register(&self, session: Arc<Session>) -> Result<(), LiveResultError> {
        self.register_tx
            .send(session)
            .await
            .map_err(|_| LiveResultError::HubUnavailable)
    }

    /// Requests removal of a session. Safe to call any number of times and
    /// from synchronous contexts such as `Drop`.
    pub fn unregister(&self, id: &SessionId) {
        if self.unregister_tx.send(id.clone()).is_err() {
            debug!(session_id = %id, "Hub loop gone; unregister request discarded.");
        }
    }

    /// Enqueues a message for fan-out without waiting. Returns `false` when the
    /// message was dropped because the broadcast queue is full or the loop
    /// has stopped.
    pub fn broadcast(&self, message: LiveMessage) -> bool {
        match self.broadcast_tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                metrics::BROADCAST_DROPPED_TOTAL.inc();
                warn!(kind = %message.kind, "Broadcast queue full, dropping update.");
                false
            }
            Err(TrySendError::Closed(message)) => {
                debug!(kind = %message.kind, "Hub loop gone; update discarded.");
                false
            }
        }
    }

    pub fn broadcast_vote_update(&self, vote: &VoteResult) -> bool {
        let filter = MessageFilter::new(
            Some(vote.election_pair_id.clone()),
            Some(vote.region.clone()),
        );
        self.broadcast_payload(MessageKind::VoteUpdate, vote, Some(filter))
    }

    pub fn broadcast_election_update(&self, result: &ElectionResult) -> bool {
        let filter = MessageFilter::new(
            Some(result.election_pair_id.clone()),
            Some(result.region.clone()),
        );
        self.broadcast_payload(MessageKind::ElectionUpdate, result, Some(filter))
    }

    pub fn broadcast_region_update(&self, result: &RegionResult) -> bool {
        let filter = MessageFilter::region(result.region.clone());
        self.broadcast_payload(MessageKind::RegionUpdate, result, Some(filter))
    }

    /// Statistics carry no routing filter.
    pub fn broadcast_statistics_update(&self, stats: &VoteStatistics) -> bool {
        self.broadcast_payload(MessageKind::StatisticsUpdate, stats, None)
    }

    fn broadcast_payload<T: Serialize>(
        &self,
        kind: MessageKind,
        payload: &T,
        filter: Option<MessageFilter>,
    ) -> bool {
        match LiveMessage::with_payload(kind, payload, filter) {
            Ok(message) => self.broadcast(message),
            Err(e) => {
                warn!(kind = %kind, "Failed to build update message: {}", e);
                false
            }
        }
    }

    /// Snapshot of the number of registered sessions.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
