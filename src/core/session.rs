// src/core/session.rs

//! Defines the state shared between the hub and a single connected client.

use crate::core::protocol::{MessageFilter, OutboundFrame, SubscriptionKind};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque, unique identifier of a session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The result of a non-blocking offer to a session's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Queued,
    /// The queue is at capacity; the consumer is too slow.
    Full,
    /// The queue was closed by the hub or the writer has gone away.
    Closed,
}

/// Maps each subscription kind to its filter. At most one entry per kind.
pub type SubscriptionTable = HashMap<SubscriptionKind, MessageFilter>;

/// One connected client as seen by the hub.
///
/// The hub registry owns the `Arc<Session>` once registered; the connection's
/// reader and writer hold clones. Each part is touched under its own lock:
/// the outbound sender by the hub and the reader's acks, the subscription
/// table by the reader (writes) and the router (reads).
pub struct Session {
    id: SessionId,
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    closed: AtomicBool,
    subscriptions: RwLock<SubscriptionTable>,
    last_activity: Mutex<Instant>,
    connected_at: Instant,
}

impl Session {
    /// Creates a session with a bounded outbound queue of `capacity` frames and
    /// returns the receiving half for the connection's writer.
    ///
    /// `capacity` must be non-zero.
    pub fn new(id: SessionId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let now = Instant::now();
        let session = Arc::new(Self {
            id,
            outbound: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            subscriptions: RwLock::new(HashMap::new()),
            last_activity: Mutex::new(now),
            connected_at: now,
        });
        (session, rx)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Offers a frame to the outbound queue without waiting.
    pub fn offer(&self, frame: OutboundFrame) -> OfferOutcome {
        let guard = self.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            return OfferOutcome::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => OfferOutcome::Queued,
            Err(TrySendError::Full(_)) => OfferOutcome::Full,
            Err(TrySendError::Closed(_)) => OfferOutcome::Closed,
        }
    }

    /// Closes the outbound queue. Only the first call has an effect; it returns
    /// `true`, every later call returns `false`.
    ///
    /// Frames already queued are still delivered to the writer, which then sees
    /// the end of the queue.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Dropping the only sender ends the writer's receive loop.
        self.outbound.lock().take();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Adds a subscription or replaces the filter of an existing one of the same
    /// kind. Returns the replaced filter.
    pub fn subscribe(&self, kind: SubscriptionKind, filter: MessageFilter) -> Option<MessageFilter> {
        self.subscriptions.write().insert(kind, filter)
    }

    /// Removes the subscription of `kind`. Returns whether one existed.
    pub fn unsubscribe(&self, kind: SubscriptionKind) -> bool {
        self.subscriptions.write().remove(&kind).is_some()
    }

    /// Runs `f` with the subscription table read-locked.
    pub fn with_subscriptions<R>(&self, f: impl FnOnce(&SubscriptionTable) -> R) -> R {
        f(&self.subscriptions.read())
    }

    /// A copy of the current subscription table.
    pub fn subscriptions(&self) -> SubscriptionTable {
        self.subscriptions.read().clone()
    }

    /// Records inbound traffic.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// How long the session has been silent as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("subscriptions", &*self.subscriptions.read())
            .finish()
    }
}
