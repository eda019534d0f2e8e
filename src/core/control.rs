// src/core/control.rs

//! Handles inbound control messages: a client subscribes to or unsubscribes from
//! a category of updates over its own connection.

use crate::core::LiveResultError;
use crate::core::metrics;
use crate::core::protocol::{
    ControlMessage, LiveMessage, MessageFilter, MessageKind, SubscriptionKind,
};
use crate::core::session::{OfferOutcome, Session};
use serde_json::json;
use tracing::{info, warn};

/// A decoded control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    Subscribe {
        kind: SubscriptionKind,
        filter: MessageFilter,
    },
    Unsubscribe {
        kind: SubscriptionKind,
    },
    /// Well-formed JSON whose `type` is not a control request.
    Unknown(String),
}

impl ControlRequest {
    /// Decodes a text frame. Payloads that are not JSON, lack a `type`, name an
    /// unknown subscription, or omit the subscription of a subscribe/unsubscribe
    /// are malformed.
    pub fn parse(text: &str) -> Result<Self, LiveResultError> {
        let raw: ControlMessage = serde_json::from_str(text)
            .map_err(|e| LiveResultError::MalformedControl(e.to_string()))?;

        let subscription = || {
            raw.subscription.ok_or_else(|| {
                LiveResultError::MalformedControl(format!(
                    "'{}' requires a 'subscription' field",
                    raw.kind
                ))
            })
        };

        match raw.kind.as_str() {
            "subscribe" => Ok(ControlRequest::Subscribe {
                kind: subscription()?,
                filter: MessageFilter::new(raw.election_pair_id.clone(), raw.region.clone()),
            }),
            "unsubscribe" => Ok(ControlRequest::Unsubscribe {
                kind: subscription()?,
            }),
            _ => Ok(ControlRequest::Unknown(raw.kind.clone())),
        }
    }
}

/// What the control handler did with one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// The subscription table changed and an ack was produced.
    Applied(LiveMessage),
    /// Nothing to do (unknown request type).
    Ignored,
}

/// Applies one control frame to the session's subscription table and returns
/// the acknowledgement to send back, if any.
pub fn apply(session: &Session, text: &str) -> Result<ControlOutcome, LiveResultError> {
    let request = match ControlRequest::parse(text) {
        Ok(request) => request,
        Err(e) => {
            metrics::CONTROL_MESSAGES_TOTAL
                .with_label_values(&["malformed"])
                .inc();
            return Err(e);
        }
    };

    match request {
        ControlRequest::Subscribe { kind, filter } => {
            session.subscribe(kind, filter.clone());
            metrics::CONTROL_MESSAGES_TOTAL
                .with_label_values(&["subscribe"])
                .inc();
            info!(
                session_id = %session.id(),
                subscription = %kind,
                election_pair_id = filter.election_pair_id.as_deref().unwrap_or(""),
                region = filter.region.as_deref().unwrap_or(""),
                "Client subscribed."
            );
            Ok(ControlOutcome::Applied(subscribe_ack(kind, &filter)))
        }
        ControlRequest::Unsubscribe { kind } => {
            session.unsubscribe(kind);
            metrics::CONTROL_MESSAGES_TOTAL
                .with_label_values(&["unsubscribe"])
                .inc();
            info!(session_id = %session.id(), subscription = %kind, "Client unsubscribed.");
            Ok(ControlOutcome::Applied(unsubscribe_ack(kind)))
        }
        ControlRequest::Unknown(kind) => {
            metrics::CONTROL_MESSAGES_TOTAL
                .with_label_values(&["unknown"])
                .inc();
            warn!(session_id = %session.id(), message_type = %kind, "Unknown control message type.");
            Ok(ControlOutcome::Ignored)
        }
    }
}

/// Applies a control frame and queues the ack on the session's own outbound
/// queue. Malformed frames are logged and otherwise ignored.
///
/// Returns `false` only when the ack could not be queued because the outbound
/// queue is full; the caller then treats the client as unresponsive.
pub fn handle_frame(session: &Session, text: &str) -> bool {
    let ack = match apply(session, text) {
        Ok(ControlOutcome::Applied(ack)) => ack,
        Ok(ControlOutcome::Ignored) => return true,
        Err(e) => {
            warn!(session_id = %session.id(), "Ignoring control message: {}", e);
            return true;
        }
    };

    let frame = match ack.encode() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(session_id = %session.id(), "Failed to encode control ack: {}", e);
            return true;
        }
    };
    match session.offer(frame) {
        OfferOutcome::Queued | OfferOutcome::Closed => true,
        OfferOutcome::Full => {
            warn!(session_id = %session.id(), "Outbound queue full while acknowledging control message.");
            false
        }
    }
}

pub fn subscribe_ack(kind: SubscriptionKind, filter: &MessageFilter) -> LiveMessage {
    LiveMessage::new(
        MessageKind::Subscribe,
        Some(json!({
            "subscription": kind,
            "status": "subscribed",
            "filter": filter,
        })),
        None,
    )
}

pub fn unsubscribe_ack(kind: SubscriptionKind) -> LiveMessage {
    LiveMessage::new(
        MessageKind::Unsubscribe,
        Some(json!({
            "subscription": kind,
            "status": "unsubscribed",
        })),
        None,
    )
}
