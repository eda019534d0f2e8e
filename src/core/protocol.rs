// src/core/protocol.rs

//! Wire types for the live results feed: outbound `LiveMessage` envelopes and the
//! inbound subscribe/unsubscribe control messages, both JSON over WebSocket text
//! frames.

use crate::core::LiveResultError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A serialized message ready to be written to a transport. Shared between every
/// session that receives the same broadcast, so the JSON is encoded only once.
pub type OutboundFrame = Arc<str>;

/// The `type` tag of an outbound message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    VoteUpdate,
    ElectionUpdate,
    RegionUpdate,
    StatisticsUpdate,
    Heartbeat,
    /// Acknowledgement of a subscribe request.
    Subscribe,
    /// Acknowledgement of an unsubscribe request.
    Unsubscribe,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::VoteUpdate => "vote_update",
            MessageKind::ElectionUpdate => "election_update",
            MessageKind::RegionUpdate => "region_update",
            MessageKind::StatisticsUpdate => "statistics_update",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Subscribe => "subscribe",
            MessageKind::Unsubscribe => "unsubscribe",
        }
    }

    /// Kinds advertised by the status endpoint; acks are not broadcast.
    pub const BROADCAST_KINDS: [MessageKind; 5] = [
        MessageKind::VoteUpdate,
        MessageKind::ElectionUpdate,
        MessageKind::RegionUpdate,
        MessageKind::StatisticsUpdate,
        MessageKind::Heartbeat,
    ];
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The category of updates a session asks for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "election")]
    ByElectionPair,
    #[serde(rename = "region")]
    ByRegion,
    #[serde(rename = "statistics")]
    Statistics,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::All => "all",
            SubscriptionKind::ByElectionPair => "election",
            SubscriptionKind::ByRegion => "region",
            SubscriptionKind::Statistics => "statistics",
        }
    }

    pub const ALL_KINDS: [SubscriptionKind; 4] = [
        SubscriptionKind::All,
        SubscriptionKind::ByElectionPair,
        SubscriptionKind::ByRegion,
        SubscriptionKind::Statistics,
    ];
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing filter attached to a broadcast, or filter payload of a subscription.
///
/// Empty strings are normalized to `None`, so "no filter" has exactly one
/// representation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_pair_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl MessageFilter {
    pub fn new(election_pair_id: Option<String>, region: Option<String>) -> Self {
        Self {
            election_pair_id: election_pair_id.filter(|s| !s.is_empty()),
            region: region.filter(|s| !s.is_empty()),
        }
    }

    pub fn election_pair(election_pair_id: impl Into<String>) -> Self {
        Self::new(Some(election_pair_id.into()), None)
    }

    pub fn region(region: impl Into<String>) -> Self {
        Self::new(None, Some(region.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.election_pair_id.is_none() && self.region.is_none()
    }
}

/// The envelope of every outbound message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LiveMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MessageFilter>,
}

impl LiveMessage {
    /// Creates a message stamped with the current time.
    pub fn new(kind: MessageKind, data: Option<Value>, filter: Option<MessageFilter>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data,
            filter,
        }
    }

    /// Creates a message whose `data` is the JSON form of `payload`.
    pub fn with_payload<T: Serialize>(
        kind: MessageKind,
        payload: &T,
        filter: Option<MessageFilter>,
    ) -> Result<Self, LiveResultError> {
        let data = serde_json::to_value(payload)?;
        Ok(Self::new(kind, Some(data), filter))
    }

    /// Serializes the message into a shareable frame.
    pub fn encode(&self) -> Result<OutboundFrame, LiveResultError> {
        let json = serde_json::to_string(self)?;
        Ok(Arc::from(json))
    }

    /// The election pair this message is routed by, if any.
    pub fn election_pair_id(&self) -> Option<&str> {
        self.filter
            .as_ref()
            .and_then(|f| f.election_pair_id.as_deref())
    }

    /// The region this message is routed by, if any.
    pub fn region(&self) -> Option<&str> {
        self.filter.as_ref().and_then(|f| f.region.as_deref())
    }
}

/// A raw inbound control message as it appears on the wire:
/// `{"type": "subscribe", "subscription": "region", "region": "Bandung"}`.
///
/// `type` is kept as a string so unknown request types can be told apart from
/// payloads that are not control messages at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subscription: Option<SubscriptionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_pair_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}
