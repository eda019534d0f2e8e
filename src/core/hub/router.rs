// src/core/hub/router.rs

//! Decides which sessions receive a broadcast message.

use crate::core::protocol::{LiveMessage, MessageFilter, MessageKind, SubscriptionKind};
use crate::core::session::{Session, SubscriptionTable};

/// Returns whether `message` should be delivered to `session`, reading the
/// session's subscription table under its read lock.
pub fn should_deliver(session: &Session, message: &LiveMessage) -> bool {
    if message.kind == MessageKind::Heartbeat {
        return true;
    }
    session.with_subscriptions(|subs| matches_subscriptions(subs, message))
}

/// The matching rules over a subscription table.
///
/// Heartbeats always match. An empty table matches nothing else. Otherwise
/// any single matching subscription is enough.
pub fn matches_subscriptions(subscriptions: &SubscriptionTable, message: &LiveMessage) -> bool {
    if message.kind == MessageKind::Heartbeat {
        return true;
    }
    subscriptions
        .iter()
        .any(|(kind, filter)| subscription_matches(*kind, filter, message))
}

fn subscription_matches(kind: SubscriptionKind, filter: &MessageFilter, message: &LiveMessage) -> bool {
    match kind {
        SubscriptionKind::All => true,
        SubscriptionKind::ByElectionPair => {
            matches!(
                message.kind,
                MessageKind::ElectionUpdate | MessageKind::VoteUpdate
            ) && field_matches(
                filter.election_pair_id.as_deref(),
                message.election_pair_id(),
            )
        }
        SubscriptionKind::ByRegion => {
            matches!(
                message.kind,
                MessageKind::RegionUpdate | MessageKind::VoteUpdate
            ) && field_matches(filter.region.as_deref(), message.region())
        }
        SubscriptionKind::Statistics => message.kind == MessageKind::StatisticsUpdate,
    }
}

/// An unset or empty subscription field accepts anything; a set one must equal
/// the message's routing field.
fn field_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted {
        None | Some("") => true,
        Some(w) => actual == Some(w),
    }
}
