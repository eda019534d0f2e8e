// src/core/model.rs

//! Domain payloads carried by live updates: a single processed vote and the
//! aggregates computed over many of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Processing status of a vote as reported by the ingestion pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    Pending,
    Confirmed,
    Rejected,
    Error,
    Queued,
    Retrying,
}

impl VoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteStatus::Pending => "pending",
            VoteStatus::Confirmed => "confirmed",
            VoteStatus::Rejected => "rejected",
            VoteStatus::Error => "error",
            VoteStatus::Queued => "queued",
            VoteStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single processed vote.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VoteResult {
    pub id: Uuid,
    pub vote_id: Uuid,
    pub voter_id: String,
    pub election_pair_id: String,
    pub region: String,
    pub status: VoteStatus,
    pub transaction_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub voted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated tally for one election pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionResult {
    pub election_pair_id: String,
    pub region: String,
    pub total_votes: u64,
    pub confirmed_votes: u64,
    pub pending_votes: u64,
    pub error_votes: u64,
    pub last_updated: DateTime<Utc>,
}

/// Aggregated tally for one region.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegionResult {
    pub region: String,
    pub total_votes: u64,
    pub confirmed_votes: u64,
    pub pending_votes: u64,
    pub error_votes: u64,
    pub last_updated: DateTime<Utc>,
}

/// Tally across every vote in the system.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VoteStatistics {
    pub total_votes: u64,
    pub confirmed_votes: u64,
    pub pending_votes: u64,
    pub error_votes: u64,
    pub success_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl VoteStatistics {
    /// Percentage of confirmed votes over all votes, `0` when there are none.
    pub fn calculate_success_rate(&mut self) {
        self.success_rate = if self.total_votes > 0 {
            self.confirmed_votes as f64 / self.total_votes as f64 * 100.0
        } else {
            0.0
        };
    }
}

/// Running counters shared by every aggregate shape.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Tally {
    pub total: u64,
    pub confirmed: u64,
    pub pending: u64,
    pub error: u64,
}

impl Tally {
    /// Only `confirmed`, `pending` and `error` have their own bucket; every vote
    /// counts towards the total.
    pub fn add(&mut self, status: VoteStatus) {
        self.total += 1;
        match status {
            VoteStatus::Confirmed => self.confirmed += 1,
            VoteStatus::Pending => self.pending += 1,
            VoteStatus::Error => self.error += 1,
            _ => {}
        }
    }
}
