// tests/integration/fixtures.rs

//! Common test fixtures and data generators
//!
//! Fixtures provide reusable vote data so tests agree on election pairs and
//! regions without repeating the full `VoteResult` literal.

use chrono::{Duration, Utc};
use liveresult::core::model::{VoteResult, VoteStatus};
use uuid::Uuid;

pub const ELECTION_PAIR_A: &str = "pair-01";
pub const ELECTION_PAIR_B: &str = "pair-02";
pub const REGION_BANDUNG: &str = "Bandung";
pub const REGION_JAKARTA: &str = "Jakarta";

/// A processed vote with fresh ids, updated `age_secs` seconds ago.
pub fn vote_aged(pair: &str, region: &str, status: VoteStatus, age_secs: i64) -> VoteResult {
    let at = Utc::now() - Duration::seconds(age_secs);
    VoteResult {
        id: Uuid::new_v4(),
        vote_id: Uuid::new_v4(),
        voter_id: format!("voter-{}", Uuid::new_v4().simple()),
        election_pair_id: pair.to_string(),
        region: region.to_string(),
        status,
        transaction_hash: format!("0x{}", Uuid::new_v4().simple()),
        error_message: None,
        voted_at: at,
        processed_at: Some(at),
        created_at: at,
        updated_at: at,
    }
}

/// A confirmed vote updated just now.
pub fn vote(pair: &str, region: &str) -> VoteResult {
    vote_aged(pair, region, VoteStatus::Confirmed, 0)
}
