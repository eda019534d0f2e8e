// src/core/repository.rs

//! Read access to processed votes and their aggregates.
//!
//! The live results service only needs the handful of queries declared on
//! `ResultRepository`; the in-memory implementation below backs the binary
//! and the tests.

use crate::core::LiveResultError;
use crate::core::model::{
    ElectionResult, RegionResult, Tally, VoteResult, VoteStatistics,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Source of vote results and aggregates for live broadcasts.
#[async_trait]
pub trait ResultRepository: Send + Sync + 'static {
    /// Looks up a vote by its `vote_id`.
    async fn get_vote_result(&self, vote_id: Uuid) -> Result<VoteResult, LiveResultError>;

    async fn get_election_results(
        &self,
        election_pair_id: &str,
    ) -> Result<ElectionResult, LiveResultError>;

    async fn get_region_results(&self, region: &str) -> Result<RegionResult, LiveResultError>;

    /// Totals across every vote. An empty store yields all-zero statistics.
    async fn get_overall_statistics(&self) -> Result<VoteStatistics, LiveResultError>;

    /// Stores a processed vote, replacing any previous result for the same `vote_id`.
    async fn insert_vote_result(&self, vote: VoteResult) -> Result<(), LiveResultError>;
}

/// A `ResultRepository` that keeps every vote in a concurrent map keyed by `vote_id`.
#[derive(Debug, Default)]
pub struct InMemoryResultRepository {
    votes: DashMap<Uuid, VoteResult>,
}

impl InMemoryResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Folds every vote accepted by `include` into a tally. Also returns the
    /// latest `updated_at` and the region of the vote carrying it.
    fn aggregate(
        &self,
        include: impl Fn(&VoteResult) -> bool,
    ) -> Option<(Tally, DateTime<Utc>, String)> {
        let mut tally = Tally::default();
        let mut latest: Option<(DateTime<Utc>, String)> = None;
        for entry in self.votes.iter() {
            let vote = entry.value();
            if !include(vote) {
                continue;
            }
            tally.add(vote.status);
            if latest.as_ref().is_none_or(|(at, _)| vote.updated_at > *at) {
                latest = Some((vote.updated_at, vote.region.clone()));
            }
        }
        latest.map(|(at, region)| (tally, at, region))
    }
}

#[async_trait]
impl ResultRepository for InMemoryResultRepository {
    async fn get_vote_result(&self, vote_id: Uuid) -> Result<VoteResult, LiveResultError> {
        self.votes
            .get(&vote_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LiveResultError::not_found("vote result", vote_id.to_string()))
    }

    async fn get_election_results(
        &self,
        election_pair_id: &str,
    ) -> Result<ElectionResult, LiveResultError> {
        let (tally, last_updated, region) = self
            .aggregate(|v| v.election_pair_id == election_pair_id)
            .ok_or_else(|| LiveResultError::not_found("election pair", election_pair_id))?;
        Ok(ElectionResult {
            election_pair_id: election_pair_id.to_string(),
            region,
            total_votes: tally.total,
            confirmed_votes: tally.confirmed,
            pending_votes: tally.pending,
            error_votes: tally.error,
            last_updated,
        })
    }

    async fn get_region_results(&self, region: &str) -> Result<RegionResult, LiveResultError> {
        let (tally, last_updated, _) = self
            .aggregate(|v| v.region == region)
            .ok_or_else(|| LiveResultError::not_found("region", region))?;
        Ok(RegionResult {
            region: region.to_string(),
            total_votes: tally.total,
            confirmed_votes: tally.confirmed,
            pending_votes: tally.pending,
            error_votes: tally.error,
            last_updated,
        })
    }

    async fn get_overall_statistics(&self) -> Result<VoteStatistics, LiveResultError> {
        let (tally, last_updated) = match self.aggregate(|_| true) {
            Some((tally, at, _)) => (tally, at),
            None => (Tally::default(), Utc::now()),
        };
        let mut stats = VoteStatistics {
            total_votes: tally.total,
            confirmed_votes: tally.confirmed,
            pending_votes: tally.pending,
            error_votes: tally.error,
            success_rate: 0.0,
            last_updated,
        };
        stats.calculate_success_rate();
        Ok(stats)
    }

    async fn insert_vote_result(&self, vote: VoteResult) -> Result<(), LiveResultError> {
        if vote.election_pair_id.is_empty() {
            return Err(LiveResultError::InvalidRequest(
                "vote result has an empty election_pair_id".into(),
            ));
        }
        self.votes.insert(vote.vote_id, vote);
        Ok(())
    }
}
