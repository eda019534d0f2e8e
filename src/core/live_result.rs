// src/core/live_result.rs

//! The use-case layer between result queries and the hub: fetch an aggregate,
//! hand it to the hub, log what happened.

use crate::core::LiveResultError;
use crate::core::hub::Hub;
use crate::core::model::VoteResult;
use crate::core::repository::ResultRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Publishes live result updates to connected clients.
#[derive(Clone)]
pub struct LiveResultService {
    repository: Arc<dyn ResultRepository>,
    hub: Hub,
}

impl LiveResultService {
    pub fn new(repository: Arc<dyn ResultRepository>, hub: Hub) -> Self {
        Self { repository, hub }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn repository(&self) -> &Arc<dyn ResultRepository> {
        &self.repository
    }

    pub async fn broadcast_vote_update(&self, vote_id: Uuid) -> Result<(), LiveResultError> {
        let vote = self.repository.get_vote_result(vote_id).await?;
        self.hub.broadcast_vote_update(&vote);
        info!(
            vote_id = %vote_id,
            election_pair_id = %vote.election_pair_id,
            region = %vote.region,
            connected_clients = self.hub.client_count(),
            "Broadcasted vote update."
        );
        Ok(())
    }

    pub async fn broadcast_election_update(
        &self,
        election_pair_id: &str,
    ) -> Result<(), LiveResultError> {
        let result = self.repository.get_election_results(election_pair_id).await?;
        self.hub.broadcast_election_update(&result);
        info!(
            election_pair_id,
            total_votes = result.total_votes,
            connected_clients = self.hub.client_count(),
            "Broadcasted election update."
        );
        Ok(())
    }

    pub async fn broadcast_region_update(&self, region: &str) -> Result<(), LiveResultError> {
        let result = self.repository.get_region_results(region).await?;
        self.hub.broadcast_region_update(&result);
        info!(
            region,
            total_votes = result.total_votes,
            connected_clients = self.hub.client_count(),
            "Broadcasted region update."
        );
        Ok(())
    }

    pub async fn broadcast_statistics_update(&self) -> Result<(), LiveResultError> {
        let mut stats = self.repository.get_overall_statistics().await?;
        stats.calculate_success_rate();
        self.hub.broadcast_statistics_update(&stats);
        info!(
            total_votes = stats.total_votes,
            success_rate = stats.success_rate,
            connected_clients = self.hub.client_count(),
            "Broadcasted statistics update."
        );
        Ok(())
    }

    /// Broadcasts the election aggregate when `election_pair_id` is set, the
    /// region aggregate when `region` is set, and statistics always. A failing
    /// step is logged and does not stop the others.
    pub async fn broadcast_all_updates(
        &self,
        election_pair_id: Option<&str>,
        region: Option<&str>,
    ) -> Result<(), LiveResultError> {
        if let Some(pair) = election_pair_id.filter(|p| !p.is_empty()) {
            if let Err(e) = self.broadcast_election_update(pair).await {
                error!(election_pair_id = pair, "Failed to broadcast election update: {}", e);
            }
        }
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            if let Err(e) = self.broadcast_region_update(region).await {
                error!(region, "Failed to broadcast region update: {}", e);
            }
        }
        if let Err(e) = self.broadcast_statistics_update().await {
            error!("Failed to broadcast statistics update: {}", e);
        }
        Ok(())
    }

    pub fn get_connected_clients(&self) -> usize {
        self.hub.client_count()
    }

    /// Stores a processed vote and pushes every update it affects.
    pub async fn ingest_vote(&self, vote: VoteResult) -> Result<(), LiveResultError> {
        let vote_id = vote.vote_id;
        let pair = vote.election_pair_id.clone();
        let region = vote.region.clone();
        self.repository.insert_vote_result(vote).await?;
        self.broadcast_vote_update(vote_id).await?;
        self.broadcast_all_updates(Some(&pair), Some(&region)).await
    }

    /// Broadcasts statistics every `interval` while at least one client is
    /// connected, until `shutdown_rx` fires.
    pub async fn start_periodic_broadcast(
        &self,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        if interval.is_zero() {
            info!("Periodic statistics broadcast disabled.");
            return;
        }
        info!("Periodic statistics broadcast running every {:?}.", interval);
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Periodic statistics broadcast shutting down.");
                    return;
                }
                _ = ticker.tick() => {
                    if self.hub.client_count() == 0 {
                        debug!("No connected clients; skipping periodic statistics broadcast.");
                        continue;
                    }
                    if let Err(e) = self.broadcast_statistics_update().await {
                        error!("Periodic statistics broadcast failed: {}", e);
                    }
                }
            }
        }
    }
}
