use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::ops::compute::Op;

use crate::config::CacheConfig;
use crate::governance::GovernanceEngine;
use crate::models::governance::Proposal;
use crate::models::ProposalId;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GovernanceEngine>,
    pub cache: Arc<ApiCache>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Arc<GovernanceEngine>, cache: Arc<ApiCache>) -> Self {
        assert!(
            cache.proposal_capacity >= 16,
            "Proposal cache capacity must be configured"
        );
        Self {
            engine,
            cache,
            start_time: Instant::now(),
        }
    }
}

/// Read-side cache of proposal views. Every mutation through the HTTP layer
/// invalidates the affected entry.
pub struct ApiCache {
    pub proposals: Cache<ProposalId, Arc<Proposal>>,
    pub proposal_capacity: u64,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.proposals_max_capacity >= 16,
            "Proposal cache capacity threshold"
        );

        let proposals = Cache::builder()
            .max_capacity(config.proposals_max_capacity)
            .time_to_live(config.proposals_ttl())
            .time_to_idle(config.proposals_ttl() / 2 + Duration::from_secs(1))
            .build();

        Self {
            proposals,
            proposal_capacity: config.proposals_max_capacity,
        }
    }

    /// Caches `proposal` unless a newer version is already cached.
    pub async fn remember(&self, proposal: &Proposal) {
        let fresh = Arc::new(proposal.clone());
        let _ = self
            .proposals
            .entry(proposal.id)
            .and_compute_with(|cached| async move {
                match cached {
                    Some(entry) if entry.value().version > fresh.version => Op::Nop,
                    _ => Op::Put(fresh),
                }
            })
            .await;
    }

    pub async fn forget(&self, proposal_id: ProposalId) {
        self.proposals.invalidate(&proposal_id).await;
    }
}
