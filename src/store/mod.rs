//! Persistence contract for proposals, ballots and founder nominations.
//!
//! Every write that replaces a proposal or nomination carries the version the
//! caller read. Implementations must apply the write only if the stored
//! version still matches, bump it by one, and report
//! [`StoreError::VersionConflict`] otherwise. Multi-row writes (ballot reset,
//! settlement, nomination votes) are atomic.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::governance::{NewProposal, Proposal, Vote};
use crate::models::nomination::{FounderNomination, NewNomination, NominationVote};
use crate::models::{NominationId, ProposalId, UserId};

mod database;
mod memory;

pub use database::DatabaseStore;
pub use memory::MemoryStore;

/// Outcome of wiping the ballots of an open proposal.
#[derive(Debug, Clone)]
pub struct BallotReset {
    pub proposal: Proposal,
    /// Members whose votes were deleted.
    pub cleared_voters: Vec<UserId>,
}

#[derive(Debug, Clone)]
pub struct VoteWrite {
    pub vote: Vote,
    pub replaced: bool,
}

/// Proposal and ballots as seen by the settling write.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub proposal: Proposal,
    pub votes: Vec<Vote>,
}

#[async_trait]
pub trait GovernanceStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_proposal(&self, proposal: NewProposal) -> Result<Proposal, StoreError>;

    async fn find_proposal(&self, id: ProposalId) -> Result<Option<Proposal>, StoreError>;

    /// Replaces the proposal row with `next`.
    async fn save_proposal(
        &self,
        next: &Proposal,
        expected_version: i64,
    ) -> Result<Proposal, StoreError>;

    /// Deletes every ballot of the proposal and replaces the row with `next`
    /// in one transaction.
    async fn reset_ballots(
        &self,
        next: &Proposal,
        expected_version: i64,
    ) -> Result<BallotReset, StoreError>;

    /// Inserts or overwrites the single ballot of `(vote.proposal_id,
    /// vote.user_id)`. The proposal version is checked but not bumped, so
    /// ballots from different members do not contend with each other.
    async fn upsert_vote(&self, vote: &Vote, expected_version: i64)
    -> Result<VoteWrite, StoreError>;

    async fn list_votes(&self, proposal_id: ProposalId) -> Result<Vec<Vote>, StoreError>;

    /// Locks the proposal, reads its ballots, and stores whatever `settle`
    /// derives from them. No ballot can land between the read and the write.
    async fn settle_proposal(
        &self,
        proposal_id: ProposalId,
        expected_version: i64,
        settle: &(dyn for<'p> Fn(&'p Proposal, &'p [Vote]) -> Proposal + Send + Sync),
    ) -> Result<Settlement, StoreError>;

    async fn insert_nomination(
        &self,
        nomination: NewNomination,
    ) -> Result<FounderNomination, StoreError>;

    async fn find_nomination(
        &self,
        id: NominationId,
    ) -> Result<Option<FounderNomination>, StoreError>;

    async fn find_pending_nomination(
        &self,
        band_id: &str,
        nominee_id: &str,
    ) -> Result<Option<FounderNomination>, StoreError>;

    async fn list_nomination_votes(
        &self,
        nomination_id: NominationId,
    ) -> Result<Vec<NominationVote>, StoreError>;

    /// Upserts the founder's ballot and replaces the nomination row with
    /// `next` in one transaction.
    async fn record_nomination_vote(
        &self,
        vote: &NominationVote,
        next: &FounderNomination,
        expected_version: i64,
    ) -> Result<FounderNomination, StoreError>;

    async fn save_nomination(
        &self,
        next: &FounderNomination,
        expected_version: i64,
    ) -> Result<FounderNomination, StoreError>;
}
