use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BallotReset, GovernanceStore, Settlement, VoteWrite};
use crate::error::StoreError;
use crate::models::governance::{NewProposal, Proposal, ProposalStatus, Vote};
use crate::models::nomination::{
    FounderNomination, NewNomination, NominationStatus, NominationVote,
};
use crate::models::{NominationId, ProposalId, UserId};

/// Process-local store. One lock guards everything, which makes every
/// operation trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_proposal_id: ProposalId,
    proposals: BTreeMap<ProposalId, Proposal>,
    votes: BTreeMap<ProposalId, BTreeMap<UserId, Vote>>,
    last_nomination_id: NominationId,
    nominations: BTreeMap<NominationId, FounderNomination>,
    nomination_votes: BTreeMap<NominationId, BTreeMap<UserId, NominationVote>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn proposal_at(&self, id: ProposalId, expected_version: i64) -> Result<&Proposal, StoreError> {
        let current = self.proposals.get(&id).ok_or(StoreError::Missing {
            entity: "proposal",
            id,
        })?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: "proposal",
                id,
                expected: expected_version,
            });
        }
        Ok(current)
    }

    fn commit_proposal(
        &mut self,
        next: &Proposal,
        expected_version: i64,
    ) -> Result<Proposal, StoreError> {
        self.proposal_at(next.id, expected_version)?;
        let mut stored = next.clone();
        stored.version = expected_version + 1;
        self.proposals.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn ballots(&self, proposal_id: ProposalId) -> Vec<Vote> {
        let mut votes: Vec<Vote> = self
            .votes
            .get(&proposal_id)
            .map(|ballots| ballots.values().cloned().collect())
            .unwrap_or_default();
        votes.sort_by(|a, b| a.voted_at.cmp(&b.voted_at).then_with(|| a.user_id.cmp(&b.user_id)));
        votes
    }

    fn commit_nomination(
        &mut self,
        next: &FounderNomination,
        expected_version: i64,
    ) -> Result<FounderNomination, StoreError> {
        let current = self.nominations.get(&next.id).ok_or(StoreError::Missing {
            entity: "nomination",
            id: next.id,
        })?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: "nomination",
                id: next.id,
                expected: expected_version,
            });
        }
        let mut stored = next.clone();
        stored.version = expected_version + 1;
        self.nominations.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl GovernanceStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_proposal(&self, proposal: NewProposal) -> Result<Proposal, StoreError> {
        let mut state = self.state.lock().await;
        state.last_proposal_id += 1;
        let stored = Proposal {
            id: state.last_proposal_id,
            band_id: proposal.band_id,
            created_by_id: proposal.created_by_id,
            proposal_type: proposal.proposal_type,
            priority: proposal.priority,
            status: ProposalStatus::Draft,
            content: proposal.content,
            submission_count: 0,
            edit_count: 0,
            version: 1,
            voting_started_at: None,
            voting_ends_at: None,
            closed_at: None,
            rejection_reason: None,
            reviewed_by_id: None,
            reviewed_at: None,
            last_edit_reason: None,
            final_tally: None,
            integrity_overrides: proposal.integrity_overrides,
            created_at: proposal.created_at,
            updated_at: proposal.created_at,
        };
        state.proposals.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_proposal(&self, id: ProposalId) -> Result<Option<Proposal>, StoreError> {
        Ok(self.state.lock().await.proposals.get(&id).cloned())
    }

    async fn save_proposal(
        &self,
        next: &Proposal,
        expected_version: i64,
    ) -> Result<Proposal, StoreError> {
        self.state.lock().await.commit_proposal(next, expected_version)
    }

    async fn reset_ballots(
        &self,
        next: &Proposal,
        expected_version: i64,
    ) -> Result<BallotReset, StoreError> {
        let mut state = self.state.lock().await;
        state.proposal_at(next.id, expected_version)?;
        let cleared_voters = state
            .votes
            .remove(&next.id)
            .map(|ballots| ballots.into_keys().collect())
            .unwrap_or_default();
        let proposal = state.commit_proposal(next, expected_version)?;
        Ok(BallotReset {
            proposal,
            cleared_voters,
        })
    }

    async fn upsert_vote(
        &self,
        vote: &Vote,
        expected_version: i64,
    ) -> Result<VoteWrite, StoreError> {
        let mut state = self.state.lock().await;
        state.proposal_at(vote.proposal_id, expected_version)?;
        let previous = state
            .votes
            .entry(vote.proposal_id)
            .or_default()
            .insert(vote.user_id.clone(), vote.clone());
        Ok(VoteWrite {
            vote: vote.clone(),
            replaced: previous.is_some(),
        })
    }

    async fn list_votes(&self, proposal_id: ProposalId) -> Result<Vec<Vote>, StoreError> {
        Ok(self.state.lock().await.ballots(proposal_id))
    }

    async fn settle_proposal(
        &self,
        proposal_id: ProposalId,
        expected_version: i64,
        settle: &(dyn for<'p> Fn(&'p Proposal, &'p [Vote]) -> Proposal + Send + Sync),
    ) -> Result<Settlement, StoreError> {
        let mut state = self.state.lock().await;
        let current = state.proposal_at(proposal_id, expected_version)?.clone();
        let votes = state.ballots(proposal_id);
        let next = settle(&current, &votes);
        let proposal = state.commit_proposal(&next, expected_version)?;
        Ok(Settlement { proposal, votes })
    }

    async fn insert_nomination(
        &self,
        nomination: NewNomination,
    ) -> Result<FounderNomination, StoreError> {
        let mut state = self.state.lock().await;
        state.last_nomination_id += 1;
        let stored = FounderNomination {
            id: state.last_nomination_id,
            band_id: nomination.band_id,
            nominator_id: nomination.nominator_id,
            nominee_id: nomination.nominee_id,
            reason: nomination.reason,
            status: NominationStatus::Pending,
            version: 1,
            created_at: nomination.created_at,
            decided_at: None,
        };
        state.nominations.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_nomination(
        &self,
        id: NominationId,
    ) -> Result<Option<FounderNomination>, StoreError> {
        Ok(self.state.lock().await.nominations.get(&id).cloned())
    }

    async fn find_pending_nomination(
        &self,
        band_id: &str,
        nominee_id: &str,
    ) -> Result<Option<FounderNomination>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .nominations
            .values()
            .find(|n| {
                n.band_id == band_id
                    && n.nominee_id == nominee_id
                    && n.status == NominationStatus::Pending
            })
            .cloned())
    }

    async fn list_nomination_votes(
        &self,
        nomination_id: NominationId,
    ) -> Result<Vec<NominationVote>, StoreError> {
        let state = self.state.lock().await;
        let mut votes: Vec<NominationVote> = state
            .nomination_votes
            .get(&nomination_id)
            .map(|ballots| ballots.values().cloned().collect())
            .unwrap_or_default();
        votes.sort_by(|a, b| a.voted_at.cmp(&b.voted_at));
        Ok(votes)
    }

    async fn record_nomination_vote(
        &self,
        vote: &NominationVote,
        next: &FounderNomination,
        expected_version: i64,
    ) -> Result<FounderNomination, StoreError> {
        let mut state = self.state.lock().await;
        let stored = state.commit_nomination(next, expected_version)?;
        state
            .nomination_votes
            .entry(vote.nomination_id)
            .or_default()
            .insert(vote.founder_id.clone(), vote.clone());
        Ok(stored)
    }

    async fn save_nomination(
        &self,
        next: &FounderNomination,
        expected_version: i64,
    ) -> Result<FounderNomination, StoreError> {
        self.state
            .lock()
            .await
            .commit_nomination(next, expected_version)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::models::governance::{
        ProposalContent, ProposalPriority, ProposalType, VoteChoice,
    };

    fn new_proposal() -> NewProposal {
        NewProposal {
            band_id: "band-1".into(),
            created_by_id: "alice".into(),
            proposal_type: ProposalType::General,
            priority: ProposalPriority::Medium,
            content: ProposalContent {
                title: "Rehearsal space".into(),
                description: "Rent the basement on Fridays.".into(),
                ..ProposalContent::default()
            },
            integrity_overrides: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn ballot(proposal_id: ProposalId, user: &str, choice: VoteChoice, minute: i64) -> Vote {
        Vote {
            proposal_id,
            user_id: user.into(),
            choice,
            comment: None,
            voted_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    #[tokio::test]
    async fn second_ballot_from_same_member_overwrites_first() {
        let store = MemoryStore::new();
        let proposal = store.insert_proposal(new_proposal()).await.unwrap();

        let first = store
            .upsert_vote(&ballot(proposal.id, "bob", VoteChoice::Yes, 0), proposal.version)
            .await
            .unwrap();
        let second = store
            .upsert_vote(&ballot(proposal.id, "bob", VoteChoice::No, 5), proposal.version)
            .await
            .unwrap();

        assert!(!first.replaced);
        assert!(second.replaced);
        let votes = store.list_votes(proposal.id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].choice, VoteChoice::No);
    }

    #[tokio::test]
    async fn stale_version_is_refused() {
        let store = MemoryStore::new();
        let proposal = store.insert_proposal(new_proposal()).await.unwrap();
        let saved = store.save_proposal(&proposal, proposal.version).await.unwrap();
        assert_eq!(saved.version, proposal.version + 1);

        let err = store
            .save_proposal(&proposal, proposal.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let err = store
            .upsert_vote(&ballot(proposal.id, "bob", VoteChoice::Yes, 0), proposal.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn reset_clears_ballots_and_reports_voters() {
        let store = MemoryStore::new();
        let proposal = store.insert_proposal(new_proposal()).await.unwrap();
        for (user, minute) in [("bob", 0), ("carol", 1)] {
            store
                .upsert_vote(&ballot(proposal.id, user, VoteChoice::Yes, minute), proposal.version)
                .await
                .unwrap();
        }

        let reset = store.reset_ballots(&proposal, proposal.version).await.unwrap();
        assert_eq!(reset.cleared_voters, vec!["bob".to_string(), "carol".to_string()]);
        assert!(store.list_votes(proposal.id).await.unwrap().is_empty());
        assert_eq!(reset.proposal.version, proposal.version + 1);
    }

    #[tokio::test]
    async fn settle_sees_every_ballot() {
        let store = MemoryStore::new();
        let proposal = store.insert_proposal(new_proposal()).await.unwrap();
        store
            .upsert_vote(&ballot(proposal.id, "bob", VoteChoice::No, 0), proposal.version)
            .await
            .unwrap();

        let settlement = store
            .settle_proposal(proposal.id, proposal.version, &|current, votes| {
                let mut next = current.clone();
                next.status = if votes.is_empty() {
                    ProposalStatus::Approved
                } else {
                    ProposalStatus::Rejected
                };
                next
            })
            .await
            .unwrap();

        assert_eq!(settlement.votes.len(), 1);
        assert_eq!(settlement.proposal.status, ProposalStatus::Rejected);
    }

    #[tokio::test]
    async fn settle_closure_may_borrow_caller_state() {
        let store = MemoryStore::new();
        let proposal = store.insert_proposal(new_proposal()).await.unwrap();
        let verdict = ProposalStatus::Approved;
        let verdict_ref = &verdict;

        let settlement = store
            .settle_proposal(proposal.id, proposal.version, &|current, _votes| {
                let mut next = current.clone();
                next.status = *verdict_ref;
                next
            })
            .await
            .unwrap();

        assert_eq!(settlement.proposal.status, ProposalStatus::Approved);
        assert_eq!(settlement.proposal.version, proposal.version + 1);
    }

    #[tokio::test]
    async fn missing_proposal_is_reported() {
        let store = MemoryStore::new();
        let err = store
            .settle_proposal(42, 1, &|current, _| current.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { id: 42, .. }));
    }
}
