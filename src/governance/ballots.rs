use tracing::debug;

use super::permissions::Capability;
use super::tally::choice_allowed;
use super::GovernanceEngine;
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::governance::{ProposalStatus, Vote, VoteAck, VoteChoice, MAX_VOTE_COMMENT_LEN};
use crate::models::ProposalId;
use crate::ports::AuditEvent;

impl GovernanceEngine {
    /// Records `user_id`'s ballot, replacing any earlier one on the same
    /// proposal.
    ///
    /// The write carries the proposal version seen here; if an edit reset the
    /// ballots in between, the vote is refused with a concurrency conflict
    /// instead of landing in a window it was not validated against.
    pub async fn cast_vote(
        &self,
        proposal_id: ProposalId,
        user_id: &str,
        choice: VoteChoice,
        comment: Option<String>,
    ) -> GovernanceResult<VoteAck> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, user_id).await?;
        if proposal.status != ProposalStatus::Open {
            return Err(GovernanceError::invalid_state(format!(
                "cannot vote on a {} proposal",
                proposal.status
            )));
        }
        let now = self.clock.now();
        if !proposal.window_admits(now) {
            return Err(GovernanceError::invalid_state(format!(
                "voting on proposal {proposal_id} has ended"
            )));
        }
        Self::require(&context, Capability::Vote, &settings, user_id)?;

        if !choice_allowed(proposal.proposal_type, choice) {
            return Err(GovernanceError::validation(format!(
                "{choice} is not allowed on {} proposals",
                proposal.proposal_type
            )));
        }
        let comment = comment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if let Some(text) = &comment {
            if text.chars().count() > MAX_VOTE_COMMENT_LEN {
                return Err(GovernanceError::validation(format!(
                    "vote comment exceeds {MAX_VOTE_COMMENT_LEN} characters"
                )));
            }
        }

        let vote = Vote {
            proposal_id,
            user_id: user_id.to_string(),
            choice,
            comment,
            voted_at: now,
        };
        let written = self.store.upsert_vote(&vote, proposal.version).await?;
        debug!(
            proposal_id,
            user_id,
            %choice,
            replaced = written.replaced,
            "ballot recorded"
        );
        self.audit(AuditEvent::VoteCast {
            proposal_id,
            actor_id: user_id.to_string(),
            choice,
        })
        .await;

        Ok(VoteAck {
            proposal_id,
            user_id: written.vote.user_id,
            choice: written.vote.choice,
            voted_at: written.vote.voted_at,
            replaced_previous: written.replaced,
        })
    }
}
