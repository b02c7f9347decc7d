//! Founder nominations: every current founder must vote YES, and a single NO
//! rejects the nomination for good.
//!
//! The founder set is read from the membership oracle on every evaluation, so
//! a founder who leaves stops blocking and one who joins must also vote.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::{require_reason, GovernanceEngine};
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::governance::VoteChoice;
use crate::models::membership::{MemberRole, Membership};
use crate::models::nomination::{
    FounderNomination, NewNomination, NominationAck, NominationStatus, NominationVote,
};
use crate::models::{NominationId, UserId};
use crate::ports::AuditEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NominationOutcome {
    Pending,
    Approved,
    Rejected { by: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NominationTally {
    pub outcome: NominationOutcome,
    pub yes_votes: u32,
    /// Current founders without a YES on record.
    pub outstanding: Vec<UserId>,
}

/// Evaluates `votes` against the current `founders`. Ballots of members who
/// are no longer founders are ignored; ABSTAIN counts as undecided.
pub fn evaluate_nomination(votes: &[NominationVote], founders: &[UserId]) -> NominationTally {
    let ballots: BTreeMap<&str, VoteChoice> = votes
        .iter()
        .map(|vote| (vote.founder_id.as_str(), vote.choice))
        .collect();

    let mut yes_votes = 0;
    let mut outstanding = Vec::new();
    let mut rejected_by = None;
    for founder in founders {
        match ballots.get(founder.as_str()) {
            Some(VoteChoice::Yes) => yes_votes += 1,
            Some(VoteChoice::No) => {
                rejected_by.get_or_insert_with(|| founder.clone());
                outstanding.push(founder.clone());
            }
            Some(VoteChoice::Abstain) | None => outstanding.push(founder.clone()),
        }
    }

    let outcome = match rejected_by {
        Some(by) => NominationOutcome::Rejected { by },
        None if !founders.is_empty() && outstanding.is_empty() => NominationOutcome::Approved,
        None => NominationOutcome::Pending,
    };
    NominationTally {
        outcome,
        yes_votes,
        outstanding,
    }
}

fn is_active_founder(membership: &Membership) -> bool {
    membership.is_active() && membership.role == MemberRole::Founder
}

impl GovernanceEngine {
    pub async fn get_nomination(
        &self,
        nomination_id: NominationId,
    ) -> GovernanceResult<FounderNomination> {
        self.store
            .find_nomination(nomination_id)
            .await?
            .ok_or_else(|| GovernanceError::not_found(format!("nomination {nomination_id}")))
    }

    /// Opens a nomination of `nominee_id` for co-founder. The nominator does
    /// not vote implicitly.
    pub async fn nominate_as_founder(
        &self,
        band_id: &str,
        nominator_id: &str,
        nominee_id: &str,
        reason: &str,
    ) -> GovernanceResult<FounderNomination> {
        self.band_settings(band_id).await?;
        let nominator = self.member(band_id, nominator_id).await?;
        if !is_active_founder(&nominator) {
            return Err(GovernanceError::permission(format!(
                "{nominator_id} is not a founder of band {band_id}"
            )));
        }
        if nominee_id == nominator_id {
            return Err(GovernanceError::validation(
                "a founder cannot nominate themselves",
            ));
        }
        let nominee = self
            .membership
            .membership(band_id, nominee_id)
            .await?
            .ok_or_else(|| {
                GovernanceError::not_found(format!("member {nominee_id} of band {band_id}"))
            })?;
        if nominee.role == MemberRole::Founder {
            return Err(GovernanceError::validation(format!(
                "{nominee_id} is already a founder"
            )));
        }
        if !nominee.is_active() {
            return Err(GovernanceError::validation(format!(
                "{nominee_id} is not an active member"
            )));
        }
        let reason = require_reason("nomination reason", Some(reason))?;

        if let Some(existing) = self
            .store
            .find_pending_nomination(band_id, nominee_id)
            .await?
        {
            return Err(GovernanceError::invalid_state(format!(
                "nomination {} for {nominee_id} is still pending",
                existing.id
            )));
        }

        let nomination = self
            .store
            .insert_nomination(NewNomination {
                band_id: band_id.to_string(),
                nominator_id: nominator_id.to_string(),
                nominee_id: nominee_id.to_string(),
                reason,
                created_at: self.clock.now(),
            })
            .await?;

        info!(
            nomination_id = nomination.id,
            band_id,
            user_id = nominator_id,
            nominee_id,
            "founder nomination opened"
        );
        self.audit(AuditEvent::NominationCreated {
            nomination_id: nomination.id,
            actor_id: nominator_id.to_string(),
            nominee_id: nominee_id.to_string(),
        })
        .await;
        Ok(nomination)
    }

    pub async fn vote_on_nomination(
        &self,
        nomination_id: NominationId,
        founder_id: &str,
        choice: VoteChoice,
    ) -> GovernanceResult<NominationAck> {
        let nomination = self.get_nomination(nomination_id).await?;
        let membership = self.member(&nomination.band_id, founder_id).await?;
        if nomination.status.is_decided() {
            return Err(GovernanceError::invalid_state(format!(
                "nomination {nomination_id} is already {}",
                nomination.status
            )));
        }
        if founder_id == nomination.nominee_id {
            return Err(GovernanceError::permission(
                "nominees cannot vote on their own nomination",
            ));
        }
        if !is_active_founder(&membership) {
            return Err(GovernanceError::permission(format!(
                "{founder_id} is not a founder of band {}",
                nomination.band_id
            )));
        }

        let founders = self.membership.founders(&nomination.band_id).await?;
        let now = self.clock.now();
        let vote = NominationVote {
            nomination_id,
            founder_id: founder_id.to_string(),
            choice,
            voted_at: now,
        };
        let mut votes = self.store.list_nomination_votes(nomination_id).await?;
        votes.retain(|existing| existing.founder_id != founder_id);
        votes.push(vote.clone());

        let tally = evaluate_nomination(&votes, &founders);
        let next = decide(&nomination, &tally.outcome, now);
        let saved = self
            .store
            .record_nomination_vote(&vote, &next, nomination.version)
            .await?;

        info!(
            nomination_id,
            user_id = founder_id,
            %choice,
            yes_votes = tally.yes_votes,
            founders = founders.len(),
            status = %saved.status,
            "nomination ballot recorded"
        );
        self.audit(AuditEvent::NominationVoteCast {
            nomination_id,
            actor_id: founder_id.to_string(),
            choice,
        })
        .await;
        if saved.status.is_decided() {
            self.announce_decision(&saved, founder_id).await;
        }

        Ok(acknowledge(&saved, &tally, &founders))
    }

    /// Re-evaluates a pending nomination against the current founder set.
    /// Writes only when the outcome is no longer pending.
    pub async fn finalize_nomination(
        &self,
        nomination_id: NominationId,
        user_id: &str,
    ) -> GovernanceResult<NominationAck> {
        let nomination = self.get_nomination(nomination_id).await?;
        let membership = self.member(&nomination.band_id, user_id).await?;
        if nomination.status.is_decided() {
            return Err(GovernanceError::invalid_state(format!(
                "nomination {nomination_id} is already {}",
                nomination.status
            )));
        }
        if !is_active_founder(&membership) {
            return Err(GovernanceError::permission(format!(
                "{user_id} is not a founder of band {}",
                nomination.band_id
            )));
        }

        let founders = self.membership.founders(&nomination.band_id).await?;
        let votes = self.store.list_nomination_votes(nomination_id).await?;
        let tally = evaluate_nomination(&votes, &founders);
        if tally.outcome == NominationOutcome::Pending {
            return Ok(acknowledge(&nomination, &tally, &founders));
        }

        let next = decide(&nomination, &tally.outcome, self.clock.now());
        let saved = self
            .store
            .save_nomination(&next, nomination.version)
            .await?;
        self.announce_decision(&saved, user_id).await;
        Ok(acknowledge(&saved, &tally, &founders))
    }

    pub async fn withdraw_nomination(
        &self,
        nomination_id: NominationId,
        user_id: &str,
    ) -> GovernanceResult<FounderNomination> {
        let nomination = self.get_nomination(nomination_id).await?;
        self.member(&nomination.band_id, user_id).await?;
        if nomination.status.is_decided() {
            return Err(GovernanceError::invalid_state(format!(
                "nomination {nomination_id} is already {}",
                nomination.status
            )));
        }
        if nomination.nominator_id != user_id {
            return Err(GovernanceError::permission(
                "only the nominator may withdraw a nomination",
            ));
        }

        let mut next = nomination.clone();
        next.status = NominationStatus::Withdrawn;
        next.decided_at = Some(self.clock.now());
        let saved = self
            .store
            .save_nomination(&next, nomination.version)
            .await?;
        self.announce_decision(&saved, user_id).await;
        Ok(saved)
    }

    async fn announce_decision(&self, nomination: &FounderNomination, actor_id: &str) {
        info!(
            nomination_id = nomination.id,
            nominee_id = %nomination.nominee_id,
            status = %nomination.status,
            "founder nomination decided"
        );
        if let Err(err) = self.notifier.nomination_decided(nomination).await {
            warn!(nomination_id = nomination.id, "Nomination notification failed: {err}");
        }
        self.audit(AuditEvent::NominationDecided {
            nomination_id: nomination.id,
            actor_id: actor_id.to_string(),
            status: nomination.status,
        })
        .await;
    }
}

fn decide(
    nomination: &FounderNomination,
    outcome: &NominationOutcome,
    now: chrono::DateTime<chrono::Utc>,
) -> FounderNomination {
    let mut next = nomination.clone();
    next.status = match outcome {
        NominationOutcome::Pending => NominationStatus::Pending,
        NominationOutcome::Approved => NominationStatus::Approved,
        NominationOutcome::Rejected { .. } => NominationStatus::Rejected,
    };
    if next.status.is_decided() {
        next.decided_at = Some(now);
    }
    next
}

fn acknowledge(
    nomination: &FounderNomination,
    tally: &NominationTally,
    founders: &[UserId],
) -> NominationAck {
    NominationAck {
        nomination_id: nomination.id,
        status: nomination.status,
        yes_votes: tally.yes_votes,
        founders_required: u32::try_from(founders.len()).unwrap_or(u32::MAX),
        outstanding: tally.outstanding.clone(),
    }
}
