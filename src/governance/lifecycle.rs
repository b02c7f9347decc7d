//! Proposal state machine.
//!
//! ```text
//! DRAFT | REJECTED | WITHDRAWN  --submit-->   PENDING_REVIEW (review gate) or OPEN
//! PENDING_REVIEW                --approve-->  OPEN
//! PENDING_REVIEW                --reject-->   REJECTED
//! PENDING_REVIEW                --withdraw--> WITHDRAWN
//! OPEN                          --close-->    APPROVED or REJECTED
//! APPROVED | REJECTED           --archive-->  CLOSED
//! ```

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use super::permissions::{Capability, PermissionContext};
use super::resubmission::check_resubmission;
use super::tally::{compute_verdict, Tally};
use super::{require_reason, GovernanceEngine};
use crate::error::{GovernanceError, GovernanceResult, StoreError};
use crate::models::governance::{NewProposal, Proposal, ProposalDraft, ProposalStatus, Vote};
use crate::models::integrity::{IntegrityAck, IntegrityAction};
use crate::models::ProposalId;
use crate::ports::AuditEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Submit,
    Approve,
    Reject,
    Withdraw,
    Close { passed: bool },
    Archive,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            LifecycleEvent::Submit => "submit",
            LifecycleEvent::Approve => "approve",
            LifecycleEvent::Reject => "reject",
            LifecycleEvent::Withdraw => "withdraw",
            LifecycleEvent::Close { .. } => "close",
            LifecycleEvent::Archive => "archive",
        };
        f.write_str(verb)
    }
}

/// Every edge of the state graph. Voting and editing never change status.
pub const EDGES: &[(ProposalStatus, ProposalStatus)] = &[
    (ProposalStatus::Draft, ProposalStatus::PendingReview),
    (ProposalStatus::Draft, ProposalStatus::Open),
    (ProposalStatus::PendingReview, ProposalStatus::Open),
    (ProposalStatus::PendingReview, ProposalStatus::Rejected),
    (ProposalStatus::PendingReview, ProposalStatus::Withdrawn),
    (ProposalStatus::Rejected, ProposalStatus::PendingReview),
    (ProposalStatus::Rejected, ProposalStatus::Open),
    (ProposalStatus::Withdrawn, ProposalStatus::PendingReview),
    (ProposalStatus::Withdrawn, ProposalStatus::Open),
    (ProposalStatus::Open, ProposalStatus::Approved),
    (ProposalStatus::Open, ProposalStatus::Rejected),
    (ProposalStatus::Approved, ProposalStatus::Closed),
    (ProposalStatus::Rejected, ProposalStatus::Closed),
];

/// Where `event` takes a proposal currently in `from`.
pub fn next_status(
    from: ProposalStatus,
    event: LifecycleEvent,
    review_required: bool,
) -> GovernanceResult<ProposalStatus> {
    use ProposalStatus::*;

    let to = match (from, event) {
        (Draft | Rejected | Withdrawn, LifecycleEvent::Submit) => {
            if review_required {
                PendingReview
            } else {
                Open
            }
        }
        (PendingReview, LifecycleEvent::Approve) => Open,
        (PendingReview, LifecycleEvent::Reject) => Rejected,
        (PendingReview, LifecycleEvent::Withdraw) => Withdrawn,
        (Open, LifecycleEvent::Close { passed }) => {
            if passed {
                Approved
            } else {
                Rejected
            }
        }
        (Approved | Rejected, LifecycleEvent::Archive) => Closed,
        _ => {
            return Err(GovernanceError::invalid_state(format!(
                "cannot {event} a {from} proposal"
            )));
        }
    };
    debug_assert!(EDGES.contains(&(from, to)), "{from} -> {to} is not an edge");
    Ok(to)
}

/// Result of closing the vote on a proposal.
#[derive(Debug, Clone, Serialize)]
pub struct CloseOutcome {
    pub proposal: Proposal,
    pub status: ProposalStatus,
    pub tally: Tally,
}

impl GovernanceEngine {
    pub async fn create_proposal(
        &self,
        band_id: &str,
        author_id: &str,
        draft: ProposalDraft,
        ack: IntegrityAck,
    ) -> GovernanceResult<Proposal> {
        let settings = self.band_settings(band_id).await?;
        let membership = self.member(band_id, author_id).await?;
        let context = PermissionContext::for_band(membership);
        Self::require(&context, Capability::Create, &settings, author_id)?;
        draft.content.validate()?;

        let overridden = self
            .screen_content(
                band_id,
                IntegrityAction::Create,
                draft.proposal_type,
                &draft.content,
                None,
                ack,
            )
            .await?;

        let proposal = self
            .store
            .insert_proposal(NewProposal {
                band_id: band_id.to_string(),
                created_by_id: author_id.to_string(),
                proposal_type: draft.proposal_type,
                priority: draft.priority,
                content: draft.content,
                integrity_overrides: overridden.clone(),
                created_at: self.clock.now(),
            })
            .await?;
        assert_eq!(proposal.status, ProposalStatus::Draft);

        info!(
            proposal_id = proposal.id,
            band_id,
            user_id = author_id,
            proposal_type = %proposal.proposal_type,
            "proposal created"
        );
        self.audit(AuditEvent::ProposalCreated {
            proposal_id: proposal.id,
            actor_id: author_id.to_string(),
            overridden_issues: overridden,
        })
        .await;
        Ok(proposal)
    }

    /// Sends a draft, or a rejected or withdrawn proposal, to review or
    /// straight to voting, depending on the band's review gate.
    pub async fn submit_for_review(
        &self,
        proposal_id: ProposalId,
        user_id: &str,
    ) -> GovernanceResult<Proposal> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, user_id).await?;
        let to = next_status(
            proposal.status,
            LifecycleEvent::Submit,
            settings.require_proposal_review,
        )?;
        Self::require(&context, Capability::Submit, &settings, user_id)?;

        let now = self.clock.now();
        let resubmission = proposal.status != ProposalStatus::Draft;
        let mut next = proposal.clone();
        if resubmission {
            check_resubmission(proposal.submission_count)?;
            next.submission_count += 1;
            next.rejection_reason = None;
            next.reviewed_by_id = None;
            next.reviewed_at = None;
            next.closed_at = None;
            next.final_tally = None;
        }
        next.status = to;
        next.updated_at = now;
        if to == ProposalStatus::Open {
            self.open_window(&mut next, now);
        }

        // A proposal rejected by vote still holds the ballots of that round.
        let saved = if resubmission && proposal.voting_started_at.is_some() {
            let reset = self.store.reset_ballots(&next, proposal.version).await?;
            if !reset.cleared_voters.is_empty() {
                info!(
                    proposal_id,
                    cleared = reset.cleared_voters.len(),
                    "previous voting round cleared"
                );
            }
            reset.proposal
        } else {
            self.store.save_proposal(&next, proposal.version).await?
        };

        self.record_transition(proposal.status, &saved, user_id)
            .await;
        Ok(saved)
    }

    pub async fn approve_proposal(
        &self,
        proposal_id: ProposalId,
        reviewer_id: &str,
    ) -> GovernanceResult<Proposal> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, reviewer_id).await?;
        let to = next_status(
            proposal.status,
            LifecycleEvent::Approve,
            settings.require_proposal_review,
        )?;
        Self::require(&context, Capability::Review, &settings, reviewer_id)?;

        let now = self.clock.now();
        let mut next = proposal.clone();
        next.status = to;
        next.reviewed_by_id = Some(reviewer_id.to_string());
        next.reviewed_at = Some(now);
        next.updated_at = now;
        self.open_window(&mut next, now);

        let saved = self.store.save_proposal(&next, proposal.version).await?;
        self.record_transition(proposal.status, &saved, reviewer_id)
            .await;
        Ok(saved)
    }

    pub async fn reject_proposal(
        &self,
        proposal_id: ProposalId,
        reviewer_id: &str,
        reason: &str,
    ) -> GovernanceResult<Proposal> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, reviewer_id).await?;
        let to = next_status(
            proposal.status,
            LifecycleEvent::Reject,
            settings.require_proposal_review,
        )?;
        Self::require(&context, Capability::Review, &settings, reviewer_id)?;
        let reason = require_reason("rejection reason", Some(reason))?;

        let now = self.clock.now();
        let mut next = proposal.clone();
        next.status = to;
        next.rejection_reason = Some(reason);
        next.reviewed_by_id = Some(reviewer_id.to_string());
        next.reviewed_at = Some(now);
        next.updated_at = now;

        let saved = self.store.save_proposal(&next, proposal.version).await?;
        self.record_transition(proposal.status, &saved, reviewer_id)
            .await;
        Ok(saved)
    }

    pub async fn withdraw_proposal(
        &self,
        proposal_id: ProposalId,
        user_id: &str,
    ) -> GovernanceResult<Proposal> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, user_id).await?;
        let to = next_status(
            proposal.status,
            LifecycleEvent::Withdraw,
            settings.require_proposal_review,
        )?;
        Self::require(&context, Capability::Withdraw, &settings, user_id)?;

        let mut next = proposal.clone();
        next.status = to;
        next.updated_at = self.clock.now();

        let saved = self.store.save_proposal(&next, proposal.version).await?;
        self.record_transition(proposal.status, &saved, user_id)
            .await;
        Ok(saved)
    }

    /// Tallies the ballots and settles the proposal as APPROVED or REJECTED.
    ///
    /// Ballots are read under the same lock that writes the verdict, and the
    /// write is guarded by the version read here. Of two concurrent closes
    /// exactly one commits; the other fails and fires no side effects.
    pub async fn close_proposal(
        &self,
        proposal_id: ProposalId,
        user_id: &str,
    ) -> GovernanceResult<CloseOutcome> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, user_id).await?;
        if proposal.status != ProposalStatus::Open {
            return Err(GovernanceError::invalid_state(format!(
                "cannot close a {} proposal",
                proposal.status
            )));
        }
        Self::require(&context, Capability::Close, &settings, user_id)?;

        let rule = self.rules.rule_for(settings.voting_method).ok_or_else(|| {
            GovernanceError::validation(format!(
                "no pass rule registered for {}",
                settings.voting_method
            ))
        })?;
        let eligible_voters = self
            .membership
            .eligible_voter_count(&proposal.band_id)
            .await?;
        let now = self.clock.now();

        let settle = |current: &Proposal, votes: &[Vote]| -> Proposal {
            let tally = compute_verdict(current.proposal_type, votes, eligible_voters, rule);
            let mut next = current.clone();
            next.status = if tally.passed {
                ProposalStatus::Approved
            } else {
                ProposalStatus::Rejected
            };
            next.final_tally = Some(tally.counts());
            next.closed_at = Some(now);
            next.updated_at = now;
            next
        };

        let settlement = match self
            .store
            .settle_proposal(proposal_id, proposal.version, &settle)
            .await
        {
            Ok(settlement) => settlement,
            Err(err @ StoreError::VersionConflict { .. }) => {
                warn!(proposal_id, user_id, "close lost a race: {err}");
                return Err(match self.store.find_proposal(proposal_id).await? {
                    Some(current) if current.status.is_settled() => {
                        GovernanceError::invalid_state(format!(
                            "proposal {proposal_id} is already {}",
                            current.status
                        ))
                    }
                    _ => err.into(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let saved = settlement.proposal;
        let tally = compute_verdict(
            saved.proposal_type,
            &settlement.votes,
            eligible_voters,
            rule,
        );
        next_status(
            ProposalStatus::Open,
            LifecycleEvent::Close {
                passed: tally.passed,
            },
            settings.require_proposal_review,
        )?;

        info!(
            proposal_id,
            user_id,
            status = %saved.status,
            yes = tally.yes,
            no = tally.no,
            abstain = tally.abstain,
            eligible_voters,
            "proposal closed"
        );
        if let Err(err) = self.notifier.proposal_closed(&saved, &tally).await {
            warn!(proposal_id, "Close notification failed: {err}");
        }
        self.audit(AuditEvent::ProposalClosed {
            proposal_id,
            actor_id: user_id.to_string(),
            status: saved.status,
            yes: tally.yes,
            no: tally.no,
            abstain: tally.abstain,
        })
        .await;

        Ok(CloseOutcome {
            status: saved.status,
            proposal: saved,
            tally,
        })
    }

    /// Marks a settled proposal as CLOSED.
    pub async fn archive_proposal(
        &self,
        proposal_id: ProposalId,
        user_id: &str,
    ) -> GovernanceResult<Proposal> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, user_id).await?;
        let to = next_status(
            proposal.status,
            LifecycleEvent::Archive,
            settings.require_proposal_review,
        )?;
        Self::require(&context, Capability::Archive, &settings, user_id)?;

        let mut next = proposal.clone();
        next.status = to;
        next.updated_at = self.clock.now();

        let saved = self.store.save_proposal(&next, proposal.version).await?;
        self.record_transition(proposal.status, &saved, user_id)
            .await;
        Ok(saved)
    }

    async fn record_transition(&self, from: ProposalStatus, saved: &Proposal, actor_id: &str) {
        info!(
            proposal_id = saved.id,
            user_id = actor_id,
            %from,
            to = %saved.status,
            submission_count = saved.submission_count,
            "proposal transitioned"
        );
        self.audit(AuditEvent::ProposalTransitioned {
            proposal_id: saved.id,
            actor_id: actor_id.to_string(),
            from,
            to: saved.status,
        })
        .await;
    }
}
