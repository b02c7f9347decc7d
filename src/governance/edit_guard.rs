//! Content edits, and the ballot reset an edit forces while voting is open.

use tracing::{info, warn};

use super::permissions::Capability;
use super::{require_reason, GovernanceEngine};
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::governance::{Proposal, ProposalContent, ProposalStatus};
use crate::models::integrity::{IntegrityAck, IntegrityAction};
use crate::models::ProposalId;
use crate::ports::AuditEvent;

/// What an edit in a given status has to do besides replacing content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPlan {
    /// Existing ballots are void and the voting window restarts.
    pub resets_ballots: bool,
    pub reason: Option<String>,
}

pub fn plan_edit(status: ProposalStatus, edit_reason: Option<&str>) -> GovernanceResult<EditPlan> {
    if !status.is_editable() {
        return Err(GovernanceError::invalid_state(format!(
            "a {status} proposal can no longer be edited"
        )));
    }
    if status == ProposalStatus::Open {
        let reason = require_reason("edit reason", edit_reason)?;
        return Ok(EditPlan {
            resets_ballots: true,
            reason: Some(reason),
        });
    }
    let reason = edit_reason
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);
    Ok(EditPlan {
        resets_ballots: false,
        reason,
    })
}

impl GovernanceEngine {
    /// Replaces the proposal's content.
    ///
    /// On an OPEN proposal this deletes every ballot and restarts the voting
    /// window in the same write; prior voters are told afterwards. Nothing is
    /// touched if the integrity hook holds the edit back.
    pub async fn edit_proposal(
        &self,
        proposal_id: ProposalId,
        user_id: &str,
        content: ProposalContent,
        edit_reason: Option<&str>,
        ack: IntegrityAck,
    ) -> GovernanceResult<Proposal> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (settings, context) = self.proposal_context(&proposal, user_id).await?;
        if !proposal.status.is_editable() {
            return Err(GovernanceError::invalid_state(format!(
                "a {} proposal can no longer be edited",
                proposal.status
            )));
        }
        Self::require(&context, Capability::Edit, &settings, user_id)?;
        let plan = plan_edit(proposal.status, edit_reason)?;
        content.validate()?;

        let overridden = self
            .screen_content(
                &proposal.band_id,
                IntegrityAction::Edit,
                proposal.proposal_type,
                &content,
                Some(proposal_id),
                ack,
            )
            .await?;

        let now = self.clock.now();
        let mut next = proposal.clone();
        next.content = content;
        next.edit_count += 1;
        next.last_edit_reason = plan.reason.clone();
        next.integrity_overrides.extend(overridden.iter().cloned());
        next.updated_at = now;

        let (saved, cleared_voters) = if plan.resets_ballots {
            self.open_window(&mut next, now);
            let reset = self.store.reset_ballots(&next, proposal.version).await?;
            (reset.proposal, reset.cleared_voters)
        } else {
            let saved = self.store.save_proposal(&next, proposal.version).await?;
            (saved, Vec::new())
        };

        info!(
            proposal_id,
            user_id,
            edit_count = saved.edit_count,
            votes_reset = cleared_voters.len(),
            "proposal edited"
        );

        if let Some(reason) = plan.reason.as_deref().filter(|_| !cleared_voters.is_empty()) {
            if let Err(err) = self
                .notifier
                .notify_voters_of_edit(&saved, &cleared_voters, reason)
                .await
            {
                warn!(
                    proposal_id,
                    voters = cleared_voters.len(),
                    "Edit notification failed: {err}"
                );
            }
        }
        self.audit(AuditEvent::ProposalEdited {
            proposal_id,
            actor_id: user_id.to_string(),
            edit_count: saved.edit_count,
            votes_reset: cleared_voters.len(),
            overridden_issues: overridden,
        })
        .await;

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::governance::{ProposalType, VoteChoice};
    use crate::models::integrity::{IntegrityIssue, IntegrityReport, IssueSeverity};
    use crate::ports::Clock;
    use crate::store::GovernanceStore;
    use crate::testing::{content, Harness, AUTHOR, FOUNDER_A, VOTERS};

    #[test]
    fn open_edits_need_a_reason() {
        assert!(plan_edit(ProposalStatus::Open, None).is_err());
        assert!(plan_edit(ProposalStatus::Open, Some("typo")).is_err());
        let plan = plan_edit(ProposalStatus::Open, Some("Clarified the budget")).unwrap();
        assert!(plan.resets_ballots);

        let plan = plan_edit(ProposalStatus::Draft, Some("  ")).unwrap();
        assert_eq!(
            plan,
            EditPlan {
                resets_ballots: false,
                reason: None
            }
        );
    }

    #[test]
    fn settled_proposals_are_frozen() {
        for status in [ProposalStatus::Approved, ProposalStatus::Closed] {
            let err = plan_edit(status, Some("a perfectly good reason")).unwrap_err();
            assert!(matches!(err, GovernanceError::InvalidState(_)));
        }
    }

    #[tokio::test]
    async fn editing_open_proposal_resets_votes_and_window() {
        let h = Harness::new();
        let proposal = h.open(ProposalType::General).await;
        for voter in VOTERS {
            h.cast(proposal.id, voter, VoteChoice::Yes).await;
        }
        let before = h.engine.get_proposal(proposal.id).await.unwrap();
        h.clock.advance(Duration::minutes(30));

        let edited = h
            .engine
            .edit_proposal(
                proposal.id,
                AUTHOR,
                content("Buy a better PA system"),
                Some("Fixed budget"),
                IntegrityAck::NONE,
            )
            .await
            .unwrap();

        assert!(h.engine.list_votes(proposal.id).await.unwrap().is_empty());
        assert_eq!(edited.edit_count, before.edit_count + 1);
        assert!(edited.voting_ends_at.unwrap() > before.voting_ends_at.unwrap());
        assert_eq!(edited.status, ProposalStatus::Open);
        assert_eq!(edited.last_edit_reason.as_deref(), Some("Fixed budget"));

        let notified = h.notifier.edits();
        assert_eq!(notified.len(), 1);
        let (id, mut voters, reason) = notified[0].clone();
        voters.sort();
        assert_eq!(id, proposal.id);
        assert_eq!(voters, VOTERS.map(String::from).to_vec());
        assert_eq!(reason, "Fixed budget");
    }

    #[tokio::test]
    async fn blocked_edit_leaves_everything_untouched() {
        let h = Harness::new();
        let proposal = h.open(ProposalType::General).await;
        h.cast(proposal.id, VOTERS[0], VoteChoice::Yes).await;
        let before = h.engine.get_proposal(proposal.id).await.unwrap();

        h.integrity.push(IntegrityReport {
            can_proceed: false,
            issues: vec![IntegrityIssue {
                code: "HARASSMENT".into(),
                severity: IssueSeverity::Blocking,
                message: "Targets a member".into(),
                field: Some("description".into()),
            }],
        });
        let err = h
            .engine
            .edit_proposal(
                proposal.id,
                AUTHOR,
                content("Something else"),
                Some("Reworded the description"),
                IntegrityAck::PROCEED,
            )
            .await
            .unwrap_err();
        match err {
            GovernanceError::IntegrityBlocked {
                issues,
                overridable,
            } => {
                assert!(!overridable);
                assert_eq!(issues[0].code, "HARASSMENT");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let after = h.engine.get_proposal(proposal.id).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(h.engine.list_votes(proposal.id).await.unwrap().len(), 1);
        assert!(h.notifier.edits().is_empty());
    }

    #[tokio::test]
    async fn open_edit_without_reason_is_refused() {
        let h = Harness::new();
        let proposal = h.open(ProposalType::General).await;
        h.cast(proposal.id, VOTERS[0], VoteChoice::Yes).await;
        let screened = h.integrity.requests().len();
        let err = h
            .engine
            .edit_proposal(
                proposal.id,
                AUTHOR,
                content("New title"),
                Some("short"),
                IntegrityAck::NONE,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        assert_eq!(h.engine.list_votes(proposal.id).await.unwrap().len(), 1);
        assert_eq!(h.integrity.requests().len(), screened);
    }

    #[tokio::test]
    async fn only_the_author_edits() {
        let h = Harness::new();
        let draft = h.draft(ProposalType::General).await;
        let err = h
            .engine
            .edit_proposal(draft.id, FOUNDER_A, content("Hijacked"), None, IntegrityAck::NONE)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::PermissionDenied(_)));

        let edited = h
            .engine
            .edit_proposal(draft.id, AUTHOR, content("Polished"), None, IntegrityAck::NONE)
            .await
            .unwrap();
        assert_eq!(edited.edit_count, 1);
        assert_eq!(edited.content.title, "Polished");
        assert!(edited.voting_ends_at.is_none());
    }

    #[tokio::test]
    async fn failed_notification_does_not_undo_the_edit() {
        let h = Harness::new();
        let proposal = h.open(ProposalType::General).await;
        h.cast(proposal.id, VOTERS[0], VoteChoice::No).await;
        h.notifier.fail_deliveries(true);

        let edited = h
            .engine
            .edit_proposal(
                proposal.id,
                AUTHOR,
                content("Revised plan"),
                Some("Addressed feedback from the last rehearsal"),
                IntegrityAck::NONE,
            )
            .await
            .unwrap();
        assert_eq!(edited.edit_count, 1);
        assert!(h.engine.list_votes(proposal.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_vote_after_reset_is_a_conflict() {
        let h = Harness::new();
        let proposal = h.open(ProposalType::General).await;
        let seen = h.engine.get_proposal(proposal.id).await.unwrap();

        h.engine
            .edit_proposal(
                proposal.id,
                AUTHOR,
                content("Revised plan"),
                Some("Addressed feedback from members"),
                IntegrityAck::NONE,
            )
            .await
            .unwrap();

        let stale = crate::models::governance::Vote {
            proposal_id: proposal.id,
            user_id: VOTERS[1].into(),
            choice: VoteChoice::Yes,
            comment: None,
            voted_at: h.clock.now(),
        };
        let err: GovernanceError = h
            .store
            .upsert_vote(&stale, seen.version)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, GovernanceError::ConcurrencyConflict(_)));
    }
}
