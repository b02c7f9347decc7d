//! Contracts of the systems this engine consults but does not own: the
//! membership oracle, the integrity hook, the notification service, the audit
//! logger and the clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CollaboratorError;
use crate::governance::tally::Tally;
use crate::models::governance::{Proposal, ProposalStatus, VoteChoice};
use crate::models::integrity::{IntegrityIssue, IntegrityReport, IntegrityRequest};
use crate::models::membership::{BandSettings, Membership};
use crate::models::nomination::{FounderNomination, NominationStatus};
use crate::models::{NominationId, ProposalId, UserId};

/// Resolves roles, band configuration and the founder set.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn band_settings(&self, band_id: &str) -> Result<Option<BandSettings>, CollaboratorError>;

    async fn membership(
        &self,
        band_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>, CollaboratorError>;

    /// Active founders of the band at the moment of the call.
    async fn founders(&self, band_id: &str) -> Result<Vec<UserId>, CollaboratorError>;

    /// Active members whose role is in the band's voting roles.
    async fn eligible_voter_count(&self, band_id: &str) -> Result<u32, CollaboratorError>;
}

/// Pre-commit content validator.
#[async_trait]
pub trait IntegrityHook: Send + Sync {
    async fn check(&self, request: &IntegrityRequest) -> Result<IntegrityReport, CollaboratorError>;
}

/// Outbound notifications. Delivery failures never undo a committed change.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_voters_of_edit(
        &self,
        proposal: &Proposal,
        voters: &[UserId],
        reason: &str,
    ) -> Result<(), CollaboratorError>;

    async fn proposal_closed(
        &self,
        proposal: &Proposal,
        tally: &Tally,
    ) -> Result<(), CollaboratorError>;

    async fn nomination_decided(
        &self,
        nomination: &FounderNomination,
    ) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), CollaboratorError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Audit trail entry for one committed governance action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ProposalCreated {
        proposal_id: ProposalId,
        actor_id: UserId,
        overridden_issues: Vec<IntegrityIssue>,
    },
    ProposalEdited {
        proposal_id: ProposalId,
        actor_id: UserId,
        edit_count: u32,
        votes_reset: usize,
        overridden_issues: Vec<IntegrityIssue>,
    },
    ProposalTransitioned {
        proposal_id: ProposalId,
        actor_id: UserId,
        from: ProposalStatus,
        to: ProposalStatus,
    },
    VoteCast {
        proposal_id: ProposalId,
        actor_id: UserId,
        choice: VoteChoice,
    },
    ProposalClosed {
        proposal_id: ProposalId,
        actor_id: UserId,
        status: ProposalStatus,
        yes: u32,
        no: u32,
        abstain: u32,
    },
    NominationCreated {
        nomination_id: NominationId,
        actor_id: UserId,
        nominee_id: UserId,
    },
    NominationVoteCast {
        nomination_id: NominationId,
        actor_id: UserId,
        choice: VoteChoice,
    },
    NominationDecided {
        nomination_id: NominationId,
        actor_id: UserId,
        status: NominationStatus,
    },
}
