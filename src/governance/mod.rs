//! Proposal governance: lifecycle, ballots, tallies, edits, resubmission and
//! founder nominations.
//!
//! [`GovernanceEngine`] is the single entry point. Every public operation
//! checks, in order: band membership, proposal status, the actor's
//! capability, then the payload. Only after all of them pass does it consult
//! the integrity hook (for content) and write through the store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::{GovernanceError, GovernanceResult};
use crate::models::governance::{Proposal, Vote};
use crate::models::membership::{BandSettings, Membership};
use crate::models::ProposalId;
use crate::ports::{AuditEvent, AuditLog, Clock, IntegrityHook, MembershipOracle, Notifier};
use crate::store::GovernanceStore;

pub mod ballots;
pub mod edit_guard;
pub mod integrity;
pub mod lifecycle;
pub mod nomination;
pub mod permissions;
pub mod resubmission;
pub mod tally;

use permissions::{Capability, PermissionContext};
use tally::TallyRules;

/// Minimum length, in characters, of rejection, edit and nomination reasons.
pub const MIN_REASON_LEN: usize = 10;
pub const MAX_REASON_LEN: usize = 2_000;

pub const DEFAULT_VOTING_PERIOD_HOURS: i64 = 168;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub voting_period: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            voting_period: Duration::hours(DEFAULT_VOTING_PERIOD_HOURS),
        }
    }
}

/// The external systems the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub membership: Arc<dyn MembershipOracle>,
    pub integrity: Arc<dyn IntegrityHook>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditLog>,
    pub clock: Arc<dyn Clock>,
}

pub struct GovernanceEngine {
    store: Arc<dyn GovernanceStore>,
    membership: Arc<dyn MembershipOracle>,
    integrity: Arc<dyn IntegrityHook>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    rules: TallyRules,
    settings: EngineSettings,
}

impl GovernanceEngine {
    pub fn new(
        store: Arc<dyn GovernanceStore>,
        collaborators: Collaborators,
        rules: TallyRules,
        settings: EngineSettings,
    ) -> Self {
        assert!(
            settings.voting_period > Duration::zero(),
            "Voting period must be positive"
        );
        Self {
            store,
            membership: collaborators.membership,
            integrity: collaborators.integrity,
            notifier: collaborators.notifier,
            audit: collaborators.audit,
            clock: collaborators.clock,
            rules,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn GovernanceStore> {
        &self.store
    }

    pub async fn get_proposal(&self, proposal_id: ProposalId) -> GovernanceResult<Proposal> {
        self.load_proposal(proposal_id).await
    }

    pub async fn list_votes(&self, proposal_id: ProposalId) -> GovernanceResult<Vec<Vote>> {
        self.load_proposal(proposal_id).await?;
        let votes = self.store.list_votes(proposal_id).await?;
        debug!(proposal_id, count = votes.len(), "listed ballots");
        Ok(votes)
    }

    async fn load_proposal(&self, proposal_id: ProposalId) -> GovernanceResult<Proposal> {
        self.store
            .find_proposal(proposal_id)
            .await?
            .ok_or_else(|| GovernanceError::not_found(format!("proposal {proposal_id}")))
    }

    async fn band_settings(&self, band_id: &str) -> GovernanceResult<BandSettings> {
        self.membership
            .band_settings(band_id)
            .await?
            .ok_or_else(|| GovernanceError::not_found(format!("band {band_id}")))
    }

    /// The actor's membership; non-members are refused outright.
    async fn member(&self, band_id: &str, user_id: &str) -> GovernanceResult<Membership> {
        self.membership
            .membership(band_id, user_id)
            .await?
            .ok_or_else(|| {
                GovernanceError::permission(format!("{user_id} is not a member of band {band_id}"))
            })
    }

    async fn proposal_context(
        &self,
        proposal: &Proposal,
        user_id: &str,
    ) -> GovernanceResult<(BandSettings, PermissionContext)> {
        let settings = self.band_settings(&proposal.band_id).await?;
        let membership = self.member(&proposal.band_id, user_id).await?;
        Ok((
            settings,
            PermissionContext::for_proposal(membership, proposal, user_id),
        ))
    }

    fn require(
        context: &PermissionContext,
        capability: Capability,
        settings: &BandSettings,
        user_id: &str,
    ) -> GovernanceResult<()> {
        if context.allows(capability, settings) {
            Ok(())
        } else {
            warn!(user_id, ?capability, role = %context.role, "permission refused");
            Err(GovernanceError::permission(format!(
                "{user_id} may not {}",
                capability.describe()
            )))
        }
    }

    /// Starts a fresh voting window at `now`.
    fn open_window(&self, proposal: &mut Proposal, now: DateTime<Utc>) {
        proposal.voting_started_at = Some(now);
        proposal.voting_ends_at = Some(now + self.settings.voting_period);
    }

    async fn audit(&self, event: AuditEvent) {
        if let Err(err) = self.audit.record(&event).await {
            warn!("Audit record dropped: {err}");
        }
    }
}

/// Trims `reason` and checks its length against [`MIN_REASON_LEN`].
pub(crate) fn require_reason(label: &str, reason: Option<&str>) -> GovernanceResult<String> {
    let trimmed = reason.map(str::trim).unwrap_or_default();
    let length = trimmed.chars().count();
    if length < MIN_REASON_LEN {
        return Err(GovernanceError::validation(format!(
            "{label} must be at least {MIN_REASON_LEN} characters"
        )));
    }
    if length > MAX_REASON_LEN {
        return Err(GovernanceError::validation(format!(
            "{label} must be at most {MAX_REASON_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_trimmed_before_measuring() {
        assert!(require_reason("reason", Some("   too short   ")).is_err());
        assert_eq!(
            require_reason("reason", Some("  long enough now ")).unwrap(),
            "long enough now"
        );
        assert!(require_reason("reason", None).is_err());
    }

    #[test]
    fn reason_length_counts_characters_not_bytes() {
        assert!(require_reason("reason", Some("éééééééééé")).is_ok());
        assert!(require_reason("reason", Some("ééééééééé")).is_err());
    }

    #[test]
    fn overlong_reason_is_rejected() {
        let long = "x".repeat(MAX_REASON_LEN + 1);
        let err = require_reason("edit reason", Some(&long)).unwrap_err();
        assert!(err.to_string().contains("at most"));
    }
}
