//! In-memory fakes of the external collaborators and a ready-made engine.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::CollaboratorError;
use crate::governance::tally::{Tally, TallyRules};
use crate::governance::{Collaborators, EngineSettings, GovernanceEngine};
use crate::models::governance::{
    Proposal, ProposalContent, ProposalDraft, ProposalStatus, ProposalType, VoteAck, VoteChoice,
};
use crate::models::integrity::{IntegrityAck, IntegrityReport, IntegrityRequest};
use crate::models::membership::{BandSettings, MemberRole, Membership};
use crate::models::nomination::{FounderNomination, NominationStatus};
use crate::models::{NominationId, ProposalId, UserId};
use crate::ports::{AuditEvent, AuditLog, Clock, IntegrityHook, MembershipOracle, Notifier};
use crate::store::MemoryStore;

pub const BAND: &str = "band-1";
pub const AUTHOR: &str = "author";
pub const FOUNDER_A: &str = "founder-a";
pub const FOUNDER_B: &str = "founder-b";
pub const GOVERNOR: &str = "governor";
pub const MODERATOR: &str = "moderator";
pub const OBSERVER: &str = "observer";
pub const VOTERS: [&str; 3] = ["voter-1", "voter-2", "voter-3"];

pub fn content(title: &str) -> ProposalContent {
    ProposalContent {
        title: title.to_string(),
        description: format!("{title}: details for the band to consider."),
        ..ProposalContent::default()
    }
}

#[derive(Default)]
pub struct FakeMembership {
    settings: Mutex<BTreeMap<String, BandSettings>>,
    members: Mutex<BTreeMap<(String, UserId), Membership>>,
}

impl FakeMembership {
    pub fn seeded(settings: BandSettings) -> Self {
        let fake = Self::default();
        let band = settings.band_id.clone();
        fake.settings.lock().unwrap().insert(band, settings);
        let roster = [
            (AUTHOR, MemberRole::VotingMember),
            (FOUNDER_A, MemberRole::Founder),
            (FOUNDER_B, MemberRole::Founder),
            (GOVERNOR, MemberRole::Governor),
            (MODERATOR, MemberRole::Moderator),
            (OBSERVER, MemberRole::Observer),
            (VOTERS[0], MemberRole::VotingMember),
            (VOTERS[1], MemberRole::VotingMember),
            (VOTERS[2], MemberRole::VotingMember),
        ];
        for (user, role) in roster {
            fake.set_member(user, Membership::active(role));
        }
        fake
    }

    pub fn set_member(&self, user_id: &str, membership: Membership) {
        self.members
            .lock()
            .unwrap()
            .insert((BAND.to_string(), user_id.to_string()), membership);
    }

    pub fn update_settings(&self, change: impl FnOnce(&mut BandSettings)) {
        let mut settings = self.settings.lock().unwrap();
        change(settings.get_mut(BAND).unwrap());
    }
}

#[async_trait]
impl MembershipOracle for FakeMembership {
    async fn band_settings(&self, band_id: &str) -> Result<Option<BandSettings>, CollaboratorError> {
        Ok(self.settings.lock().unwrap().get(band_id).cloned())
    }

    async fn membership(
        &self,
        band_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>, CollaboratorError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&(band_id.to_string(), user_id.to_string()))
            .copied())
    }

    async fn founders(&self, band_id: &str) -> Result<Vec<UserId>, CollaboratorError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|((band, _), m)| band == band_id && m.is_active() && m.role == MemberRole::Founder)
            .map(|((_, user), _)| user.clone())
            .collect())
    }

    async fn eligible_voter_count(&self, band_id: &str) -> Result<u32, CollaboratorError> {
        let settings = self.settings.lock().unwrap().get(band_id).cloned();
        let Some(settings) = settings else {
            return Ok(0);
        };
        let count = self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|((band, _), m)| {
                band == band_id && m.is_active() && settings.voting_roles.contains(&m.role)
            })
            .count();
        Ok(count as u32)
    }
}

/// Returns queued reports in order, then clear reports.
#[derive(Default)]
pub struct ScriptedIntegrity {
    reports: Mutex<VecDeque<IntegrityReport>>,
    requests: Mutex<Vec<IntegrityRequest>>,
}

impl ScriptedIntegrity {
    pub fn push(&self, report: IntegrityReport) {
        self.reports.lock().unwrap().push_back(report);
    }

    pub fn requests(&self) -> Vec<IntegrityRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntegrityHook for ScriptedIntegrity {
    async fn check(&self, request: &IntegrityRequest) -> Result<IntegrityReport, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self
            .reports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(IntegrityReport::clear))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    failing: AtomicBool,
    edits: Mutex<Vec<(ProposalId, Vec<UserId>, String)>>,
    closed: Mutex<Vec<(ProposalId, ProposalStatus)>>,
    nominations: Mutex<Vec<(NominationId, NominationStatus)>>,
}

impl RecordingNotifier {
    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn edits(&self) -> Vec<(ProposalId, Vec<UserId>, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<(ProposalId, ProposalStatus)> {
        self.closed.lock().unwrap().clone()
    }

    pub fn nominations(&self) -> Vec<(NominationId, NominationStatus)> {
        self.nominations.lock().unwrap().clone()
    }

    fn delivery(&self) -> Result<(), CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CollaboratorError::new("notifications", "delivery refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_voters_of_edit(
        &self,
        proposal: &Proposal,
        voters: &[UserId],
        reason: &str,
    ) -> Result<(), CollaboratorError> {
        self.delivery()?;
        self.edits
            .lock()
            .unwrap()
            .push((proposal.id, voters.to_vec(), reason.to_string()));
        Ok(())
    }

    async fn proposal_closed(
        &self,
        proposal: &Proposal,
        _tally: &Tally,
    ) -> Result<(), CollaboratorError> {
        self.delivery()?;
        self.closed
            .lock()
            .unwrap()
            .push((proposal.id, proposal.status));
        Ok(())
    }

    async fn nomination_decided(
        &self,
        nomination: &FounderNomination,
    ) -> Result<(), CollaboratorError> {
        self.delivery()?;
        self.nominations
            .lock()
            .unwrap()
            .push((nomination.id, nomination.status));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for RecordingAudit {
    async fn record(&self, event: &AuditEvent) -> Result<(), CollaboratorError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct Harness {
    pub engine: Arc<GovernanceEngine>,
    pub store: Arc<MemoryStore>,
    pub membership: Arc<FakeMembership>,
    pub integrity: Arc<ScriptedIntegrity>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<RecordingAudit>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(BandSettings::with_defaults(BAND))
    }

    pub fn with_review() -> Self {
        let mut settings = BandSettings::with_defaults(BAND);
        settings.require_proposal_review = true;
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: BandSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let membership = Arc::new(FakeMembership::seeded(settings));
        let integrity = Arc::new(ScriptedIntegrity::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let audit = Arc::new(RecordingAudit::default());
        let clock = Arc::new(ManualClock::starting_at(
            Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
        ));
        let engine = Arc::new(GovernanceEngine::new(
            store.clone(),
            Collaborators {
                membership: membership.clone(),
                integrity: integrity.clone(),
                notifier: notifier.clone(),
                audit: audit.clone(),
                clock: clock.clone(),
            },
            TallyRules::standard(),
            EngineSettings::default(),
        ));
        Self {
            engine,
            store,
            membership,
            integrity,
            notifier,
            audit,
            clock,
        }
    }

    pub async fn draft(&self, proposal_type: ProposalType) -> Proposal {
        let draft = ProposalDraft {
            proposal_type,
            priority: Default::default(),
            content: content("Buy a new PA system"),
        };
        self.engine
            .create_proposal(BAND, AUTHOR, draft, IntegrityAck::NONE)
            .await
            .unwrap()
    }

    /// Creates a proposal and opens it for voting; the band must not require
    /// review.
    pub async fn open(&self, proposal_type: ProposalType) -> Proposal {
        let draft = self.draft(proposal_type).await;
        let open = self.engine.submit_for_review(draft.id, AUTHOR).await.unwrap();
        assert_eq!(open.status, ProposalStatus::Open);
        open
    }

    pub async fn cast(&self, proposal_id: ProposalId, user_id: &str, choice: VoteChoice) -> VoteAck {
        self.engine
            .cast_vote(proposal_id, user_id, choice, None)
            .await
            .unwrap()
    }
}
