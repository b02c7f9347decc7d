use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::integrity::IntegrityIssue;
use super::{BandId, ProposalId, UserId};
use crate::error::{GovernanceError, GovernanceResult};

pub const MAX_PROPOSAL_TITLE_LEN: usize = 256;
pub const MAX_PROPOSAL_DESCRIPTION_LEN: usize = 10_000;
pub const MAX_PROPOSAL_SECTION_LEN: usize = 10_000;
pub const MAX_EXTERNAL_LINKS: usize = 10;
pub const MAX_EXTERNAL_LINK_LEN: usize = 2_048;
pub const MAX_VOTE_COMMENT_LEN: usize = 2_000;

wire_enum! {
    pub enum ProposalType {
        General => "GENERAL",
        Budget => "BUDGET",
        Project => "PROJECT",
        Policy => "POLICY",
        Membership => "MEMBERSHIP",
        Dissolution => "DISSOLUTION",
    }
}

wire_enum! {
    pub enum ProposalPriority {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Urgent => "URGENT",
    }
}

wire_enum! {
    pub enum ProposalStatus {
        Draft => "DRAFT",
        PendingReview => "PENDING_REVIEW",
        Open => "OPEN",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Closed => "CLOSED",
        Withdrawn => "WITHDRAWN",
    }
}

wire_enum! {
    pub enum VoteChoice {
        Yes => "YES",
        No => "NO",
        Abstain => "ABSTAIN",
    }
}

impl ProposalType {
    /// Whether abstaining is allowed when casting a vote on this type.
    pub const fn allows_abstain(self) -> bool {
        !matches!(self, ProposalType::Dissolution)
    }
}

impl Default for ProposalPriority {
    fn default() -> Self {
        ProposalPriority::Medium
    }
}

impl ProposalStatus {
    /// Voting on the proposal has finished, one way or another.
    pub const fn is_settled(self) -> bool {
        matches!(
            self,
            ProposalStatus::Approved | ProposalStatus::Rejected | ProposalStatus::Closed
        )
    }

    /// States in which the author may still change the content.
    pub const fn is_editable(self) -> bool {
        matches!(
            self,
            ProposalStatus::Draft
                | ProposalStatus::PendingReview
                | ProposalStatus::Open
                | ProposalStatus::Rejected
                | ProposalStatus::Withdrawn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetFigures {
    /// Requested amount in minor currency units.
    pub requested: i64,
    pub currency: String,
    #[serde(default)]
    pub breakdown: Option<String>,
}

/// Everything the author writes. Opaque to the lifecycle; inspected by the
/// integrity hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalContent {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub problem_statement: Option<String>,
    #[serde(default)]
    pub expected_outcome: Option<String>,
    #[serde(default)]
    pub risks: Option<String>,
    #[serde(default)]
    pub budget: Option<BudgetFigures>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub external_links: Vec<String>,
}

impl ProposalContent {
    pub fn validate(&self) -> GovernanceResult<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(GovernanceError::validation("title must not be empty"));
        }
        if title.chars().count() > MAX_PROPOSAL_TITLE_LEN {
            return Err(GovernanceError::validation(format!(
                "title exceeds {MAX_PROPOSAL_TITLE_LEN} characters"
            )));
        }

        let description = self.description.trim();
        if description.is_empty() {
            return Err(GovernanceError::validation("description must not be empty"));
        }
        if description.chars().count() > MAX_PROPOSAL_DESCRIPTION_LEN {
            return Err(GovernanceError::validation(format!(
                "description exceeds {MAX_PROPOSAL_DESCRIPTION_LEN} characters"
            )));
        }

        let sections = [
            ("problem_statement", &self.problem_statement),
            ("expected_outcome", &self.expected_outcome),
            ("risks", &self.risks),
            ("timeline", &self.timeline),
        ];
        for (label, section) in sections {
            if let Some(text) = section {
                if text.chars().count() > MAX_PROPOSAL_SECTION_LEN {
                    return Err(GovernanceError::validation(format!(
                        "{label} exceeds {MAX_PROPOSAL_SECTION_LEN} characters"
                    )));
                }
            }
        }

        if let Some(budget) = &self.budget {
            if budget.requested < 0 {
                return Err(GovernanceError::validation(
                    "budget.requested must not be negative",
                ));
            }
            if budget.currency.trim().is_empty() {
                return Err(GovernanceError::validation(
                    "budget.currency must not be empty",
                ));
            }
        }

        if self.external_links.len() > MAX_EXTERNAL_LINKS {
            return Err(GovernanceError::validation(format!(
                "at most {MAX_EXTERNAL_LINKS} external links are allowed"
            )));
        }
        for link in &self.external_links {
            let link = link.trim();
            if link.is_empty() || link.len() > MAX_EXTERNAL_LINK_LEN {
                return Err(GovernanceError::validation(format!(
                    "external links must be 1..={MAX_EXTERNAL_LINK_LEN} bytes"
                )));
            }
        }

        Ok(())
    }
}

/// Final yes/no/abstain counts frozen on a proposal when voting closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
}

impl VoteCounts {
    pub fn from_choices<'a>(choices: impl IntoIterator<Item = &'a VoteChoice>) -> Self {
        let mut counts = VoteCounts::default();
        for choice in choices {
            match choice {
                VoteChoice::Yes => counts.yes += 1,
                VoteChoice::No => counts.no += 1,
                VoteChoice::Abstain => counts.abstain += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.yes + self.no + self.abstain
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub band_id: BandId,
    pub created_by_id: UserId,
    pub proposal_type: ProposalType,
    pub priority: ProposalPriority,
    pub status: ProposalStatus,
    pub content: ProposalContent,
    pub submission_count: u32,
    pub edit_count: u32,
    /// Optimistic lock; bumped by the store on every write to the proposal row.
    pub version: i64,
    pub voting_started_at: Option<DateTime<Utc>>,
    pub voting_ends_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub reviewed_by_id: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub last_edit_reason: Option<String>,
    pub final_tally: Option<VoteCounts>,
    pub integrity_overrides: Vec<IntegrityIssue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn is_author(&self, user_id: &str) -> bool {
        self.created_by_id == user_id
    }

    /// Whether a vote cast at `now` falls inside the current voting window.
    pub fn window_admits(&self, now: DateTime<Utc>) -> bool {
        match self.voting_ends_at {
            Some(ends_at) => now <= ends_at,
            None => false,
        }
    }
}

/// A proposal before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProposal {
    pub band_id: BandId,
    pub created_by_id: UserId,
    pub proposal_type: ProposalType,
    pub priority: ProposalPriority,
    pub content: ProposalContent,
    pub integrity_overrides: Vec<IntegrityIssue>,
    pub created_at: DateTime<Utc>,
}

/// What a caller supplies to create a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub proposal_type: ProposalType,
    #[serde(default)]
    pub priority: ProposalPriority,
    pub content: ProposalContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub user_id: UserId,
    pub choice: VoteChoice,
    pub comment: Option<String>,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAck {
    pub proposal_id: ProposalId,
    pub user_id: UserId,
    pub choice: VoteChoice,
    pub voted_at: DateTime<Utc>,
    /// `true` when this call overwrote an earlier vote by the same member.
    pub replaced_previous: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> ProposalContent {
        ProposalContent {
            title: "Buy a new PA system".into(),
            description: "Our current speakers are failing at every gig.".into(),
            ..ProposalContent::default()
        }
    }

    #[test]
    fn minimal_content_is_valid() {
        assert!(content().validate().is_ok());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut c = content();
        c.title = "   ".into();
        let err = c.validate().unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let mut c = content();
        c.title = "t".repeat(MAX_PROPOSAL_TITLE_LEN + 1);
        assert!(c.validate().is_err());

        let mut c = content();
        c.external_links = vec!["https://example.org".into(); MAX_EXTERNAL_LINKS + 1];
        assert!(c.validate().is_err());

        let mut c = content();
        c.budget = Some(BudgetFigures {
            requested: -5,
            currency: "EUR".into(),
            breakdown: None,
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn dissolution_forbids_abstain() {
        assert!(!ProposalType::Dissolution.allows_abstain());
        assert!(ProposalType::ALL
            .iter()
            .filter(|t| **t != ProposalType::Dissolution)
            .all(|t| t.allows_abstain()));
    }

    #[test]
    fn counts_tally_each_choice() {
        let choices = [
            VoteChoice::Yes,
            VoteChoice::Yes,
            VoteChoice::No,
            VoteChoice::Abstain,
        ];
        let counts = VoteCounts::from_choices(choices.iter());
        assert_eq!(
            counts,
            VoteCounts {
                yes: 2,
                no: 1,
                abstain: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }
}
