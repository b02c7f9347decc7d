//! Who may do what to a proposal, as pure functions over an explicit context.

use crate::models::governance::{Proposal, ProposalStatus};
use crate::models::membership::{BandSettings, MemberRole, MemberStatus, Membership};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Create,
    Submit,
    Review,
    Withdraw,
    Edit,
    Vote,
    Close,
    Archive,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Create,
        Capability::Submit,
        Capability::Review,
        Capability::Withdraw,
        Capability::Edit,
        Capability::Vote,
        Capability::Close,
        Capability::Archive,
    ];

    pub const fn describe(self) -> &'static str {
        match self {
            Capability::Create => "create proposals",
            Capability::Submit => "submit this proposal",
            Capability::Review => "review this proposal",
            Capability::Withdraw => "withdraw this proposal",
            Capability::Edit => "edit this proposal",
            Capability::Vote => "vote on this proposal",
            Capability::Close => "close this proposal",
            Capability::Archive => "archive this proposal",
        }
    }
}

/// Everything a permission decision may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionContext {
    pub role: MemberRole,
    pub member_status: MemberStatus,
    pub is_author: bool,
    pub is_current_founder: bool,
    /// `None` before the proposal exists.
    pub status: Option<ProposalStatus>,
}

impl PermissionContext {
    pub fn for_band(membership: Membership) -> Self {
        Self {
            role: membership.role,
            member_status: membership.status,
            is_author: false,
            is_current_founder: membership.is_active() && membership.role == MemberRole::Founder,
            status: None,
        }
    }

    pub fn for_proposal(membership: Membership, proposal: &Proposal, user_id: &str) -> Self {
        Self {
            is_author: proposal.is_author(user_id),
            status: Some(proposal.status),
            ..Self::for_band(membership)
        }
    }

    pub fn allows(&self, capability: Capability, settings: &BandSettings) -> bool {
        if self.member_status != MemberStatus::Active {
            return false;
        }

        match capability {
            Capability::Create => {
                self.status.is_none() && settings.proposal_roles.contains(&self.role)
            }
            Capability::Submit => {
                self.is_author
                    && matches!(
                        self.status,
                        Some(
                            ProposalStatus::Draft
                                | ProposalStatus::Rejected
                                | ProposalStatus::Withdrawn
                        )
                    )
            }
            Capability::Review => {
                !self.is_author
                    && self.status == Some(ProposalStatus::PendingReview)
                    && settings.review_roles.contains(&self.role)
            }
            Capability::Withdraw => {
                self.is_author && self.status == Some(ProposalStatus::PendingReview)
            }
            Capability::Edit => self.is_author && self.status.is_some_and(|s| s.is_editable()),
            Capability::Vote => {
                self.status == Some(ProposalStatus::Open)
                    && settings.voting_roles.contains(&self.role)
            }
            Capability::Close => {
                self.status == Some(ProposalStatus::Open) && self.may_settle()
            }
            Capability::Archive => {
                matches!(
                    self.status,
                    Some(ProposalStatus::Approved | ProposalStatus::Rejected)
                ) && self.may_settle()
            }
        }
    }

    fn may_settle(&self) -> bool {
        self.is_author || self.is_current_founder || self.role == MemberRole::Governor
    }
}
