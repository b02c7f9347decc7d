use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::BandId;

wire_enum! {
    pub enum MemberRole {
        Founder => "FOUNDER",
        Governor => "GOVERNOR",
        Moderator => "MODERATOR",
        Conductor => "CONDUCTOR",
        VotingMember => "VOTING_MEMBER",
        Observer => "OBSERVER",
    }
}

wire_enum! {
    pub enum MemberStatus {
        Active => "ACTIVE",
        Pending => "PENDING",
        Inactive => "INACTIVE",
    }
}

wire_enum! {
    pub enum VotingMethod {
        /// Strictly more than half of the yes+no votes.
        SimpleMajority => "SIMPLE_MAJORITY",
        /// At least two thirds of the yes+no votes.
        SuperMajority => "SUPER_MAJORITY",
        /// Every yes+no vote is YES.
        Unanimous => "UNANIMOUS",
    }
}

/// A user's role-scoped participation record within a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub role: MemberRole,
    pub status: MemberStatus,
}

impl Membership {
    pub fn active(role: MemberRole) -> Self {
        Self {
            role,
            status: MemberStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Band-level governance configuration. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSettings {
    pub band_id: BandId,
    pub voting_method: VotingMethod,
    pub require_proposal_review: bool,
    pub voting_roles: BTreeSet<MemberRole>,
    pub review_roles: BTreeSet<MemberRole>,
    pub proposal_roles: BTreeSet<MemberRole>,
}

impl BandSettings {
    pub fn with_defaults(band_id: impl Into<BandId>) -> Self {
        let voting_roles: BTreeSet<MemberRole> = [
            MemberRole::Founder,
            MemberRole::Governor,
            MemberRole::Moderator,
            MemberRole::Conductor,
            MemberRole::VotingMember,
        ]
        .into_iter()
        .collect();
        let review_roles = [
            MemberRole::Founder,
            MemberRole::Governor,
            MemberRole::Moderator,
        ]
        .into_iter()
        .collect();
        Self {
            band_id: band_id.into(),
            voting_method: VotingMethod::SimpleMajority,
            require_proposal_review: false,
            proposal_roles: voting_roles.clone(),
            voting_roles,
            review_roles,
        }
    }
}
