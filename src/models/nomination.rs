use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::governance::VoteChoice;
use super::{BandId, NominationId, UserId};

wire_enum! {
    pub enum NominationStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Withdrawn => "WITHDRAWN",
    }
}

impl NominationStatus {
    pub const fn is_decided(self) -> bool {
        !matches!(self, NominationStatus::Pending)
    }
}

/// A founder's proposal to make another member a co-founder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderNomination {
    pub id: NominationId,
    pub band_id: BandId,
    pub nominator_id: UserId,
    pub nominee_id: UserId,
    pub reason: String,
    pub status: NominationStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNomination {
    pub band_id: BandId,
    pub nominator_id: UserId,
    pub nominee_id: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationVote {
    pub nomination_id: NominationId,
    pub founder_id: UserId,
    pub choice: VoteChoice,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationAck {
    pub nomination_id: NominationId,
    pub status: NominationStatus,
    pub yes_votes: u32,
    /// Size of the current founder set the nomination is measured against.
    pub founders_required: u32,
    /// Current founders who have not voted YES yet.
    pub outstanding: Vec<UserId>,
}
