use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "band_proposals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub band_id: String,
    pub created_by_id: String,
    pub proposal_type: String,
    pub priority: String,
    pub status: String,
    pub title: String,
    /// Full `ProposalContent` document, title included.
    pub content: Json,
    pub submission_count: i32,
    pub edit_count: i32,
    pub version: i64,
    pub voting_started_at: Option<DateTimeWithTimeZone>,
    pub voting_ends_at: Option<DateTimeWithTimeZone>,
    pub closed_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,
    pub reviewed_by_id: Option<String>,
    pub reviewed_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_edit_reason: Option<String>,
    pub votes_yes: Option<i32>,
    pub votes_no: Option<i32>,
    pub votes_abstain: Option<i32>,
    pub integrity_overrides: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::proposal_vote::Entity")]
    ProposalVote,
}

impl Related<super::proposal_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProposalVote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
