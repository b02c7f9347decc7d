use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "founder_nominations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub band_id: String,
    pub nominator_id: String,
    pub nominee_id: String,
    #[sea_orm(column_type = "Text")]
    pub reason: String,
    pub status: String,
    pub version: i64,
    pub created_at: DateTimeWithTimeZone,
    pub decided_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::founder_nomination_vote::Entity")]
    FounderNominationVote,
}

impl Related<super::founder_nomination_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FounderNominationVote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
