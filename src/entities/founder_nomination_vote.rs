use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "founder_nomination_votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub nomination_id: i64,
    pub founder_id: String,
    pub choice: String,
    pub voted_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::founder_nomination::Entity",
        from = "Column::NominationId",
        to = "super::founder_nomination::Column::Id"
    )]
    FounderNomination,
}

impl Related<super::founder_nomination::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FounderNomination.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
