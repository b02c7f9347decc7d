use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FounderNominations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FounderNominations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FounderNominations::BandId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FounderNominations::NominatorId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FounderNominations::NomineeId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(FounderNominations::Reason).text().not_null())
                    .col(
                        ColumnDef::new(FounderNominations::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FounderNominations::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(FounderNominations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(FounderNominations::DecidedAt).timestamp_with_time_zone())
                    .index(
                        Index::create()
                            .name("idx_founder_nominations_band_nominee")
                            .col(FounderNominations::BandId)
                            .col(FounderNominations::NomineeId)
                            .col(FounderNominations::Status),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FounderNominationVotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FounderNominationVotes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FounderNominationVotes::NominationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FounderNominationVotes::FounderId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FounderNominationVotes::Choice)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FounderNominationVotes::VotedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_founder_nomination_votes_nomination")
                            .from(
                                FounderNominationVotes::Table,
                                FounderNominationVotes::NominationId,
                            )
                            .to(FounderNominations::Table, FounderNominations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .index(
                        Index::create()
                            .name("uq_founder_nomination_votes_founder")
                            .col(FounderNominationVotes::NominationId)
                            .col(FounderNominationVotes::FounderId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FounderNominationVotes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FounderNominations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FounderNominations {
    Table,
    Id,
    BandId,
    NominatorId,
    NomineeId,
    Reason,
    Status,
    Version,
    CreatedAt,
    DecidedAt,
}

#[derive(DeriveIden)]
enum FounderNominationVotes {
    Table,
    Id,
    NominationId,
    FounderId,
    Choice,
    VotedAt,
}
