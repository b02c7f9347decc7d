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
                    .table(BandProposals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BandProposals::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BandProposals::BandId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(BandProposals::CreatedById)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BandProposals::ProposalType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BandProposals::Priority).string_len(16).not_null())
                    .col(ColumnDef::new(BandProposals::Status).string_len(32).not_null())
                    .col(ColumnDef::new(BandProposals::Title).string_len(256).not_null())
                    .col(ColumnDef::new(BandProposals::Content).json_binary().not_null())
                    .col(
                        ColumnDef::new(BandProposals::SubmissionCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BandProposals::EditCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BandProposals::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(BandProposals::VotingStartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(BandProposals::VotingEndsAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(BandProposals::ClosedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(BandProposals::RejectionReason).text())
                    .col(ColumnDef::new(BandProposals::ReviewedById).string_len(64))
                    .col(ColumnDef::new(BandProposals::ReviewedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(BandProposals::LastEditReason).text())
                    // Frozen when voting closes; all three or none
                    .col(ColumnDef::new(BandProposals::VotesYes).integer())
                    .col(ColumnDef::new(BandProposals::VotesNo).integer())
                    .col(ColumnDef::new(BandProposals::VotesAbstain).integer())
                    .col(
                        ColumnDef::new(BandProposals::IntegrityOverrides)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(BandProposals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BandProposals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_band_proposals_band_status")
                            .col(BandProposals::BandId)
                            .col(BandProposals::Status),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BandProposalVotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BandProposalVotes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BandProposalVotes::ProposalId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BandProposalVotes::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BandProposalVotes::Choice).string_len(16).not_null())
                    .col(ColumnDef::new(BandProposalVotes::Comment).text())
                    .col(
                        ColumnDef::new(BandProposalVotes::VotedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_band_proposal_votes_proposal")
                            .from(BandProposalVotes::Table, BandProposalVotes::ProposalId)
                            .to(BandProposals::Table, BandProposals::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    // One ballot per member per proposal; target of the vote upsert
                    .index(
                        Index::create()
                            .name("uq_band_proposal_votes_member")
                            .col(BandProposalVotes::ProposalId)
                            .col(BandProposalVotes::UserId)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BandProposalVotes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BandProposals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BandProposals {
    Table,
    Id,
    BandId,
    CreatedById,
    ProposalType,
    Priority,
    Status,
    Title,
    Content,
    SubmissionCount,
    EditCount,
    Version,
    VotingStartedAt,
    VotingEndsAt,
    ClosedAt,
    RejectionReason,
    ReviewedById,
    ReviewedAt,
    LastEditReason,
    VotesYes,
    VotesNo,
    VotesAbstain,
    IntegrityOverrides,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BandProposalVotes {
    Table,
    Id,
    ProposalId,
    UserId,
    Choice,
    Comment,
    VotedAt,
}
