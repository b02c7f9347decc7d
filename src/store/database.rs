use std::fmt::Display;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::debug;

use super::{BallotReset, GovernanceStore, Settlement, VoteWrite};
use crate::entities::{founder_nomination, founder_nomination_vote, proposal, proposal_vote};
use crate::error::StoreError;
use crate::models::governance::{NewProposal, Proposal, ProposalStatus, Vote, VoteCounts};
use crate::models::nomination::{
    FounderNomination, NewNomination, NominationStatus, NominationVote,
};
use crate::models::{NominationId, ProposalId};

/// PostgreSQL-backed store. Multi-row writes run in one transaction holding a
/// row lock on the parent proposal or nomination.
#[derive(Clone)]
pub struct DatabaseStore {
    database: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl GovernanceStore for DatabaseStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.database.ping().await?;
        Ok(())
    }

    async fn insert_proposal(&self, new: NewProposal) -> Result<Proposal, StoreError> {
        let created_at = to_db_time(new.created_at);
        let row = proposal::ActiveModel {
            id: NotSet,
            band_id: Set(new.band_id),
            created_by_id: Set(new.created_by_id),
            proposal_type: Set(new.proposal_type.as_str().to_string()),
            priority: Set(new.priority.as_str().to_string()),
            status: Set(ProposalStatus::Draft.as_str().to_string()),
            title: Set(new.content.title.clone()),
            content: Set(to_json(&new.content)?),
            submission_count: Set(0),
            edit_count: Set(0),
            version: Set(1),
            voting_started_at: Set(None),
            voting_ends_at: Set(None),
            closed_at: Set(None),
            rejection_reason: Set(None),
            reviewed_by_id: Set(None),
            reviewed_at: Set(None),
            last_edit_reason: Set(None),
            votes_yes: Set(None),
            votes_no: Set(None),
            votes_abstain: Set(None),
            integrity_overrides: Set(to_json(&new.integrity_overrides)?),
            created_at: Set(created_at),
            updated_at: Set(created_at),
        };
        let inserted = proposal::Entity::insert(row)
            .exec_with_returning(&self.database)
            .await?;
        proposal_from_row(inserted)
    }

    async fn find_proposal(&self, id: ProposalId) -> Result<Option<Proposal>, StoreError> {
        proposal::Entity::find_by_id(id)
            .one(&self.database)
            .await?
            .map(proposal_from_row)
            .transpose()
    }

    async fn save_proposal(
        &self,
        next: &Proposal,
        expected_version: i64,
    ) -> Result<Proposal, StoreError> {
        write_proposal(&self.database, next, expected_version).await
    }

    async fn reset_ballots(
        &self,
        next: &Proposal,
        expected_version: i64,
    ) -> Result<BallotReset, StoreError> {
        let txn = self.database.begin().await?;
        lock_proposal(&txn, next.id, expected_version, true).await?;

        let cleared_voters = proposal_vote::Entity::find()
            .filter(proposal_vote::Column::ProposalId.eq(next.id))
            .order_by_asc(proposal_vote::Column::UserId)
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| row.user_id)
            .collect::<Vec<_>>();
        let deleted = proposal_vote::Entity::delete_many()
            .filter(proposal_vote::Column::ProposalId.eq(next.id))
            .exec(&txn)
            .await?;
        ensure_reset_matches(next.id, deleted.rows_affected, cleared_voters.len())?;

        let proposal = write_proposal(&txn, next, expected_version).await?;
        txn.commit().await?;
        debug!(proposal_id = next.id, cleared = cleared_voters.len(), "ballots reset");
        Ok(BallotReset {
            proposal,
            cleared_voters,
        })
    }

    async fn upsert_vote(
        &self,
        vote: &Vote,
        expected_version: i64,
    ) -> Result<VoteWrite, StoreError> {
        let txn = self.database.begin().await?;
        // Shared lock: ballots from different members proceed in parallel,
        // resets and settlements wait for them.
        lock_proposal(&txn, vote.proposal_id, expected_version, false).await?;

        let replaced = proposal_vote::Entity::find()
            .filter(proposal_vote::Column::ProposalId.eq(vote.proposal_id))
            .filter(proposal_vote::Column::UserId.eq(vote.user_id.clone()))
            .one(&txn)
            .await?
            .is_some();

        let row = proposal_vote::ActiveModel {
            id: NotSet,
            proposal_id: Set(vote.proposal_id),
            user_id: Set(vote.user_id.clone()),
            choice: Set(vote.choice.as_str().to_string()),
            comment: Set(vote.comment.clone()),
            voted_at: Set(to_db_time(vote.voted_at)),
        };
        proposal_vote::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    proposal_vote::Column::ProposalId,
                    proposal_vote::Column::UserId,
                ])
                .update_columns([
                    proposal_vote::Column::Choice,
                    proposal_vote::Column::Comment,
                    proposal_vote::Column::VotedAt,
                ])
                .to_owned(),
            )
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(VoteWrite {
            vote: vote.clone(),
            replaced,
        })
    }

    async fn list_votes(&self, proposal_id: ProposalId) -> Result<Vec<Vote>, StoreError> {
        load_votes(&self.database, proposal_id).await
    }

    async fn settle_proposal(
        &self,
        proposal_id: ProposalId,
        expected_version: i64,
        settle: &(dyn for<'p> Fn(&'p Proposal, &'p [Vote]) -> Proposal + Send + Sync),
    ) -> Result<Settlement, StoreError> {
        let txn = self.database.begin().await?;
        let row = lock_proposal(&txn, proposal_id, expected_version, true).await?;
        let current = proposal_from_row(row)?;
        let votes = load_votes(&txn, proposal_id).await?;

        let next = settle(&current, &votes);
        let proposal = write_proposal(&txn, &next, expected_version).await?;
        txn.commit().await?;
        Ok(Settlement { proposal, votes })
    }

    async fn insert_nomination(
        &self,
        new: NewNomination,
    ) -> Result<FounderNomination, StoreError> {
        let row = founder_nomination::ActiveModel {
            id: NotSet,
            band_id: Set(new.band_id),
            nominator_id: Set(new.nominator_id),
            nominee_id: Set(new.nominee_id),
            reason: Set(new.reason),
            status: Set(NominationStatus::Pending.as_str().to_string()),
            version: Set(1),
            created_at: Set(to_db_time(new.created_at)),
            decided_at: Set(None),
        };
        let inserted = founder_nomination::Entity::insert(row)
            .exec_with_returning(&self.database)
            .await?;
        nomination_from_row(inserted)
    }

    async fn find_nomination(
        &self,
        id: NominationId,
    ) -> Result<Option<FounderNomination>, StoreError> {
        founder_nomination::Entity::find_by_id(id)
            .one(&self.database)
            .await?
            .map(nomination_from_row)
            .transpose()
    }

    async fn find_pending_nomination(
        &self,
        band_id: &str,
        nominee_id: &str,
    ) -> Result<Option<FounderNomination>, StoreError> {
        founder_nomination::Entity::find()
            .filter(founder_nomination::Column::BandId.eq(band_id))
            .filter(founder_nomination::Column::NomineeId.eq(nominee_id))
            .filter(founder_nomination::Column::Status.eq(NominationStatus::Pending.as_str()))
            .one(&self.database)
            .await?
            .map(nomination_from_row)
            .transpose()
    }

    async fn list_nomination_votes(
        &self,
        nomination_id: NominationId,
    ) -> Result<Vec<NominationVote>, StoreError> {
        founder_nomination_vote::Entity::find()
            .filter(founder_nomination_vote::Column::NominationId.eq(nomination_id))
            .order_by_asc(founder_nomination_vote::Column::VotedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(nomination_vote_from_row)
            .collect()
    }

    async fn record_nomination_vote(
        &self,
        vote: &NominationVote,
        next: &FounderNomination,
        expected_version: i64,
    ) -> Result<FounderNomination, StoreError> {
        let txn = self.database.begin().await?;
        lock_nomination(&txn, next.id, expected_version).await?;

        let row = founder_nomination_vote::ActiveModel {
            id: NotSet,
            nomination_id: Set(vote.nomination_id),
            founder_id: Set(vote.founder_id.clone()),
            choice: Set(vote.choice.as_str().to_string()),
            voted_at: Set(to_db_time(vote.voted_at)),
        };
        founder_nomination_vote::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    founder_nomination_vote::Column::NominationId,
                    founder_nomination_vote::Column::FounderId,
                ])
                .update_columns([
                    founder_nomination_vote::Column::Choice,
                    founder_nomination_vote::Column::VotedAt,
                ])
                .to_owned(),
            )
            .exec(&txn)
            .await?;

        let stored = write_nomination(&txn, next, expected_version).await?;
        txn.commit().await?;
        Ok(stored)
    }

    async fn save_nomination(
        &self,
        next: &FounderNomination,
        expected_version: i64,
    ) -> Result<FounderNomination, StoreError> {
        write_nomination(&self.database, next, expected_version).await
    }
}

async fn lock_proposal(
    txn: &DatabaseTransaction,
    id: ProposalId,
    expected_version: i64,
    exclusive: bool,
) -> Result<proposal::Model, StoreError> {
    let select = proposal::Entity::find_by_id(id);
    let select = if exclusive {
        select.lock_exclusive()
    } else {
        select.lock_shared()
    };
    let row = select.one(txn).await?.ok_or(StoreError::Missing {
        entity: "proposal",
        id,
    })?;
    if row.version != expected_version {
        return Err(StoreError::VersionConflict {
            entity: "proposal",
            id,
            expected: expected_version,
        });
    }
    Ok(row)
}

async fn lock_nomination(
    txn: &DatabaseTransaction,
    id: NominationId,
    expected_version: i64,
) -> Result<founder_nomination::Model, StoreError> {
    let row = founder_nomination::Entity::find_by_id(id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or(StoreError::Missing {
            entity: "nomination",
            id,
        })?;
    if row.version != expected_version {
        return Err(StoreError::VersionConflict {
            entity: "nomination",
            id,
            expected: expected_version,
        });
    }
    Ok(row)
}

async fn write_proposal<C: ConnectionTrait>(
    conn: &C,
    next: &Proposal,
    expected_version: i64,
) -> Result<Proposal, StoreError> {
    let mut row = proposal_to_active(next)?;
    row.id = NotSet;
    row.version = Set(expected_version + 1);

    let result = proposal::Entity::update_many()
        .set(row)
        .filter(proposal::Column::Id.eq(next.id))
        .filter(proposal::Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        let exists = proposal::Entity::find_by_id(next.id)
            .one(conn)
            .await?
            .is_some();
        return Err(if exists {
            StoreError::VersionConflict {
                entity: "proposal",
                id: next.id,
                expected: expected_version,
            }
        } else {
            StoreError::Missing {
                entity: "proposal",
                id: next.id,
            }
        });
    }

    let mut stored = next.clone();
    stored.version = expected_version + 1;
    Ok(stored)
}

async fn write_nomination<C: ConnectionTrait>(
    conn: &C,
    next: &FounderNomination,
    expected_version: i64,
) -> Result<FounderNomination, StoreError> {
    let row = founder_nomination::ActiveModel {
        id: NotSet,
        band_id: Set(next.band_id.clone()),
        nominator_id: Set(next.nominator_id.clone()),
        nominee_id: Set(next.nominee_id.clone()),
        reason: Set(next.reason.clone()),
        status: Set(next.status.as_str().to_string()),
        version: Set(expected_version + 1),
        created_at: Set(to_db_time(next.created_at)),
        decided_at: Set(next.decided_at.map(to_db_time)),
    };
    let result = founder_nomination::Entity::update_many()
        .set(row)
        .filter(founder_nomination::Column::Id.eq(next.id))
        .filter(founder_nomination::Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(StoreError::VersionConflict {
            entity: "nomination",
            id: next.id,
            expected: expected_version,
        });
    }

    let mut stored = next.clone();
    stored.version = expected_version + 1;
    Ok(stored)
}

async fn load_votes<C: ConnectionTrait>(
    conn: &C,
    proposal_id: ProposalId,
) -> Result<Vec<Vote>, StoreError> {
    proposal_vote::Entity::find()
        .filter(proposal_vote::Column::ProposalId.eq(proposal_id))
        .order_by_asc(proposal_vote::Column::VotedAt)
        .order_by_asc(proposal_vote::Column::UserId)
        .all(conn)
        .await?
        .into_iter()
        .map(vote_from_row)
        .collect()
}

fn proposal_to_active(p: &Proposal) -> Result<proposal::ActiveModel, StoreError> {
    let tally = p.final_tally;
    Ok(proposal::ActiveModel {
        id: Set(p.id),
        band_id: Set(p.band_id.clone()),
        created_by_id: Set(p.created_by_id.clone()),
        proposal_type: Set(p.proposal_type.as_str().to_string()),
        priority: Set(p.priority.as_str().to_string()),
        status: Set(p.status.as_str().to_string()),
        title: Set(p.content.title.clone()),
        content: Set(to_json(&p.content)?),
        submission_count: Set(to_column_count("submission_count", p.submission_count)?),
        edit_count: Set(to_column_count("edit_count", p.edit_count)?),
        version: Set(p.version),
        voting_started_at: Set(p.voting_started_at.map(to_db_time)),
        voting_ends_at: Set(p.voting_ends_at.map(to_db_time)),
        closed_at: Set(p.closed_at.map(to_db_time)),
        rejection_reason: Set(p.rejection_reason.clone()),
        reviewed_by_id: Set(p.reviewed_by_id.clone()),
        reviewed_at: Set(p.reviewed_at.map(to_db_time)),
        last_edit_reason: Set(p.last_edit_reason.clone()),
        votes_yes: Set(tally.map(|t| to_column_count("votes_yes", t.yes)).transpose()?),
        votes_no: Set(tally.map(|t| to_column_count("votes_no", t.no)).transpose()?),
        votes_abstain: Set(tally
            .map(|t| to_column_count("votes_abstain", t.abstain))
            .transpose()?),
        integrity_overrides: Set(to_json(&p.integrity_overrides)?),
        created_at: Set(to_db_time(p.created_at)),
        updated_at: Set(to_db_time(p.updated_at)),
    })
}

fn proposal_from_row(row: proposal::Model) -> Result<Proposal, StoreError> {
    let final_tally = match (row.votes_yes, row.votes_no, row.votes_abstain) {
        (Some(yes), Some(no), Some(abstain)) => Some(VoteCounts {
            yes: from_column_count("votes_yes", yes)?,
            no: from_column_count("votes_no", no)?,
            abstain: from_column_count("votes_abstain", abstain)?,
        }),
        (None, None, None) => None,
        _ => {
            return Err(StoreError::Corrupt(format!(
                "proposal {} has a partial tally",
                row.id
            )));
        }
    };

    Ok(Proposal {
        id: row.id,
        band_id: row.band_id,
        created_by_id: row.created_by_id,
        proposal_type: row.proposal_type.parse().map_err(corrupt)?,
        priority: row.priority.parse().map_err(corrupt)?,
        status: row.status.parse().map_err(corrupt)?,
        content: serde_json::from_value(row.content).map_err(corrupt)?,
        submission_count: from_column_count("submission_count", row.submission_count)?,
        edit_count: from_column_count("edit_count", row.edit_count)?,
        version: row.version,
        voting_started_at: row.voting_started_at.map(from_db_time),
        voting_ends_at: row.voting_ends_at.map(from_db_time),
        closed_at: row.closed_at.map(from_db_time),
        rejection_reason: row.rejection_reason,
        reviewed_by_id: row.reviewed_by_id,
        reviewed_at: row.reviewed_at.map(from_db_time),
        last_edit_reason: row.last_edit_reason,
        final_tally,
        integrity_overrides: serde_json::from_value(row.integrity_overrides).map_err(corrupt)?,
        created_at: from_db_time(row.created_at),
        updated_at: from_db_time(row.updated_at),
    })
}

fn vote_from_row(row: proposal_vote::Model) -> Result<Vote, StoreError> {
    Ok(Vote {
        proposal_id: row.proposal_id,
        user_id: row.user_id,
        choice: row.choice.parse().map_err(corrupt)?,
        comment: row.comment,
        voted_at: from_db_time(row.voted_at),
    })
}

fn nomination_from_row(row: founder_nomination::Model) -> Result<FounderNomination, StoreError> {
    Ok(FounderNomination {
        id: row.id,
        band_id: row.band_id,
        nominator_id: row.nominator_id,
        nominee_id: row.nominee_id,
        reason: row.reason,
        status: row.status.parse().map_err(corrupt)?,
        version: row.version,
        created_at: from_db_time(row.created_at),
        decided_at: row.decided_at.map(from_db_time),
    })
}

fn nomination_vote_from_row(
    row: founder_nomination_vote::Model,
) -> Result<NominationVote, StoreError> {
    Ok(NominationVote {
        nomination_id: row.nomination_id,
        founder_id: row.founder_id,
        choice: row.choice.parse().map_err(corrupt)?,
        voted_at: from_db_time(row.voted_at),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(corrupt)
}

fn to_column_count(label: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{label} exceeds i32 bounds")))
}

fn from_column_count(label: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{label} is negative")))
}

fn to_db_time(value: DateTime<Utc>) -> DateTimeWithTimeZone {
    value.fixed_offset()
}

fn from_db_time(value: DateTimeWithTimeZone) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

/// The delete must remove exactly the ballots read under the same lock.
fn ensure_reset_matches(proposal_id: i64, deleted: u64, read: usize) -> Result<(), StoreError> {
    if deleted == read as u64 {
        Ok(())
    } else {
        Err(StoreError::Corrupt(format!(
            "ballot reset of proposal {proposal_id} deleted {deleted} rows but read {read}"
        )))
    }
}

fn corrupt(err: impl Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}
