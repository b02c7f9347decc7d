use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use crate::governance::lifecycle::CloseOutcome;
use crate::models::governance::{
    Proposal, ProposalContent, ProposalDraft, ProposalPriority, ProposalType, Vote, VoteAck,
    VoteChoice,
};
use crate::models::integrity::IntegrityAck;
use crate::models::{ProposalId, UserId};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bands/{band_id}/proposals", post(create_proposal))
        .route("/proposals/{proposal_id}", get(get_proposal).put(edit_proposal))
        .route("/proposals/{proposal_id}/submit", post(submit_proposal))
        .route("/proposals/{proposal_id}/approve", post(approve_proposal))
        .route("/proposals/{proposal_id}/reject", post(reject_proposal))
        .route("/proposals/{proposal_id}/withdraw", post(withdraw_proposal))
        .route("/proposals/{proposal_id}/close", post(close_proposal))
        .route("/proposals/{proposal_id}/archive", post(archive_proposal))
        .route(
            "/proposals/{proposal_id}/votes",
            get(list_votes).post(cast_vote),
        )
}

#[derive(Debug, Deserialize)]
struct ActorRequest {
    actor_id: UserId,
}

#[derive(Debug, Deserialize)]
struct CreateProposalRequest {
    actor_id: UserId,
    proposal_type: ProposalType,
    #[serde(default)]
    priority: ProposalPriority,
    content: ProposalContent,
    #[serde(default)]
    proceed_with_flags: bool,
}

#[derive(Debug, Deserialize)]
struct EditProposalRequest {
    actor_id: UserId,
    content: ProposalContent,
    edit_reason: Option<String>,
    #[serde(default)]
    proceed_with_flags: bool,
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    actor_id: UserId,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    actor_id: UserId,
    choice: VoteChoice,
    comment: Option<String>,
}

fn require_actor(actor_id: &str) -> Result<(), HttpError> {
    if actor_id.trim().is_empty() {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "actor_id must be provided".to_string(),
        ));
    }
    Ok(())
}

async fn create_proposal(
    Path(band_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<Proposal>), HttpError> {
    require_actor(&request.actor_id)?;
    let draft = ProposalDraft {
        proposal_type: request.proposal_type,
        priority: request.priority,
        content: request.content,
    };
    let ack = IntegrityAck {
        proceed_with_flags: request.proceed_with_flags,
    };
    let proposal = state
        .engine
        .create_proposal(&band_id, &request.actor_id, draft, ack)
        .await?;
    state.cache.remember(&proposal).await;
    Ok((StatusCode::CREATED, Json(proposal)))
}

async fn get_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
) -> Result<Json<Proposal>, HttpError> {
    if let Some(cached) = state.cache.proposals.get(&proposal_id).await {
        debug!(proposal_id, "proposal served from cache");
        return Ok(Json(Arc::unwrap_or_clone(cached)));
    }
    let proposal = state.engine.get_proposal(proposal_id).await?;
    state.cache.remember(&proposal).await;
    Ok(Json(proposal))
}

async fn edit_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<EditProposalRequest>,
) -> Result<Json<Proposal>, HttpError> {
    require_actor(&request.actor_id)?;
    state.cache.forget(proposal_id).await;
    let ack = IntegrityAck {
        proceed_with_flags: request.proceed_with_flags,
    };
    let proposal = state
        .engine
        .edit_proposal(
            proposal_id,
            &request.actor_id,
            request.content,
            request.edit_reason.as_deref(),
            ack,
        )
        .await?;
    state.cache.remember(&proposal).await;
    Ok(Json(proposal))
}

async fn submit_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<Proposal>, HttpError> {
    require_actor(&request.actor_id)?;
    state.cache.forget(proposal_id).await;
    let proposal = state
        .engine
        .submit_for_review(proposal_id, &request.actor_id)
        .await?;
    state.cache.remember(&proposal).await;
    Ok(Json(proposal))
}

async fn approve_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<Proposal>, HttpError> {
    require_actor(&request.actor_id)?;
    state.cache.forget(proposal_id).await;
    let proposal = state
        .engine
        .approve_proposal(proposal_id, &request.actor_id)
        .await?;
    state.cache.remember(&proposal).await;
    Ok(Json(proposal))
}

async fn reject_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Proposal>, HttpError> {
    require_actor(&request.actor_id)?;
    state.cache.forget(proposal_id).await;
    let proposal = state
        .engine
        .reject_proposal(proposal_id, &request.actor_id, &request.reason)
        .await?;
    state.cache.remember(&proposal).await;
    Ok(Json(proposal))
}

async fn withdraw_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<Proposal>, HttpError> {
    require_actor(&request.actor_id)?;
    state.cache.forget(proposal_id).await;
    let proposal = state
        .engine
        .withdraw_proposal(proposal_id, &request.actor_id)
        .await?;
    state.cache.remember(&proposal).await;
    Ok(Json(proposal))
}

async fn close_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<CloseOutcome>, HttpError> {
    require_actor(&request.actor_id)?;
    state.cache.forget(proposal_id).await;
    let outcome = state
        .engine
        .close_proposal(proposal_id, &request.actor_id)
        .await?;
    state.cache.remember(&outcome.proposal).await;
    Ok(Json(outcome))
}

async fn archive_proposal(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<Proposal>, HttpError> {
    require_actor(&request.actor_id)?;
    state.cache.forget(proposal_id).await;
    let proposal = state
        .engine
        .archive_proposal(proposal_id, &request.actor_id)
        .await?;
    state.cache.remember(&proposal).await;
    Ok(Json(proposal))
}

async fn list_votes(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Vote>>, HttpError> {
    let votes = state.engine.list_votes(proposal_id).await?;
    Ok(Json(votes))
}

async fn cast_vote(
    Path(proposal_id): Path<ProposalId>,
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteAck>, HttpError> {
    require_actor(&request.actor_id)?;
    let ack = state
        .engine
        .cast_vote(proposal_id, &request.actor_id, request.choice, request.comment)
        .await?;
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::http::test_support::{app, send};
    use crate::models::governance::{ProposalStatus, ProposalType, VoteChoice};
    use crate::testing::{Harness, AUTHOR, BAND, FOUNDER_A, VOTERS};

    fn create_body() -> serde_json::Value {
        json!({
            "actor_id": AUTHOR,
            "proposal_type": "GENERAL",
            "content": {
                "title": "New rehearsal schedule",
                "description": "Move rehearsals to Thursday evenings."
            }
        })
    }

    #[tokio::test]
    async fn full_proposal_flow_over_http() {
        let harness = Harness::new();
        let (router, _) = app(&harness);

        let (status, created) =
            send(&router, "POST", &format!("/bands/{BAND}/proposals"), Some(create_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "DRAFT");
        assert_eq!(created["priority"], "MEDIUM");
        let id = created["id"].as_i64().unwrap();

        let (status, opened) = send(
            &router,
            "POST",
            &format!("/proposals/{id}/submit"),
            Some(json!({ "actor_id": AUTHOR })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["status"], "OPEN");

        for voter in VOTERS {
            let (status, ack) = send(
                &router,
                "POST",
                &format!("/proposals/{id}/votes"),
                Some(json!({ "actor_id": voter, "choice": "YES" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(ack["replaced_previous"], false);
        }

        let (status, votes) = send(&router, "GET", &format!("/proposals/{id}/votes"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(votes.as_array().unwrap().len(), 3);

        let (status, outcome) = send(
            &router,
            "POST",
            &format!("/proposals/{id}/close"),
            Some(json!({ "actor_id": FOUNDER_A })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["status"], "APPROVED");
        assert_eq!(outcome["tally"]["yes"], 3);

        let (status, fetched) = send(&router, "GET", &format!("/proposals/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["status"], "APPROVED");
    }

    #[tokio::test]
    async fn errors_carry_kind_and_status() {
        let harness = Harness::new();
        let (router, _) = app(&harness);
        let proposal = harness.open(ProposalType::Dissolution).await;

        let (status, body) = send(
            &router,
            "POST",
            &format!("/proposals/{}/votes", proposal.id),
            Some(json!({ "actor_id": VOTERS[0], "choice": "ABSTAIN" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "VALIDATION_ERROR");

        let (status, body) = send(&router, "GET", "/proposals/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NOT_FOUND");

        let (status, _) = send(
            &router,
            "POST",
            &format!("/proposals/{}/close", proposal.id),
            Some(json!({ "actor_id": VOTERS[1] })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &router,
            "POST",
            &format!("/proposals/{}/submit", proposal.id),
            Some(json!({ "actor_id": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn edits_invalidate_the_cached_view() {
        let harness = Harness::new();
        let (router, state) = app(&harness);
        let draft = harness.draft(ProposalType::Project).await;

        let (status, _) = send(&router, "GET", &format!("/proposals/{}", draft.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.cache.proposals.get(&draft.id).await.is_some());

        let (status, edited) = send(
            &router,
            "PUT",
            &format!("/proposals/{}", draft.id),
            Some(json!({
                "actor_id": AUTHOR,
                "content": {
                    "title": "Studio album",
                    "description": "Record ten songs this winter."
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["edit_count"], 1);

        let (_, fetched) = send(&router, "GET", &format!("/proposals/{}", draft.id), None).await;
        assert_eq!(fetched["content"]["title"], "Studio album");
    }

    #[tokio::test]
    async fn transitions_refresh_the_cached_view() {
        let harness = Harness::new();
        let (router, state) = app(&harness);
        let draft = harness.draft(ProposalType::General).await;

        let (_, fetched) = send(&router, "GET", &format!("/proposals/{}", draft.id), None).await;
        assert_eq!(fetched["status"], "DRAFT");

        let (status, _) = send(
            &router,
            "POST",
            &format!("/proposals/{}/submit", draft.id),
            Some(json!({ "actor_id": AUTHOR })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // A read that loaded the row before the submit committed lands late.
        state.cache.remember(&draft).await;

        let (_, fetched) = send(&router, "GET", &format!("/proposals/{}", draft.id), None).await;
        assert_eq!(fetched["status"], "OPEN");

        harness.cast(draft.id, VOTERS[0], VoteChoice::Yes).await;
        let (status, _) = send(
            &router,
            "POST",
            &format!("/proposals/{}/close", draft.id),
            Some(json!({ "actor_id": AUTHOR })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let cached = state.cache.proposals.get(&draft.id).await.unwrap();
        assert_eq!(cached.status, ProposalStatus::Approved);
    }
}
