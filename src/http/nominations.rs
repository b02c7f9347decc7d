use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::models::governance::VoteChoice;
use crate::models::nomination::{FounderNomination, NominationAck};
use crate::models::{NominationId, UserId};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bands/{band_id}/nominations", post(nominate_founder))
        .route("/nominations/{nomination_id}", get(get_nomination))
        .route("/nominations/{nomination_id}/votes", post(vote_on_nomination))
        .route(
            "/nominations/{nomination_id}/finalize",
            post(finalize_nomination),
        )
        .route(
            "/nominations/{nomination_id}/withdraw",
            post(withdraw_nomination),
        )
}

#[derive(Debug, Deserialize)]
struct NominateRequest {
    actor_id: UserId,
    nominee_id: UserId,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct NominationVoteRequest {
    actor_id: UserId,
    choice: VoteChoice,
}

#[derive(Debug, Deserialize)]
struct ActorRequest {
    actor_id: UserId,
}

async fn nominate_founder(
    Path(band_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<NominateRequest>,
) -> Result<(StatusCode, Json<FounderNomination>), HttpError> {
    let nomination = state
        .engine
        .nominate_as_founder(
            &band_id,
            &request.actor_id,
            &request.nominee_id,
            &request.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(nomination)))
}

async fn get_nomination(
    Path(nomination_id): Path<NominationId>,
    State(state): State<AppState>,
) -> Result<Json<FounderNomination>, HttpError> {
    Ok(Json(state.engine.get_nomination(nomination_id).await?))
}

async fn vote_on_nomination(
    Path(nomination_id): Path<NominationId>,
    State(state): State<AppState>,
    Json(request): Json<NominationVoteRequest>,
) -> Result<Json<NominationAck>, HttpError> {
    let ack = state
        .engine
        .vote_on_nomination(nomination_id, &request.actor_id, request.choice)
        .await?;
    Ok(Json(ack))
}

async fn finalize_nomination(
    Path(nomination_id): Path<NominationId>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<NominationAck>, HttpError> {
    let ack = state
        .engine
        .finalize_nomination(nomination_id, &request.actor_id)
        .await?;
    Ok(Json(ack))
}

async fn withdraw_nomination(
    Path(nomination_id): Path<NominationId>,
    State(state): State<AppState>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<FounderNomination>, HttpError> {
    let nomination = state
        .engine
        .withdraw_nomination(nomination_id, &request.actor_id)
        .await?;
    Ok(Json(nomination))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::http::test_support::{app, send};
    use crate::testing::{Harness, BAND, FOUNDER_A, FOUNDER_B, GOVERNOR};

    #[tokio::test]
    async fn nomination_flow_over_http() {
        let harness = Harness::new();
        let (router, _) = app(&harness);

        let (status, nomination) = send(
            &router,
            "POST",
            &format!("/bands/{BAND}/nominations"),
            Some(json!({
                "actor_id": FOUNDER_A,
                "nominee_id": GOVERNOR,
                "reason": "Has carried the band through two tours"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(nomination["status"], "PENDING");
        let id = nomination["id"].as_i64().unwrap();

        let (status, ack) = send(
            &router,
            "POST",
            &format!("/nominations/{id}/votes"),
            Some(json!({ "actor_id": FOUNDER_A, "choice": "YES" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["outstanding"], json!([FOUNDER_B]));

        let (status, body) = send(
            &router,
            "POST",
            &format!("/nominations/{id}/votes"),
            Some(json!({ "actor_id": GOVERNOR, "choice": "YES" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "PERMISSION_DENIED");

        let (status, ack) = send(
            &router,
            "POST",
            &format!("/nominations/{id}/votes"),
            Some(json!({ "actor_id": FOUNDER_B, "choice": "NO" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["status"], "REJECTED");

        let (status, fetched) = send(&router, "GET", &format!("/nominations/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["status"], "REJECTED");

        let (status, _) = send(
            &router,
            "POST",
            &format!("/nominations/{id}/withdraw"),
            Some(json!({ "actor_id": FOUNDER_A })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
