use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{ErrorKind, GovernanceError};
use crate::models::integrity::IntegrityIssue;
use crate::state::AppState;

mod nominations;
mod proposals;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .merge(proposals::router())
        .merge(nominations::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "live",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .engine
        .store()
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    Ok(Json(ReadyResponse {
        status: "ready",
        cached_proposals: state.cache.proposals.entry_count(),
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    cached_proposals: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    kind: Option<ErrorKind>,
    issues: Vec<IntegrityIssue>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self {
            status,
            message,
            kind: None,
            issues: Vec::new(),
        }
    }
}

impl From<GovernanceError> for HttpError {
    fn from(err: GovernanceError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidState | ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
            ErrorKind::ValidationError
            | ErrorKind::LimitExceeded
            | ErrorKind::IntegrityBlocked => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::CollaboratorUnavailable => StatusCode::BAD_GATEWAY,
        };
        let message = err.to_string();
        let issues = match err {
            GovernanceError::IntegrityBlocked { issues, .. } => issues,
            _ => Vec::new(),
        };
        Self {
            status,
            message,
            kind: Some(kind),
            issues,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("HTTP error: {}", self.message);
        } else {
            info!("HTTP error: {}", self.message);
        }
        let body = Json(ErrorBody {
            error: self.message,
            kind: self.kind,
            issues: self.issues,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<IntegrityIssue>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::CacheConfig;
    use crate::state::{ApiCache, AppState};
    use crate::testing::Harness;

    pub fn app(harness: &Harness) -> (Router, AppState) {
        let cache = Arc::new(ApiCache::new(&CacheConfig {
            proposals_max_capacity: 64,
            proposals_ttl_seconds: 60,
        }));
        let state = AppState::new(harness.engine.clone(), cache);
        (super::router(state.clone()), state)
    }

    pub async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}
