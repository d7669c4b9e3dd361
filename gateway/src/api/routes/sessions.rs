//! `GET /sessions/{id}`, `POST /sessions/{id}/stop`,
//! `POST /sessions/{id}/feedback` (spec.md §4.8).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::domain::{Session, SessionId};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/stop", post(stop_session))
        .route("/sessions/{id}/feedback", post(feedback_session))
}

fn parse_id(raw: &str) -> ApiResult<SessionId> {
    raw.parse().map_err(|_| ApiError::bad_request("session id is not a valid uuid"))
}

#[utoipa::path(
    get,
    path = "/api/v3/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session record", body = Session),
        (status = 404, description = "Unknown session", body = crate::api::error::ProblemDetails),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Session>> {
    let id = parse_id(&id)?;
    let session = state.orchestrator.get_state(id).await?;
    Ok(Json(session))
}

#[utoipa::path(
    post,
    path = "/api/v3/sessions/{id}/stop",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 202, description = "Stop accepted"),
        (status = 404, description = "Unknown session", body = crate::api::error::ProblemDetails),
    ),
    security(("bearer_auth" = []))
)]
pub async fn stop_session(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state.orchestrator.stop(id).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    pub event: String,
    pub code: i64,
}

#[utoipa::path(
    post,
    path = "/api/v3/sessions/{id}/feedback",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    request_body = FeedbackRequest,
    responses(
        (status = 202, description = "Feedback accepted, fallback trigger queued"),
        (status = 404, description = "Unknown session", body = crate::api::error::ProblemDetails),
    ),
    security(("bearer_auth" = []))
)]
pub async fn feedback_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FeedbackRequest>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state.orchestrator.feedback(id, body.event, body.code).await?;
    Ok(StatusCode::ACCEPTED)
}
