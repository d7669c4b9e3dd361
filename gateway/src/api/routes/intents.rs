//! `POST /intents` (spec.md §4.8).

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::domain::intent::IntentType;
use crate::domain::ServiceRef;
use crate::orchestrator::IntentRequest;

pub fn router() -> Router<AppState> {
    Router::new().route("/intents", post(create_intent))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    #[serde(rename = "type")]
    pub intent_type: IntentTypeWire,
    pub service_ref: String,
    pub profile_id: String,
    pub owner: String,
    pub correlation_id: String,
    pub start_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntentTypeWire {
    Live,
    Vod,
}

impl From<IntentTypeWire> for IntentType {
    fn from(w: IntentTypeWire) -> Self {
        match w {
            IntentTypeWire::Live => IntentType::Live,
            IntentTypeWire::Vod => IntentType::Vod,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateIntentResponse {
    pub session_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v3/intents",
    tag = "intents",
    request_body = CreateIntentRequest,
    responses(
        (status = 202, description = "Intent accepted", body = CreateIntentResponse),
        (status = 400, description = "Invalid payload", body = crate::api::error::ProblemDetails),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_intent(
    State(state): State<AppState>,
    Json(body): Json<CreateIntentRequest>,
) -> ApiResult<(StatusCode, Json<CreateIntentResponse>)> {
    let service_ref = ServiceRef::normalize(&body.service_ref)
        .ok_or_else(|| ApiError::bad_request("serviceRef is not a valid Enigma2 reference"))?;

    let req = IntentRequest {
        intent_type: body.intent_type.into(),
        service_ref,
        profile_id: body.profile_id,
        owner: body.owner,
        correlation_id: body.correlation_id,
        start_ms: body.start_ms,
    };

    let session_id = state.orchestrator.accept_intent(req).await?;

    Ok((StatusCode::ACCEPTED, Json(CreateIntentResponse { session_id: session_id.to_string() })))
}
