//! `GET|HEAD /sessions/{id}/hls/*` — the HLS origin surface (spec.md
//! §4.6). axum dispatches HEAD to a GET handler automatically, dropping
//! the body but keeping headers, which is exactly what Safari's
//! Content-Length probe (scenario S3) needs.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::domain::Profile;
use crate::hls::OriginResponse;

pub fn router() -> Router<AppState> {
    Router::new().route("/sessions/{id}/hls/{filename}", get(serve_file))
}

pub async fn serve_file(
    State(state): State<AppState>,
    Path((id, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let session_id = id.parse().map_err(|_| ApiError::bad_request("session id is not a valid uuid"))?;

    let session = state.orchestrator.get_state(session_id).await;
    let profile = match &session {
        Ok(s) => Profile::by_id(&s.profile_id),
        Err(_) => Profile::safari(),
    };

    match state.hls_origin.get(session_id, &filename, &profile).await? {
        OriginResponse::Ok { body, content_type } => {
            let mut response = Response::new(Body::from(body));
            response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            if content_type == "application/vnd.apple.mpegurl" {
                response
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            } else {
                response
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
            }
            Ok(response)
        }
        OriginResponse::NotFound => Err(ApiError::not_found("session or file not found")),
        OriginResponse::Gone => {
            let mut response = ApiError::gone("stream ended").into_response();
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            Ok(response)
        }
    }
}

