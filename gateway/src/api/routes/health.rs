//! `GET /healthz` (spec.md §4.9): the diagnostics report, unauthenticated
//! so infra probes and load balancers can poll it directly.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::state::AppState;
use crate::diagnostics::{DiagnosticsReport, Status};

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

#[utoipa::path(
    get,
    path = "/api/v3/healthz",
    tag = "health",
    responses(
        (status = 200, description = "Diagnostics report", body = DiagnosticsReport),
        (status = 503, description = "Overall status is unavailable", body = DiagnosticsReport),
    )
)]
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.diagnostics.report().await;
    let status = match report.overall {
        Status::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}
