//! Route modules, composed by resource (spec.md §6 HTTP surface).

pub mod health;
pub mod hls;
pub mod intents;
pub mod sessions;

use axum::Router;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::middleware::ScopeAuthLayer;
use crate::api::openapi::ApiDoc;
use crate::api::state::AppState;
use utoipa::OpenApi;

const PREFIX: &str = "/api/v3";

/// Public: `/healthz`. Everything else under `/api/v3` requires a bearer
/// token with the matching scope (spec.md §6: "Unauthorized/forbidden
/// responses must have zero side-effects", so the scope layer runs
/// before any handler body executes).
pub fn create_router(state: AppState) -> Router {
    let read_routes: Router<AppState> = Router::new()
        .merge(sessions_read_router())
        .merge(hls::router())
        .layer(ScopeAuthLayer::new(state.auth.clone(), "v3:read"));

    let write_routes: Router<AppState> = Router::new()
        .merge(intents::router())
        .merge(sessions_write_router())
        .layer(ScopeAuthLayer::new(state.auth.clone(), "v3:write"));

    Router::new()
        .nest(PREFIX, Router::new().merge(read_routes).merge(write_routes))
        .nest(PREFIX, health::router())
        .merge(SwaggerUi::new(format!("{PREFIX}/docs")).url(format!("{PREFIX}/docs/openapi.json"), ApiDoc::openapi()))
        .with_state(state)
}

fn sessions_read_router() -> Router<AppState> {
    Router::new().route("/sessions/{id}", axum::routing::get(sessions::get_session))
}

fn sessions_write_router() -> Router<AppState> {
    Router::new()
        .route("/sessions/{id}/stop", axum::routing::post(sessions::stop_session))
        .route("/sessions/{id}/feedback", axum::routing::post(sessions::feedback_session))
}
