//! OpenAPI 3.0 spec generation via `utoipa`, served alongside Swagger UI
//! (spec.md ambient stack; grounded on the teacher's `api::openapi::ApiDoc`).

use utoipa::OpenApi;

use crate::api::error::ProblemDetails;
use crate::api::routes::intents::{CreateIntentRequest, CreateIntentResponse, IntentTypeWire};
use crate::api::routes::sessions::FeedbackRequest;
use crate::diagnostics::{Criticality, DiagnosticsReport, Source, Status, SubsystemHealth};
use crate::domain::{PipelineId, ReasonCode, Session, SessionId, SessionState, ServiceRef};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "xg2g gateway API",
        version = "3.0.0",
        description = "Receiver-to-HLS streaming gateway: session/pipeline control plane over an OpenWebIF set-top box.",
        license(name = "MIT OR Apache-2.0")
    ),
    tags(
        (name = "intents", description = "Start/stop intent acceptance"),
        (name = "sessions", description = "Session state and control"),
        (name = "health", description = "Diagnostics report"),
    ),
    paths(
        crate::api::routes::intents::create_intent,
        crate::api::routes::sessions::get_session,
        crate::api::routes::sessions::stop_session,
        crate::api::routes::sessions::feedback_session,
        crate::api::routes::health::healthz,
    ),
    components(schemas(
        CreateIntentRequest,
        CreateIntentResponse,
        IntentTypeWire,
        FeedbackRequest,
        Session,
        SessionId,
        PipelineId,
        ServiceRef,
        SessionState,
        ReasonCode,
        DiagnosticsReport,
        SubsystemHealth,
        Status,
        Source,
        Criticality,
        ProblemDetails,
    )),
    security(("bearer_auth" = [])),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
