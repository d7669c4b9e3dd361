//! HTTP surface integration tests, exercising the router the way a real
//! client would: through `tower::ServiceExt::oneshot`, not by calling
//! handlers directly. Placed under `tests/` rather than `#[cfg(test)]`
//! mirroring where the teacher puts its cross-module integration suite.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceExt;

use xg2g::api::auth::AuthService;
use xg2g::api::routes::create_router;
use xg2g::api::state::AppState;
use xg2g::database::{InMemoryStore, Store};
use xg2g::diagnostics::DiagnosticsService;
use xg2g::eventbus::EventBus;
use xg2g::hls::HlsOrigin;
use xg2g::lease::LeaseManager;
use xg2g::metrics::MetricsCollector;
use xg2g::orchestrator::actor::SessionActorConfig;
use xg2g::orchestrator::Orchestrator;
use xg2g::pipeline::PipelineSupervisor;
use xg2g::receiver::{ReadyChecker, ReceiverClient};

const JWT_SECRET: &[u8] = b"integration-test-secret-32-chars";
const JWT_ISSUER: &str = "xg2g";
const JWT_AUDIENCE: &str = "xg2g-api";

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    scopes: Vec<String>,
    iss: String,
    aud: String,
    exp: u64,
    iat: u64,
}

fn token_with_scopes(scopes: &[&str]) -> String {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = TestClaims {
        sub: "test-client".to_string(),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        iss: JWT_ISSUER.to_string(),
        aud: JWT_AUDIENCE.to_string(),
        exp: now + 3600,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET)).unwrap()
}

fn test_app() -> (axum::Router, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let hls_root = PathBuf::from(std::env::temp_dir()).join(format!("xg2g-test-{}", uuid::Uuid::new_v4()));

    let lease_manager = Arc::new(LeaseManager::new(Arc::clone(&store), 30));
    let receiver = Arc::new(ReceiverClient::new("http://127.0.0.1:1".to_string()));
    let ready_checker = Arc::new(ReadyChecker::new(Arc::clone(&receiver)));
    let metrics = Arc::new(MetricsCollector::new());
    let supervisor = Arc::new(PipelineSupervisor::new(
        lease_manager,
        Arc::clone(&receiver),
        ready_checker,
        "ffmpeg".to_string(),
        hls_root.clone(),
        Duration::from_secs(5),
        Arc::clone(&metrics),
    ));

    let event_bus = EventBus::new();
    let actor_config = Arc::new(SessionActorConfig {
        hls_root: hls_root.clone(),
        max_hard_resets: 3,
        hard_reset_window_secs: 60,
        drain_grace_secs: 15,
        tuner_count: 2,
    });

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        supervisor,
        event_bus,
        actor_config,
        Arc::clone(&metrics),
        b"test-intent-secret".to_vec(),
        300,
    ));

    let hls_origin = Arc::new(HlsOrigin::new(hls_root, Arc::clone(&store)));
    let diagnostics = Arc::new(DiagnosticsService::new(Arc::clone(&store), receiver));
    let auth = Arc::new(AuthService::new(JWT_SECRET, JWT_ISSUER, JWT_AUDIENCE));

    let state = AppState {
        start_time: Instant::now(),
        store: Arc::clone(&store),
        orchestrator,
        hls_origin,
        diagnostics,
        metrics,
        auth,
    };

    (create_router(state), store)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_reachable_without_auth() {
    let (app, _store) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/api/v3/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status() == StatusCode::OK || response.status() == StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert!(body.get("overall").is_some());
}

#[tokio::test]
async fn create_intent_without_token_is_unauthorized() {
    let (app, _store) = test_app();

    let payload = json!({
        "type": "live",
        "serviceRef": "1:0:1:3EF2:465:2:11A0000:0:0:0:",
        "profileId": "safari",
        "owner": "test-owner",
        "correlationId": "corr-1",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v3/intents")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn create_intent_with_write_scope_creates_a_session() {
    let (app, _store) = test_app();
    let token = token_with_scopes(&["v3:write"]);

    let payload = json!({
        "type": "live",
        "serviceRef": "1:0:1:3EF2:465:2:11A0000:0:0:0:",
        "profileId": "safari",
        "owner": "test-owner",
        "correlationId": "corr-2",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v3/intents")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["session_id"].as_str().is_some());
}

#[tokio::test]
async fn read_scope_cannot_create_intents() {
    let (app, _store) = test_app();
    let token = token_with_scopes(&["v3:read"]);

    let payload = json!({
        "type": "live",
        "serviceRef": "1:0:1:3EF2:465:2:11A0000:0:0:0:",
        "profileId": "safari",
        "owner": "test-owner",
        "correlationId": "corr-3",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v3/intents")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn get_session_round_trips_through_create_intent() {
    let (app, _store) = test_app();
    let write_token = token_with_scopes(&["v3:write"]);
    let read_token = token_with_scopes(&["v3:read"]);

    let payload = json!({
        "type": "live",
        "serviceRef": "1:0:1:3EF2:465:2:11A0000:0:0:0:",
        "profileId": "safari",
        "owner": "test-owner",
        "correlationId": "corr-4",
    });

    let create_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v3/intents")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {write_token}"))
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_response.status(), StatusCode::ACCEPTED);
    let created = body_json(create_response).await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let get_response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v3/sessions/{session_id}"))
                .header("authorization", format!("Bearer {read_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(get_response.status(), StatusCode::OK);
    let session = body_json(get_response).await;
    assert_eq!(session["id"], session_id);
}

#[tokio::test]
async fn get_unknown_session_is_not_found() {
    let (app, _store) = test_app();
    let read_token = token_with_scopes(&["v3:read"]);
    let missing_id = uuid::Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v3/sessions/{missing_id}"))
                .header("authorization", format!("Bearer {read_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
