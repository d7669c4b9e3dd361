//! Shared application state, handed to every route via `axum::State`.
//! Trimmed down from the teacher's `AppState` (which carries ~20
//! `Option<Arc<...>>` service slots) to the handful this gateway
//! actually has, all mandatory since there is no "running without a
//! store" test mode here.

use std::sync::Arc;
use std::time::Instant;

use crate::api::auth::AuthService;
use crate::database::Store;
use crate::diagnostics::DiagnosticsService;
use crate::hls::HlsOrigin;
use crate::metrics::MetricsCollector;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub store: Arc<dyn Store>,
    pub orchestrator: Arc<Orchestrator>,
    pub hls_origin: Arc<HlsOrigin>,
    pub diagnostics: Arc<DiagnosticsService>,
    pub metrics: Arc<MetricsCollector>,
    pub auth: Arc<AuthService>,
}
