//! xg2g - Receiver-to-HLS streaming gateway
//!
//! Turns an OpenWebIF-speaking set-top box into an HTTP/HLS source
//! consumable by generic players.

use std::sync::Arc;

use tracing::{error, info, warn};
use xg2g::api::state::AppState;
use xg2g::api::{auth::AuthService, ApiServer};
use xg2g::config::GatewayConfig;
use xg2g::database::{SqliteStore, Store};
use xg2g::diagnostics::DiagnosticsService;
use xg2g::eventbus::EventBus;
use xg2g::hls::HlsOrigin;
use xg2g::lease::LeaseManager;
use xg2g::logging::init_logging;
use xg2g::metrics::MetricsCollector;
use xg2g::orchestrator::actor::SessionActorConfig;
use xg2g::orchestrator::Orchestrator;
use xg2g::pipeline::PipelineSupervisor;
use xg2g::receiver::{ReadyChecker, ReceiverClient};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _guard = init_logging(&log_dir).map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!("starting xg2g v{}", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();

    let config = GatewayConfig::from_env()?;

    info!(store_path = %config.store_path, "connecting to store");
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&config.store_path).await?);

    // Lease keyspace from a prior process is meaningless once that
    // process is gone; the wipe must complete before the orchestrator
    // (and therefore any resumed session) can touch a lease.
    let lease_manager = Arc::new(LeaseManager::new(Arc::clone(&store), config.lease_ttl_secs));
    info!("wiping stale leases from a prior process");
    let leases_wiped = lease_manager.wipe_all().await?;

    let receiver = Arc::new(ReceiverClient::new(config.e2_base_url()));
    let ready_checker = Arc::new(ReadyChecker::new(Arc::clone(&receiver)));
    let metrics = Arc::new(MetricsCollector::new());

    let supervisor = Arc::new(PipelineSupervisor::new(
        Arc::clone(&lease_manager),
        Arc::clone(&receiver),
        ready_checker,
        config.ffmpeg_bin.clone(),
        config.hls_root.clone(),
        config.ready_timeout,
        Arc::clone(&metrics),
    ));

    let event_bus = EventBus::new();

    let actor_config = Arc::new(SessionActorConfig {
        hls_root: config.hls_root.clone(),
        max_hard_resets: config.max_hard_resets,
        hard_reset_window_secs: config.hard_reset_window_secs,
        drain_grace_secs: config.drain_grace_secs,
        tuner_count: config.tuner_count,
    });

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&supervisor),
        Arc::clone(&event_bus),
        actor_config,
        Arc::clone(&metrics),
        config.intent_secret.clone(),
        config.session_ttl_secs,
    ));

    let resumed = orchestrator.resume_non_terminal_sessions(leases_wiped).await?;
    if resumed > 0 {
        warn!(resumed, "resumed non-terminal sessions after restart");
    }

    let hls_origin = Arc::new(HlsOrigin::new(config.hls_root.clone(), Arc::clone(&store)));
    let diagnostics = Arc::new(DiagnosticsService::new(Arc::clone(&store), Arc::clone(&receiver)));
    let auth = Arc::new(AuthService::new(&config.jwt_secret, &config.jwt_issuer, &config.jwt_audience));

    let state = AppState {
        start_time: std::time::Instant::now(),
        store,
        orchestrator,
        hls_origin,
        diagnostics,
        metrics,
        auth,
    };

    let server = ApiServer::new(config.bind_address.clone(), config.port, config.enable_cors, state);
    let cancel_token = server.cancel_token();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "API server exited with an error");
        }
    });

    info!("xg2g started successfully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT (Ctrl+C), initiating shutdown...");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, initiating shutdown...");
        }
    }

    cancel_token.cancel();
    if let Err(e) = server_handle.await {
        error!(error = %e, "API server task panicked during shutdown");
    }

    info!("xg2g shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
