use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use escalation_cell::EscalationService;
use realtime_cell::RealtimeHub;
use shared_config::AppConfig;
use shared_database::InMemoryStore;
use shared_models::Doctor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic realtime API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Wire the realtime layer and the escalation service once, here
    let store = InMemoryStore::with_doctors(load_seed_doctors()?).await;
    let hub = RealtimeHub::new(config.clone());
    let escalations = EscalationService::new(
        &config,
        Arc::new(store.clone()),
        Arc::new(store),
        hub.clone(),
    );
    hub.set_session_observer(escalations.session_observer()).await;
    let _sweeper = hub.spawn_idle_sweeper();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(hub, escalations)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Doctor records come from the portal's own storage. For a standalone
/// process they can be seeded from a JSON file named by `SEED_DOCTORS_FILE`.
fn load_seed_doctors() -> anyhow::Result<Vec<Doctor>> {
    let Ok(path) = std::env::var("SEED_DOCTORS_FILE") else {
        warn!("SEED_DOCTORS_FILE not set, starting with no doctors");
        return Ok(Vec::new());
    };

    let raw = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?;
    let doctors: Vec<Doctor> =
        serde_json::from_str(&raw).with_context(|| format!("invalid doctor seed file {}", path))?;

    info!("Seeded {} doctor(s) from {}", doctors.len(), path);
    Ok(doctors)
}
