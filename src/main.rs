use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use trellis::api::{create_dead_letter_router, create_router, AppState, DeadLetterAppState};
use trellis::config::{new_runtime_config, TrellisConfig};
use trellis::connector::ConnectorKind;
use trellis::dispatch::{Dispatcher, HandlerRegistry, WILDCARD_EVENT};
use trellis::handlers::AuditTrailHandler;
use trellis::lane::{DeadLetterStore, IntegrationLane, MemoryDedupeStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trellis=info".into()),
        )
        .init();

    info!("Trellis starting...");

    let config = match std::env::var("TRELLIS_CONFIG") {
        Ok(path) => TrellisConfig::load(&path)?,
        Err(_) => TrellisConfig::from_env(),
    };

    // Handler registrations are startup configuration: every kind gets the
    // best-effort audit trail; domain services register their own critical
    // handlers here as they come online.
    let audit = Arc::new(AuditTrailHandler::new());
    let mut registry = HandlerRegistry::new();
    for kind in ConnectorKind::ALL {
        registry.register(*kind, WILDCARD_EVENT, false, audit.clone());
    }

    let dispatcher = Dispatcher::new(registry);
    let dedupe = Arc::new(MemoryDedupeStore::new());
    let dead_letters = Arc::new(DeadLetterStore::new());

    let lane = Arc::new(IntegrationLane::start(
        config.lane.clone(),
        dispatcher,
        dedupe,
        Arc::clone(&dead_letters),
    ));
    info!(workers = config.lane.workers, "Integration lane started");

    let runtime_config = new_runtime_config();
    let app = create_router(AppState {
        lane,
        runtime_config,
    })
    .merge(create_dead_letter_router(DeadLetterAppState { dead_letters }))
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.api.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind_addr))?;
    info!(addr = %config.api.bind_addr, "API listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
