use anyhow::{Context, Result};
use driver_hub::{create_admin_router, default_drivers, DriverHubAppState, DriverRegistry, HealthChecker};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use trellis::connector::{ConnectorStore, SqliteConnectorStore};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_DB_PATH: &str = "connectors.db";
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driver_hub=info,trellis=info".into()),
        )
        .init();

    info!("Driver hub starting...");

    let encryption_key = std::env::var("DRIVER_HUB_ENCRYPTION_KEY")
        .context("DRIVER_HUB_ENCRYPTION_KEY must be set (base64-encoded 32-byte key)")?;
    let db_path =
        std::env::var("DRIVER_HUB_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let bind_addr =
        std::env::var("DRIVER_HUB_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let check_interval = std::env::var("DRIVER_HUB_CHECK_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);

    let store: Arc<dyn ConnectorStore> =
        Arc::new(SqliteConnectorStore::new(&db_path, &encryption_key)?);
    info!(db_path = %db_path, "Connector store opened");

    let registry = Arc::new(
        DriverRegistry::new(default_drivers()).context("Failed to build driver registry")?,
    );
    info!(drivers = registry.keys().len(), "Driver registry built");

    let checker = Arc::new(HealthChecker::new(Arc::clone(&registry), Arc::clone(&store)));
    tokio::spawn(
        Arc::clone(&checker).run_scheduled(Duration::from_secs(check_interval)),
    );
    info!(interval_secs = check_interval, "Scheduled health checks running");

    let app = create_admin_router(DriverHubAppState {
        registry,
        store,
        checker,
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "Admin API listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
