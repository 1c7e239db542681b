//! On-demand and scheduled connector health checks.

use crate::registry::DriverRegistry;
use crate::Driver;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use trellis::connector::{ConnectorRecord, ConnectorStore};
use trellis::health::HealthCheckResult;

const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures that prevent a check from running at all. A probe that runs and
/// reports unhealthy is not an error - that outcome lives in the
/// `HealthCheckResult`.
#[derive(Debug)]
pub enum CheckerError {
    UnknownConnector(String),
    UnknownDriver(String),
    Store(anyhow::Error),
}

impl fmt::Display for CheckerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckerError::UnknownConnector(key) => write!(f, "no connector with key '{}'", key),
            CheckerError::UnknownDriver(key) => write!(f, "no driver registered for '{}'", key),
            CheckerError::Store(e) => write!(f, "connector store failure: {}", e),
        }
    }
}

impl std::error::Error for CheckerError {}

/// Runs driver health probes against stored connectors and persists the
/// outcome. One instance is shared by the admin API (on-demand checks) and
/// the scheduled background loop.
pub struct HealthChecker {
    registry: Arc<DriverRegistry>,
    store: Arc<dyn ConnectorStore>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(registry: Arc<DriverRegistry>, store: Arc<dyn ConnectorStore>) -> Self {
        Self {
            registry,
            store,
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks one connector by key and records the result.
    ///
    /// Runs even for disabled connectors - an operator probing a connector
    /// they just disabled still wants an answer. The probe is bounded by the
    /// checker timeout; a hung or panicking driver resolves to an
    /// error-status result rather than wedging the caller.
    pub async fn check_connector(&self, key: &str) -> Result<HealthCheckResult, CheckerError> {
        let record = self
            .store
            .get(key)
            .map_err(CheckerError::Store)?
            .ok_or_else(|| CheckerError::UnknownConnector(key.to_string()))?;

        let driver = self.resolve_driver(&record)?;
        let result = self.probe(driver, record.config.clone()).await;

        self.store
            .record_health(key, &result)
            .map_err(CheckerError::Store)?;

        info!(
            connector = key,
            status = result.status.as_str(),
            "health check recorded"
        );
        Ok(result)
    }

    /// Background loop: checks every enabled connector once per interval.
    ///
    /// Individual failures are logged and skipped so one bad connector never
    /// starves the rest of the schedule.
    pub async fn run_scheduled(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let connectors = match self.store.list_enabled() {
                Ok(connectors) => connectors,
                Err(e) => {
                    warn!("scheduled health sweep skipped, store unavailable: {}", e);
                    continue;
                }
            };
            for connector in connectors {
                if let Err(e) = self.check_connector(&connector.key).await {
                    warn!(connector = %connector.key, "scheduled health check failed: {}", e);
                }
            }
        }
    }

    fn resolve_driver(&self, record: &ConnectorRecord) -> Result<Arc<dyn Driver>, CheckerError> {
        let driver_key = if record.kind.is_auth() {
            record
                .config
                .get("provider")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        } else {
            record.kind.as_str().to_string()
        };
        self.registry
            .get(&driver_key)
            .map_err(|_| CheckerError::UnknownDriver(driver_key))
    }

    async fn probe(&self, driver: Arc<dyn Driver>, config: Value) -> HealthCheckResult {
        let handle = tokio::spawn(async move { driver.check_health(&config).await });
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                let mut details = Map::new();
                details.insert("error".into(), Value::String(join_error.to_string()));
                HealthCheckResult::error("Health probe aborted unexpectedly", details)
            }
            Err(_) => {
                let mut details = Map::new();
                details.insert(
                    "timeout_secs".into(),
                    Value::Number(self.timeout.as_secs().into()),
                );
                HealthCheckResult::error("Health probe timed out", details)
            }
        }
    }
}
