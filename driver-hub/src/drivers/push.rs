//! Push-ingest driver backing the non-auth connector kinds.

use super::PROBE_TIMEOUT;
use crate::validation::{optional_trimmed_strings, ConfigValidationError};
use crate::Driver;
use async_trait::async_trait;
use serde_json::{Map, Value};
use trellis::connector::ConnectorKind;
use trellis::health::HealthCheckResult;

/// Generic driver for connectors whose systems push envelopes at us. One
/// instance is registered per integration kind, keyed by the kind slug, so
/// that every non-auth kind resolves to a driver without per-vendor code.
///
/// Config is fully optional: `endpoint_url` and `api_token` enable an
/// outbound reachability probe when present; without them the connector is
/// purely inbound and always reports healthy.
pub struct PushIngestDriver {
    key: &'static str,
    client: reqwest::Client,
}

impl PushIngestDriver {
    pub fn new(kind: ConnectorKind) -> Self {
        Self {
            key: kind.as_str(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Driver for PushIngestDriver {
    fn key(&self) -> &str {
        self.key
    }

    fn normalize_config(&self, raw: &Value) -> Result<Value, ConfigValidationError> {
        optional_trimmed_strings(raw, &["endpoint_url", "api_token"])
    }

    async fn check_health(&self, config: &Value) -> HealthCheckResult {
        let Some(url) = config.get("endpoint_url").and_then(Value::as_str) else {
            return HealthCheckResult::ok("Health check passed.");
        };

        let mut request = self.client.get(url).timeout(PROBE_TIMEOUT);
        if let Some(token) = config.get("api_token").and_then(Value::as_str) {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                HealthCheckResult::ok("Health check passed.")
            }
            Ok(response) => {
                let mut details = Map::new();
                details.insert("url".into(), Value::String(url.to_string()));
                details.insert(
                    "status".into(),
                    Value::Number(response.status().as_u16().into()),
                );
                HealthCheckResult::error("Endpoint returned a failure status", details)
            }
            Err(e) => {
                let mut details = Map::new();
                details.insert("url".into(), Value::String(url.to_string()));
                HealthCheckResult::error(format!("Endpoint unreachable: {}", e), details)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_kind_slug() {
        let driver = PushIngestDriver::new(ConnectorKind::AssetDiscovery);
        assert_eq!(driver.key(), "asset.discovery");
    }

    #[test]
    fn test_empty_config_is_valid() {
        let driver = PushIngestDriver::new(ConnectorKind::IncidentEvent);
        let normalized = driver.normalize_config(&json!({})).unwrap();
        assert_eq!(normalized, json!({}));
    }

    #[test]
    fn test_blank_endpoint_rejected() {
        let driver = PushIngestDriver::new(ConnectorKind::IncidentEvent);
        let err = driver
            .normalize_config(&json!({"endpoint_url": "   "}))
            .unwrap_err();
        assert!(err.errors.contains_key("endpoint_url"));
    }

    #[tokio::test]
    async fn test_health_without_endpoint_is_ok() {
        let driver = PushIngestDriver::new(ConnectorKind::VendorProfile);
        let result = driver.check_health(&json!({})).await;
        assert!(result.is_healthy());
        assert_eq!(result.message, "Health check passed.");
        assert!(result.details.is_empty());
    }

    #[tokio::test]
    async fn test_health_probes_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/status")
            .match_header("authorization", "Bearer t0k3n")
            .with_status(200)
            .create_async()
            .await;

        let driver = PushIngestDriver::new(ConnectorKind::CyberMetric);
        let config = json!({
            "endpoint_url": format!("{}/status", server.url()),
            "api_token": "t0k3n"
        });
        let result = driver.check_health(&config).await;
        assert!(result.is_healthy());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_reports_failure_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status")
            .with_status(500)
            .create_async()
            .await;

        let driver = PushIngestDriver::new(ConnectorKind::CyberMetric);
        let config = json!({"endpoint_url": format!("{}/status", server.url())});
        let result = driver.check_health(&config).await;
        assert!(!result.is_healthy());
        assert_eq!(result.details.get("status"), Some(&json!(500)));
    }
}
