//! SAML identity-provider driver.

use super::PROBE_TIMEOUT;
use crate::validation::{require_trimmed_strings, ConfigValidationError};
use crate::Driver;
use async_trait::async_trait;
use serde_json::{Map, Value};
use trellis::health::HealthCheckResult;

/// SAML driver. Requires the IdP metadata URL; the health probe fetches the
/// metadata document.
pub struct SamlDriver {
    client: reqwest::Client,
}

impl SamlDriver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for SamlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for SamlDriver {
    fn key(&self) -> &str {
        "saml"
    }

    fn normalize_config(&self, raw: &Value) -> Result<Value, ConfigValidationError> {
        require_trimmed_strings(raw, &["metadata_url", "sp_entity_id"])
    }

    async fn check_health(&self, config: &Value) -> HealthCheckResult {
        let Some(url) = config.get("metadata_url").and_then(Value::as_str) else {
            let mut details = Map::new();
            details.insert("reason".into(), Value::String("metadata_url missing".into()));
            return HealthCheckResult::error("Cannot probe IdP without metadata_url", details);
        };

        match self.client.get(url).timeout(PROBE_TIMEOUT).send().await {
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
                HealthCheckResult::error("IdP metadata endpoint returned an error status", details)
            }
            Err(e) => {
                let mut details = Map::new();
                details.insert("url".into(), Value::String(url.to_string()));
                HealthCheckResult::error(format!("IdP metadata unreachable: {}", e), details)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requires_metadata_url_and_entity_id() {
        let driver = SamlDriver::new();
        let err = driver.normalize_config(&json!({})).unwrap_err();
        assert_eq!(err.errors["metadata_url"], vec!["is required".to_string()]);
        assert_eq!(err.errors["sp_entity_id"], vec!["is required".to_string()]);
    }

    #[tokio::test]
    async fn test_health_fetches_metadata() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/saml/metadata")
            .with_status(200)
            .with_body("<EntityDescriptor/>")
            .create_async()
            .await;

        let driver = SamlDriver::new();
        let config = json!({
            "metadata_url": format!("{}/saml/metadata", server.url()),
            "sp_entity_id": "urn:trellis:sp"
        });

        let result = driver.check_health(&config).await;
        assert!(result.is_healthy());
    }
}
