//! OIDC-family drivers: standard OIDC and the Entra variant.

use super::PROBE_TIMEOUT;
use crate::validation::{require_trimmed_strings, ConfigValidationError};
use crate::Driver;
use async_trait::async_trait;
use serde_json::{Map, Value};
use trellis::health::HealthCheckResult;

#[derive(Clone, Copy, Debug, PartialEq)]
enum OidcVariant {
    Standard,
    Entra,
}

/// OpenID Connect driver.
///
/// The standard variant requires `issuer`, `client_id`, `client_secret`.
/// The Entra variant requires `client_id`, `client_secret`, `tenant_id` -
/// `issuer` is not in its field set, so a missing issuer is skipped rather
/// than rejected (documented source behavior, kept as-is pending product
/// confirmation), and the discovery endpoint is derived from the tenant.
pub struct OidcDriver {
    key: &'static str,
    required: &'static [&'static str],
    variant: OidcVariant,
    client: reqwest::Client,
}

impl OidcDriver {
    pub fn standard() -> Self {
        Self {
            key: "oidc",
            required: &["issuer", "client_id", "client_secret"],
            variant: OidcVariant::Standard,
            client: reqwest::Client::new(),
        }
    }

    pub fn entra() -> Self {
        Self {
            key: "entra",
            required: &["client_id", "client_secret", "tenant_id"],
            variant: OidcVariant::Entra,
            client: reqwest::Client::new(),
        }
    }

    /// Discovery document URL for the configured provider.
    fn discovery_url(&self, config: &Value) -> Option<String> {
        match self.variant {
            OidcVariant::Standard => {
                let issuer = config.get("issuer")?.as_str()?.trim_end_matches('/');
                Some(format!("{}/.well-known/openid-configuration", issuer))
            }
            OidcVariant::Entra => {
                let tenant = config.get("tenant_id")?.as_str()?;
                Some(format!(
                    "https://login.microsoftonline.com/{}/v2.0/.well-known/openid-configuration",
                    tenant
                ))
            }
        }
    }
}

#[async_trait]
impl Driver for OidcDriver {
    fn key(&self) -> &str {
        self.key
    }

    fn normalize_config(&self, raw: &Value) -> Result<Value, ConfigValidationError> {
        require_trimmed_strings(raw, self.required)
    }

    async fn check_health(&self, config: &Value) -> HealthCheckResult {
        let Some(url) = self.discovery_url(config) else {
            let mut details = Map::new();
            details.insert("reason".into(), Value::String("incomplete config".into()));
            return HealthCheckResult::error(
                "Cannot derive discovery endpoint from config",
                details,
            );
        };

        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => {
                HealthCheckResult::ok("Health check passed.")
            }
            Ok(response) => {
                let mut details = Map::new();
                details.insert("url".into(), Value::String(url));
                details.insert(
                    "status".into(),
                    Value::Number(response.status().as_u16().into()),
                );
                HealthCheckResult::error("Discovery endpoint returned an error status", details)
            }
            Err(e) => {
                let mut details = Map::new();
                details.insert("url".into(), Value::String(url));
                HealthCheckResult::error(
                    format!("Discovery endpoint unreachable: {}", e),
                    details,
                )
            }
        }
    }
}
