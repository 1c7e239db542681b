//! LDAP directory driver.

use super::PROBE_TIMEOUT;
use crate::validation::{require_trimmed_strings, ConfigValidationError};
use crate::Driver;
use async_trait::async_trait;
use serde_json::{Map, Value};
use trellis::health::HealthCheckResult;

const DEFAULT_PORT: u64 = 389;

/// LDAP driver. Requires `host`, `bind_dn`, `bind_password`; `port` is
/// optional (default 389). The health probe checks TCP reachability of the
/// directory - a full bind belongs to the authentication path, not the
/// liveness check.
pub struct LdapDriver;

impl LdapDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LdapDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for LdapDriver {
    fn key(&self) -> &str {
        "ldap"
    }

    fn normalize_config(&self, raw: &Value) -> Result<Value, ConfigValidationError> {
        let normalized = require_trimmed_strings(raw, &["host", "bind_dn", "bind_password"])?;

        if let Some(port) = normalized.get("port") {
            if !matches!(port, Value::Number(n) if n.as_u64().map_or(false, |p| (1..=65535).contains(&p)))
            {
                let mut errors = ConfigValidationError::new();
                errors.add("port", "must be a port number between 1 and 65535");
                return Err(errors);
            }
        }

        Ok(normalized)
    }

    async fn check_health(&self, config: &Value) -> HealthCheckResult {
        let Some(host) = config.get("host").and_then(Value::as_str) else {
            let mut details = Map::new();
            details.insert("reason".into(), Value::String("host missing".into()));
            return HealthCheckResult::error("Cannot probe directory without host", details);
        };
        let port = config
            .get("port")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_PORT) as u16;

        let addr = format!("{}:{}", host, port);
        let connect = tokio::net::TcpStream::connect(&addr);
        match tokio::time::timeout(PROBE_TIMEOUT, connect).await {
            Ok(Ok(_stream)) => HealthCheckResult::ok("Health check passed."),
            Ok(Err(e)) => {
                let mut details = Map::new();
                details.insert("addr".into(), Value::String(addr));
                HealthCheckResult::error(format!("Directory unreachable: {}", e), details)
            }
            Err(_) => {
                let mut details = Map::new();
                details.insert("addr".into(), Value::String(addr));
                details.insert(
                    "timeout_secs".into(),
                    Value::Number(PROBE_TIMEOUT.as_secs().into()),
                );
                HealthCheckResult::error("Directory connect timed out", details)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requires_bind_credentials() {
        let driver = LdapDriver::new();
        let err = driver
            .normalize_config(&json!({"host": "ldap.example.com"}))
            .unwrap_err();
        assert!(err.errors.contains_key("bind_dn"));
        assert!(err.errors.contains_key("bind_password"));
    }

    #[test]
    fn test_port_must_be_valid() {
        let driver = LdapDriver::new();
        let base = json!({
            "host": "ldap.example.com",
            "bind_dn": "cn=svc,dc=example,dc=com",
            "bind_password": "pw",
            "port": "389"
        });
        let err = driver.normalize_config(&base).unwrap_err();
        assert!(err.errors.contains_key("port"));

        let mut ok = base.clone();
        ok["port"] = json!(636);
        assert!(driver.normalize_config(&ok).is_ok());
    }

    #[tokio::test]
    async fn test_health_probes_tcp() {
        // Bind a listener so the probe has something to reach
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let driver = LdapDriver::new();
        let config = json!({
            "host": "127.0.0.1",
            "bind_dn": "cn=svc,dc=example,dc=com",
            "bind_password": "pw",
            "port": port
        });

        let result = driver.check_health(&config).await;
        assert!(result.is_healthy());

        drop(listener);
        let result = driver.check_health(&config).await;
        assert!(!result.is_healthy());
    }
}
