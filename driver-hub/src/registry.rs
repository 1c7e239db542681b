//! Driver registry - indexed catalog of the enumerated driver set.
//!
//! Built once at startup. Adding an external-system kind means adding a
//! driver to the construction list; validation and dispatch call sites
//! never change.

use crate::Driver;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Registry construction and lookup errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Two drivers normalized to the same key. Last-registered would
    /// silently shadow, so construction fails loudly instead.
    DuplicateKey(String),
    NotFound(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateKey(key) => {
                write!(f, "duplicate driver key '{}' in registry construction", key)
            }
            RegistryError::NotFound(key) => write!(f, "no driver registered under '{}'", key),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Process-wide driver catalog, keyed by normalized driver key.
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Builds the registry from the full enumerated driver set.
    ///
    /// Keys are normalized (trim + lowercase) before indexing; a duplicate
    /// normalized key fails construction.
    pub fn new(drivers: Vec<Arc<dyn Driver>>) -> Result<Self, RegistryError> {
        let mut index: HashMap<String, Arc<dyn Driver>> = HashMap::with_capacity(drivers.len());
        for driver in drivers {
            let key = normalize_key(driver.key());
            if index.contains_key(&key) {
                return Err(RegistryError::DuplicateKey(key));
            }
            index.insert(key, driver);
        }
        Ok(Self { drivers: index })
    }

    /// Resolves a driver, normalizing the lookup key the same way as
    /// construction did.
    pub fn get(&self, key: &str) -> Result<Arc<dyn Driver>, RegistryError> {
        let normalized = normalize_key(key);
        self.drivers
            .get(&normalized)
            .cloned()
            .ok_or(RegistryError::NotFound(normalized))
    }

    pub fn has(&self, key: &str) -> bool {
        self.drivers.contains_key(&normalize_key(key))
    }

    /// Full catalog, sorted for discovery endpoints.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.drivers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::default_drivers;
    use crate::validation::ConfigValidationError;
    use async_trait::async_trait;
    use serde_json::Value;
    use trellis::health::HealthCheckResult;

    struct FakeDriver {
        key: &'static str,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        fn key(&self) -> &str {
            self.key
        }

        fn normalize_config(&self, raw: &Value) -> Result<Value, ConfigValidationError> {
            Ok(raw.clone())
        }

        async fn check_health(&self, _config: &Value) -> HealthCheckResult {
            HealthCheckResult::ok("fake")
        }
    }

    #[test]
    fn test_lookup_normalizes_key() {
        let registry =
            DriverRegistry::new(vec![Arc::new(FakeDriver { key: "oidc" })]).unwrap();
        assert!(registry.get("oidc").is_ok());
        assert!(registry.get("  OIDC ").is_ok());
        assert!(registry.has("OIDC"));
    }

    #[test]
    fn test_unknown_key_names_the_key() {
        let registry = DriverRegistry::new(vec![]).unwrap();
        match registry.get("kerberos").err() {
            Some(RegistryError::NotFound(key)) => assert_eq!(key, "kerberos"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
        assert!(!registry.has("kerberos"));
    }

    #[test]
    fn test_duplicate_key_fails_construction() {
        // "SAML" normalizes to "saml" - last-registered must not shadow
        let result = DriverRegistry::new(vec![
            Arc::new(FakeDriver { key: "saml" }),
            Arc::new(FakeDriver { key: "SAML" }),
        ]);
        assert_eq!(result.err(), Some(RegistryError::DuplicateKey("saml".into())));
    }

    #[test]
    fn test_distinct_keys_never_alias() {
        let registry = DriverRegistry::new(vec![
            Arc::new(FakeDriver { key: "oidc" }),
            Arc::new(FakeDriver { key: "saml" }),
        ])
        .unwrap();

        let a = registry.get("oidc").unwrap();
        let b = registry.get("saml").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_default_set_constructs() {
        let registry = DriverRegistry::new(default_drivers()).unwrap();
        for key in ["oidc", "saml", "ldap", "entra", "asset.discovery", "incident.event"] {
            assert!(registry.has(key), "missing driver '{key}'");
        }
        // keys() is sorted for discovery endpoints
        let keys = registry.keys();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
