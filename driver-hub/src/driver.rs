use crate::validation::ConfigValidationError;
use async_trait::async_trait;
use serde_json::Value;
use trellis::health::HealthCheckResult;

/// Driver interface for external-system adapters.
///
/// One contract backs both identity providers (OIDC, SAML, LDAP, Entra) and
/// integration connectors, so config validation and health-check policy are
/// written once. Drivers are stateless singletons selected by key; all
/// per-connector state lives in the connector record.
///
/// # Lifecycle
/// 1. Registry is built at startup from the enumerated driver set
/// 2. Connector writes run `normalize_config` before anything is stored
/// 3. The health checker calls `check_health` on demand or on schedule
///
/// # Example
/// ```no_run
/// use driver_hub::{ConfigValidationError, Driver};
/// use driver_hub::validation::require_trimmed_strings;
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use trellis::health::HealthCheckResult;
///
/// struct StaticDriver;
///
/// #[async_trait]
/// impl Driver for StaticDriver {
///     fn key(&self) -> &str {
///         "static"
///     }
///
///     fn normalize_config(&self, raw: &Value) -> Result<Value, ConfigValidationError> {
///         require_trimmed_strings(raw, &["endpoint_url"])
///     }
///
///     async fn check_health(&self, _config: &Value) -> HealthCheckResult {
///         HealthCheckResult::ok("Health check passed.")
///     }
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable lowercase identifier (e.g. "oidc", "entra", or a connector
    /// kind slug). Unique across the registry.
    fn key(&self) -> &str;

    /// Validates and normalizes a raw config object.
    ///
    /// Returns the validated config (required strings trimmed, passthrough
    /// fields untouched) or a field-keyed error naming every violation.
    fn normalize_config(&self, raw: &Value) -> Result<Value, ConfigValidationError>;

    /// Probes the external system for liveness.
    ///
    /// Must resolve every outcome to a [`HealthCheckResult`]: a transport
    /// failure or unexpected response becomes `status=error` describing the
    /// cause, never a propagated fault. The driver owns its probe timeout.
    async fn check_health(&self, config: &Value) -> HealthCheckResult;
}
