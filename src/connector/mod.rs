//! Connector records and the store boundary.
//!
//! A connector is a configured instance of a driver for one external system.
//! The core only needs a narrow read/write interface to wherever connectors
//! are kept; the sqlite store is the durable implementation and the memory
//! store backs tests.

use crate::health::HealthCheckResult;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

mod encryption;
mod memory;
mod sqlite;

pub use memory::MemoryConnectorStore;
pub use sqlite::SqliteConnectorStore;

/// Closed enumeration of connector kinds.
///
/// Each kind maps to a driver in the registry; `auth.provider` connectors
/// resolve their driver from `config.provider` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorKind {
    #[serde(rename = "asset.discovery")]
    AssetDiscovery,
    #[serde(rename = "asset.lifecycle")]
    AssetLifecycle,
    #[serde(rename = "incident.event")]
    IncidentEvent,
    #[serde(rename = "vendor.profile")]
    VendorProfile,
    #[serde(rename = "indicator.metric")]
    IndicatorMetric,
    #[serde(rename = "cyber.metric")]
    CyberMetric,
    #[serde(rename = "auth.provider")]
    AuthProvider,
}

impl ConnectorKind {
    pub const ALL: &'static [ConnectorKind] = &[
        ConnectorKind::AssetDiscovery,
        ConnectorKind::AssetLifecycle,
        ConnectorKind::IncidentEvent,
        ConnectorKind::VendorProfile,
        ConnectorKind::IndicatorMetric,
        ConnectorKind::CyberMetric,
        ConnectorKind::AuthProvider,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::AssetDiscovery => "asset.discovery",
            ConnectorKind::AssetLifecycle => "asset.lifecycle",
            ConnectorKind::IncidentEvent => "incident.event",
            ConnectorKind::VendorProfile => "vendor.profile",
            ConnectorKind::IndicatorMetric => "indicator.metric",
            ConnectorKind::CyberMetric => "cyber.metric",
            ConnectorKind::AuthProvider => "auth.provider",
        }
    }

    /// Parses the dotted string form (e.g. "asset.discovery").
    pub fn parse(s: &str) -> Result<Self, UnknownKindError> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKindError(s.to_string()))
    }

    /// True for kinds whose connectors are identity providers.
    pub fn is_auth(&self) -> bool {
        matches!(self, ConnectorKind::AuthProvider)
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a kind string outside the closed enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownKindError(pub String);

impl fmt::Display for UnknownKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid: Vec<&str> = ConnectorKind::ALL.iter().map(|k| k.as_str()).collect();
        write!(
            f,
            "unknown connector kind '{}', expected one of: {}",
            self.0,
            valid.join(", ")
        )
    }
}

impl std::error::Error for UnknownKindError {}

/// A configured connector as the core sees it.
///
/// `config` has already passed the driver's `normalize_config` by the time a
/// record reaches the store. The dispatcher never mutates records; health
/// checks only update `last_health_at` and the cached result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRecord {
    /// Unique slug, pattern `[a-z0-9]+(-[a-z0-9]+)*`, 3-64 chars
    pub key: String,
    /// Human label, 3-120 chars
    pub name: String,
    pub kind: ConnectorKind,
    pub enabled: bool,
    /// Driver-validated configuration (JSON object)
    pub config: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health: Option<HealthCheckResult>,
}

/// Validates connector key format.
///
/// Valid keys:
/// - Lowercase letters and digits, hyphen-separated runs (e.g. "jira-assets")
/// - No leading/trailing/consecutive hyphens
/// - 3 to 64 characters
pub fn is_valid_key(key: &str) -> bool {
    if key.len() < 3 || key.len() > 64 {
        return false;
    }
    if key.starts_with('-') || key.ends_with('-') || key.contains("--") {
        return false;
    }
    key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Narrow persistence boundary for connectors.
///
/// Injected into the health checker and admin API so tests can substitute
/// the in-memory implementation.
pub trait ConnectorStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<ConnectorRecord>>;
    fn list(&self) -> Result<Vec<ConnectorRecord>>;
    fn list_enabled(&self) -> Result<Vec<ConnectorRecord>>;
    /// Inserts or replaces the record under `record.key`. No partial writes.
    fn upsert(&self, record: &ConnectorRecord) -> Result<()>;
    /// Returns true if a record was removed.
    fn delete(&self, key: &str) -> Result<bool>;
    /// Stores the probe result and stamps `last_health_at`.
    fn record_health(&self, key: &str, result: &HealthCheckResult) -> Result<()>;
}
