use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(test)]
mod tests;

/// Tri-state health classification for a connector.
///
/// `Warning` and `Error` are both non-healthy but carry different alert
/// severity downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
        }
    }
}

/// Result of a single driver health probe.
///
/// Immutable once constructed; `checked_at` is set at construction time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
    pub details: Map<String, Value>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Ok,
            message: message.into(),
            details: Map::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn warning(message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            status: HealthStatus::Warning,
            message: message.into(),
            details,
            checked_at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
            details,
            checked_at: Utc::now(),
        }
    }

    /// True iff the probe reported `ok`.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Ok
    }

    /// Flat-map form: `{status, message, checked_at (ISO-8601 UTC), details}`.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("status".into(), Value::String(self.status.as_str().into()));
        map.insert("message".into(), Value::String(self.message.clone()));
        map.insert(
            "checked_at".into(),
            Value::String(self.checked_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert("details".into(), Value::Object(self.details.clone()));
        map
    }
}
