//! Field-addressed validation for driver configs and connector writes.
//!
//! Every violation is keyed by the field path that caused it
//! (e.g. `config.client_secret`), so callers can fix input without parsing
//! prose. A failed validation aborts the write - no partial state.

use crate::registry::{DriverRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use trellis::connector::{is_valid_key, ConnectorKind, ConnectorRecord, ConnectorStore};

/// Field-keyed validation failure: field path -> messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigValidationError {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ConfigValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Merges `other` under a field prefix (e.g. driver errors under `config.`).
    pub fn merge_prefixed(&mut self, prefix: &str, other: ConfigValidationError) {
        for (field, messages) in other.errors {
            self.errors
                .entry(format!("{}{}", prefix, field))
                .or_default()
                .extend(messages);
        }
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed:")?;
        for (field, messages) in &self.errors {
            write!(f, " {}: {};", field, messages.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigValidationError {}

/// Requires `fields` to be present, strings, and non-empty after trimming.
///
/// Returns the normalized config: required fields trimmed, everything else
/// passed through untouched. Fields absent from `fields` are never checked -
/// that is how the Entra variant tolerates a missing `issuer` (it simply is
/// not in that driver's field set).
pub fn require_trimmed_strings(
    raw: &Value,
    fields: &[&str],
) -> Result<Value, ConfigValidationError> {
    let mut errors = ConfigValidationError::new();

    let Some(object) = raw.as_object() else {
        errors.add("config", "must be a JSON object");
        return Err(errors);
    };

    let mut normalized = object.clone();
    for field in fields {
        match object.get(*field) {
            None | Some(Value::Null) => errors.add(*field, "is required"),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    errors.add(*field, "must not be empty");
                } else {
                    normalized.insert((*field).to_string(), Value::String(trimmed.to_string()));
                }
            }
            Some(_) => errors.add(*field, "must be a string"),
        }
    }

    if errors.is_empty() {
        Ok(Value::Object(normalized))
    } else {
        Err(errors)
    }
}

/// Checks optional string fields: absent is fine, present means non-empty
/// string. Returns the trimmed normalization.
pub fn optional_trimmed_strings(
    raw: &Value,
    fields: &[&str],
) -> Result<Value, ConfigValidationError> {
    let mut errors = ConfigValidationError::new();

    let Some(object) = raw.as_object() else {
        errors.add("config", "must be a JSON object");
        return Err(errors);
    };

    let mut normalized = object.clone();
    for field in fields {
        match object.get(*field) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    errors.add(*field, "must not be empty");
                } else {
                    normalized.insert((*field).to_string(), Value::String(trimmed.to_string()));
                }
            }
            Some(_) => errors.add(*field, "must be a string"),
        }
    }

    if errors.is_empty() {
        Ok(Value::Object(normalized))
    } else {
        Err(errors)
    }
}

/// Incoming connector write request, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConnectorRequest {
    pub key: String,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub enabled: Option<Value>,
    pub config: Value,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Create vs update changes the uniqueness rule for `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Validates a connector write end to end and builds the record to store.
///
/// Rules: slug key (unique on create), name length, closed kind set, config
/// through the driver resolved for the kind (`auth.provider` resolves via
/// `config.provider`). Any violation returns the full field-keyed error set;
/// nothing is written.
pub fn validate_store_request(
    request: &StoreConnectorRequest,
    registry: &DriverRegistry,
    store: &dyn ConnectorStore,
    mode: WriteMode,
) -> Result<ConnectorRecord, ConfigValidationError> {
    let mut errors = ConfigValidationError::new();

    if !is_valid_key(&request.key) {
        errors.add(
            "key",
            "must be 3-64 characters matching [a-z0-9]+(-[a-z0-9]+)*",
        );
    }

    let existing = match store.get(&request.key) {
        Ok(existing) => existing,
        Err(_) => {
            errors.add("key", "connector store unavailable");
            None
        }
    };
    match mode {
        WriteMode::Create => {
            if existing.is_some() {
                errors.add("key", "is already in use");
            }
        }
        WriteMode::Update => {
            if existing.is_none() {
                errors.add("key", "no such connector");
            }
        }
    }

    let name = request.name.trim();
    if name.len() < 3 || name.len() > 120 {
        errors.add("name", "must be 3-120 characters");
    }

    let kind = match ConnectorKind::parse(&request.kind) {
        Ok(kind) => Some(kind),
        Err(e) => {
            errors.add("kind", e.to_string());
            None
        }
    };

    let enabled = match &request.enabled {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            errors.add("enabled", "must be a boolean");
            true
        }
    };

    let meta = match &request.meta {
        None | Some(Value::Null) => None,
        Some(value @ Value::Object(_)) => Some(value.clone()),
        Some(_) => {
            errors.add("meta", "must be a JSON object");
            None
        }
    };

    // Config goes through the driver for the kind. Auth providers name
    // their driver in config.provider; integration kinds map directly.
    let mut normalized_config = request.config.clone();
    if let Some(kind) = kind {
        let driver_key = if kind.is_auth() {
            match request.config.get("provider").and_then(Value::as_str) {
                Some(provider) if !provider.trim().is_empty() => {
                    Some(provider.trim().to_string())
                }
                Some(_) | None => {
                    errors.add("config.provider", "is required for auth.provider connectors");
                    None
                }
            }
        } else {
            Some(kind.as_str().to_string())
        };

        if let Some(driver_key) = driver_key {
            match registry.get(&driver_key) {
                Ok(driver) => match driver.normalize_config(&request.config) {
                    Ok(config) => normalized_config = config,
                    Err(driver_errors) => errors.merge_prefixed("config.", driver_errors),
                },
                Err(RegistryError::NotFound(key)) => {
                    let field = if kind.is_auth() { "config.provider" } else { "kind" };
                    errors.add(field, format!("no driver registered for '{}'", key));
                }
                Err(e) => {
                    errors.add("kind", e.to_string());
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // kind is Some here - a parse failure would have landed in errors
    let kind = kind.expect("kind validated");
    let (last_health_at, last_health) = existing
        .map(|record| (record.last_health_at, record.last_health))
        .unwrap_or((None, None));

    Ok(ConnectorRecord {
        key: request.key.clone(),
        name: name.to_string(),
        kind,
        enabled,
        config: normalized_config,
        meta,
        last_health_at,
        last_health,
    })
}
