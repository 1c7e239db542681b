use crate::connector::ConnectorKind;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

mod dedupe;

pub use dedupe::derive_dedupe_id;

/// BusEnvelope is the normalized representation of one inbound event,
/// independent of the source connector's wire format.
///
/// Envelopes are immutable after construction and round-trip losslessly
/// through the flat-map form used on the queue wire
/// (`from_map(to_map(e)) == e`).
#[derive(Clone, Debug, PartialEq)]
pub struct BusEnvelope {
    kind: ConnectorKind,
    event: String,
    source_key: String,
    payload: Value,
    received_at: DateTime<Utc>,
    dedupe_id: String,
}

/// Structural errors for envelope reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeError {
    MissingField(&'static str),
    UnknownKind(String),
    EmptyEvent,
    EmptySourceKey,
    PayloadNotObject,
    InvalidTimestamp(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::MissingField(field) => write!(f, "{} is required", field),
            EnvelopeError::UnknownKind(kind) => write!(f, "unknown connector kind '{}'", kind),
            EnvelopeError::EmptyEvent => write!(f, "event must be a non-empty string"),
            EnvelopeError::EmptySourceKey => write!(f, "sourceKey must be a non-empty string"),
            EnvelopeError::PayloadNotObject => write!(f, "payload must be a JSON object"),
            EnvelopeError::InvalidTimestamp(raw) => {
                write!(f, "receivedAt is not a valid ISO-8601 timestamp: '{}'", raw)
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl BusEnvelope {
    /// Builds an envelope at the ingestion boundary.
    ///
    /// `received_at` is stamped now; the dedupe id is derived from
    /// `(source_key, kind, event, payload)` unless the source supplied one.
    pub fn new(
        kind: ConnectorKind,
        event: impl Into<String>,
        source_key: impl Into<String>,
        payload: Value,
        dedupe_id: Option<String>,
    ) -> Result<Self, EnvelopeError> {
        let event = event.into();
        let source_key = source_key.into();

        if event.trim().is_empty() {
            return Err(EnvelopeError::EmptyEvent);
        }
        if source_key.trim().is_empty() {
            return Err(EnvelopeError::EmptySourceKey);
        }
        if !payload.is_object() {
            return Err(EnvelopeError::PayloadNotObject);
        }

        let dedupe_id = match dedupe_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => derive_dedupe_id(&source_key, kind, &event, &payload),
        };

        Ok(Self {
            kind,
            event,
            source_key,
            payload,
            received_at: Utc::now(),
            dedupe_id,
        })
    }

    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn dedupe_id(&self) -> &str {
        &self.dedupe_id
    }

    /// Reconstructs an envelope from its flat-map wire form.
    ///
    /// `kind`, `event`, `sourceKey`, and `payload` are required; a missing
    /// `receivedAt` defaults to now and a missing `dedupeId` is derived.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, EnvelopeError> {
        let kind_raw = map
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("kind"))?;
        let kind = ConnectorKind::parse(kind_raw)
            .map_err(|e| EnvelopeError::UnknownKind(e.0))?;

        let event = map
            .get("event")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("event"))?;
        if event.trim().is_empty() {
            return Err(EnvelopeError::EmptyEvent);
        }

        let source_key = map
            .get("sourceKey")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("sourceKey"))?;
        if source_key.trim().is_empty() {
            return Err(EnvelopeError::EmptySourceKey);
        }

        let payload = map
            .get("payload")
            .ok_or(EnvelopeError::MissingField("payload"))?;
        if !payload.is_object() {
            return Err(EnvelopeError::PayloadNotObject);
        }

        let received_at = match map.get("receivedAt") {
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map_err(|_| EnvelopeError::InvalidTimestamp(raw.clone()))?
                .with_timezone(&Utc),
            Some(other) => {
                return Err(EnvelopeError::InvalidTimestamp(other.to_string()));
            }
            None => Utc::now(),
        };

        let dedupe_id = match map.get("dedupeId").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => derive_dedupe_id(source_key, kind, event, payload),
        };

        Ok(Self {
            kind,
            event: event.to_string(),
            source_key: source_key.to_string(),
            payload: payload.clone(),
            received_at,
            dedupe_id,
        })
    }

    /// Serializes to the flat-map wire form. Exact inverse of [`from_map`].
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("kind".into(), Value::String(self.kind.as_str().into()));
        map.insert("event".into(), Value::String(self.event.clone()));
        map.insert("sourceKey".into(), Value::String(self.source_key.clone()));
        map.insert("payload".into(), self.payload.clone());
        map.insert(
            "receivedAt".into(),
            Value::String(self.received_at.to_rfc3339()),
        );
        map.insert("dedupeId".into(), Value::String(self.dedupe_id.clone()));
        map
    }
}
