//! Deterministic dedupe-id derivation.
//!
//! When a source does not supply a dedupe id, one is derived from
//! `(sourceKey, kind, event, payload)` so redelivered copies of the same
//! event collapse to the same id. The payload is canonicalized first:
//! object keys sorted recursively, so key ordering on the wire cannot
//! change the id.

use crate::connector::ConnectorKind;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derives the stable dedupe id: hex SHA-256 over the identity tuple.
pub fn derive_dedupe_id(source_key: &str, kind: ConnectorKind, event: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_key.as_bytes());
    hasher.update(b"\n");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(event.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonicalize(payload).as_bytes());

    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Canonical JSON encoding: object keys sorted ascending at every depth,
/// arrays in order, scalars via serde_json's fixed encoding.
fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    // serde_json string encoding handles escaping
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonicalize(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let encoded: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", encoded.join(","))
        }
        scalar => serde_json::to_string(scalar).unwrap_or_default(),
    }
}

#[cfg(test)]
mod dedupe_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_id() {
        let a: Value = serde_json::from_str(r#"{"a": 1, "b": {"x": true, "y": [1, 2]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b": {"y": [1, 2], "x": true}, "a": 1}"#).unwrap();

        let id_a = derive_dedupe_id("jira-assets", ConnectorKind::AssetDiscovery, "created", &a);
        let id_b = derive_dedupe_id("jira-assets", ConnectorKind::AssetDiscovery, "created", &b);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn test_distinct_tuples_get_distinct_ids() {
        let payload = json!({"asset": "srv-01"});
        let base = derive_dedupe_id("jira-assets", ConnectorKind::AssetDiscovery, "created", &payload);

        assert_ne!(
            base,
            derive_dedupe_id("other-feed", ConnectorKind::AssetDiscovery, "created", &payload)
        );
        assert_ne!(
            base,
            derive_dedupe_id("jira-assets", ConnectorKind::AssetLifecycle, "created", &payload)
        );
        assert_ne!(
            base,
            derive_dedupe_id("jira-assets", ConnectorKind::AssetDiscovery, "updated", &payload)
        );
        assert_ne!(
            base,
            derive_dedupe_id(
                "jira-assets",
                ConnectorKind::AssetDiscovery,
                "created",
                &json!({"asset": "srv-02"})
            )
        );
    }

    #[test]
    fn test_id_is_hex_sha256() {
        let id = derive_dedupe_id("feed", ConnectorKind::CyberMetric, "heartbeat", &json!({}));
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_array_order_still_matters() {
        let a = json!({"items": [1, 2]});
        let b = json!({"items": [2, 1]});
        assert_ne!(
            derive_dedupe_id("feed", ConnectorKind::IndicatorMetric, "updated", &a),
            derive_dedupe_id("feed", ConnectorKind::IndicatorMetric, "updated", &b)
        );
    }
}
