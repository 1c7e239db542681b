use super::*;
use serde_json::json;

#[test]
fn test_status_determines_healthy() {
    assert!(HealthCheckResult::ok("fine").is_healthy());

    let warn = HealthCheckResult::warning("slow", Map::new());
    assert!(!warn.is_healthy());
    assert_eq!(warn.status, HealthStatus::Warning);

    let err = HealthCheckResult::error("down", Map::new());
    assert!(!err.is_healthy());
    assert_eq!(err.status, HealthStatus::Error);
}

#[test]
fn test_to_map_shape() {
    let mut details = Map::new();
    details.insert("latency_ms".into(), json!(842));
    let result = HealthCheckResult::warning("Probe exceeded latency budget", details);

    let map = result.to_map();
    assert_eq!(map["status"], json!("warning"));
    assert_eq!(map["message"], json!("Probe exceeded latency budget"));
    assert_eq!(map["details"]["latency_ms"], json!(842));
    // checked_at is ISO-8601 UTC with trailing Z
    let checked_at = map["checked_at"].as_str().unwrap();
    assert!(checked_at.ends_with('Z'), "expected UTC timestamp, got {checked_at}");
}

#[test]
fn test_serde_roundtrip() {
    let result = HealthCheckResult::ok("Health check passed.");
    let encoded = serde_json::to_string(&result).unwrap();
    let decoded: HealthCheckResult = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, result);
}

#[test]
fn test_status_serializes_lowercase() {
    assert_eq!(serde_json::to_value(HealthStatus::Ok).unwrap(), json!("ok"));
    assert_eq!(serde_json::to_value(HealthStatus::Error).unwrap(), json!("error"));
}
