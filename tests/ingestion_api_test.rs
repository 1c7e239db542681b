// Integration tests for the envelope ingestion API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use trellis::api::{create_dead_letter_router, create_router, AppState, DeadLetterAppState};
use trellis::config::new_runtime_config;
use trellis::connector::ConnectorKind;
use trellis::dispatch::{
    Dispatcher, EnvelopeHandler, HandlerError, HandlerRegistry, WILDCARD_EVENT,
};
use trellis::envelope::BusEnvelope;
use trellis::lane::{DeadLetterStore, DedupeStore, IntegrationLane, LaneConfig, MemoryDedupeStore};

struct RejectingHandler;

#[async_trait::async_trait]
impl EnvelopeHandler for RejectingHandler {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn handle(&self, _envelope: &BusEnvelope) -> Result<(), HandlerError> {
        Err(HandlerError::Permanent("unsupported payload".to_string()))
    }
}

struct AcceptingHandler;

#[async_trait::async_trait]
impl EnvelopeHandler for AcceptingHandler {
    fn name(&self) -> &str {
        "accepting"
    }

    async fn handle(&self, _envelope: &BusEnvelope) -> Result<(), HandlerError> {
        Ok(())
    }
}

struct TestApp {
    router: Router,
    dedupe: Arc<MemoryDedupeStore>,
    dead_letters: Arc<DeadLetterStore>,
}

fn create_test_app(handler: Arc<dyn EnvelopeHandler>) -> TestApp {
    let mut registry = HandlerRegistry::new();
    registry.register(ConnectorKind::IncidentEvent, WILDCARD_EVENT, true, handler);

    let dedupe = Arc::new(MemoryDedupeStore::new());
    let dead_letters = Arc::new(DeadLetterStore::new());
    let config = LaneConfig {
        workers: 1,
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 5,
        defer_delay_ms: 1,
        queue_depth: 64,
    };
    let lane = Arc::new(IntegrationLane::start(
        config,
        Dispatcher::new(registry),
        dedupe.clone() as Arc<dyn DedupeStore>,
        Arc::clone(&dead_letters),
    ));

    let router = create_router(AppState {
        lane,
        runtime_config: new_runtime_config(),
    })
    .merge(create_dead_letter_router(DeadLetterAppState {
        dead_letters: Arc::clone(&dead_letters),
    }));

    TestApp {
        router,
        dedupe,
        dead_letters,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_for<F: Fn() -> bool>(cond: F, budget: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn test_ingest_envelope_accepted_and_dispatched() {
    let app = create_test_app(Arc::new(AcceptingHandler));

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/envelopes",
            json!({
                "kind": "incident.event",
                "event": "opened",
                "sourceKey": "pager-feed",
                "payload": {"incident": "INC-1"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = response_json(response).await;
    assert_eq!(json["kind"], "incident.event");
    assert_eq!(json["event"], "opened");
    let dedupe_id = json["dedupeId"].as_str().unwrap().to_string();

    let dedupe = app.dedupe;
    assert!(wait_for(|| dedupe.is_dispatched(&dedupe_id), Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_structural_error_rejected_before_queue() {
    let app = create_test_app(Arc::new(AcceptingHandler));

    let response = app
        .router
        .oneshot(post_json(
            "/api/envelopes",
            json!({
                "kind": "incident.event",
                "sourceKey": "pager-feed",
                "payload": {}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("event"));
}

#[tokio::test]
async fn test_batch_mixed_results() {
    let app = create_test_app(Arc::new(AcceptingHandler));

    let response = app
        .router
        .oneshot(post_json(
            "/api/envelopes/batch",
            json!({
                "envelopes": [
                    {
                        "kind": "incident.event",
                        "event": "opened",
                        "sourceKey": "pager-feed",
                        "payload": {"incident": "INC-1"}
                    },
                    {
                        "kind": "not.a.kind",
                        "event": "opened",
                        "sourceKey": "pager-feed",
                        "payload": {}
                    }
                ]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = response_json(response).await;
    assert_eq!(json["accepted"], 1);
    assert_eq!(json["rejected"], 1);
    assert!(json["results"][0]["dedupeId"].as_str().is_some());
    assert!(json["results"][1]["error"].as_str().is_some());
}

#[tokio::test]
async fn test_permanent_failure_lands_in_dead_letter_view() {
    let app = create_test_app(Arc::new(RejectingHandler));

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/envelopes",
            json!({
                "kind": "incident.event",
                "event": "opened",
                "sourceKey": "pager-feed",
                "payload": {"incident": "INC-2"}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = response_json(response).await;
    let dedupe_id = json["dedupeId"].as_str().unwrap().to_string();

    let dead_letters = Arc::clone(&app.dead_letters);
    assert!(wait_for(|| !dead_letters.is_empty(), Duration::from_secs(2)).await);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/dead-letters")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["deadLetters"][0]["dedupeId"], dedupe_id.as_str());
    assert_eq!(json["deadLetters"][0]["reason"], "permanent handler failure");

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/api/dead-letters/{}", dedupe_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
