//! Envelope ingestion endpoints.
//!
//! The producer side of the lane: structurally invalid envelopes are
//! rejected here with a 400 before anything touches the queue. A 202 means
//! the envelope is queued; dispatch failures surface through the
//! dead-letter view, not to the producer.

use crate::config::SharedRuntimeConfig;
use crate::envelope::BusEnvelope;
use crate::lane::IntegrationLane;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub lane: Arc<IntegrationLane>,
    pub runtime_config: SharedRuntimeConfig,
}

/// Success response for a queued envelope
#[derive(Serialize)]
struct EnvelopeResponse {
    #[serde(rename = "dedupeId")]
    dedupe_id: String,
    kind: String,
    event: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Batch request
#[derive(Deserialize)]
struct BatchRequest {
    envelopes: Vec<Map<String, Value>>,
}

/// Batch response
#[derive(Serialize)]
struct BatchResponse {
    accepted: usize,
    rejected: usize,
    results: Vec<BatchResult>,
}

#[derive(Serialize)]
struct BatchResult {
    #[serde(rename = "dedupeId")]
    dedupe_id: Option<String>,
    error: Option<String>,
}

/// Create API router with ingestion endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/envelopes", post(ingest_envelope))
        .route("/api/envelopes/batch", post(ingest_batch))
        .with_state(Arc::new(state))
}

/// POST /api/envelopes - Ingest a single envelope
async fn ingest_envelope(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let limit = runtime_limit(&state, false);
    if body.len() > limit {
        return Err(AppError::PayloadTooLarge);
    }

    let map: Map<String, Value> = serde_json::from_slice(&body)
        .map_err(|e| AppError::StructuralError(e.to_string()))?;

    // Fail fast before queuing - garbage never crosses the lane
    let envelope =
        BusEnvelope::from_map(&map).map_err(|e| AppError::StructuralError(e.to_string()))?;

    info!(
        dedupe_id = %envelope.dedupe_id(),
        kind = %envelope.kind(),
        event = %envelope.event(),
        source = %envelope.source_key(),
        "Ingesting envelope"
    );

    state.lane.enqueue(&envelope).await.map_err(|e| {
        error!(error = %e, "Failed to enqueue envelope");
        AppError::QueueError(e.to_string())
    })?;

    let response = EnvelopeResponse {
        dedupe_id: envelope.dedupe_id().to_string(),
        kind: envelope.kind().as_str().to_string(),
        event: envelope.event().to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// POST /api/envelopes/batch - Ingest multiple envelopes
async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let limit = runtime_limit(&state, true);
    if body.len() > limit {
        return Err(AppError::PayloadTooLarge);
    }

    let request: BatchRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::StructuralError(e.to_string()))?;

    if request.envelopes.is_empty() {
        return Err(AppError::StructuralError(
            "Batch request must contain at least one envelope".to_string(),
        ));
    }

    info!(count = request.envelopes.len(), "Ingesting envelope batch");

    let mut results = Vec::new();
    let mut accepted = 0;
    let mut rejected = 0;

    for map in &request.envelopes {
        let envelope = match BusEnvelope::from_map(map) {
            Ok(envelope) => envelope,
            Err(e) => {
                rejected += 1;
                results.push(BatchResult {
                    dedupe_id: None,
                    error: Some(format!("validation failed: {}", e)),
                });
                continue;
            }
        };

        match state.lane.enqueue(&envelope).await {
            Ok(()) => {
                accepted += 1;
                results.push(BatchResult {
                    dedupe_id: Some(envelope.dedupe_id().to_string()),
                    error: None,
                });
            }
            Err(e) => {
                error!(error = %e, dedupe_id = %envelope.dedupe_id(), "Failed to enqueue envelope");
                rejected += 1;
                results.push(BatchResult {
                    dedupe_id: Some(envelope.dedupe_id().to_string()),
                    error: Some(format!("enqueue failed: {}", e)),
                });
            }
        }
    }

    let response = BatchResponse {
        accepted,
        rejected,
        results,
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

fn runtime_limit(state: &AppState, batch: bool) -> usize {
    let config = state
        .runtime_config
        .read()
        .expect("RuntimeConfig lock poisoned");
    if batch {
        config.body_size_limit_batch_bytes
    } else {
        config.body_size_limit_single_bytes
    }
}

/// Application error types
enum AppError {
    StructuralError(String),
    QueueError(String),
    PayloadTooLarge,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::StructuralError(msg) => {
                let body = Json(ErrorResponse { error: msg });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::QueueError(msg) => {
                let body = Json(ErrorResponse {
                    error: format!("enqueue failed: {}", msg),
                });
                (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
            }
            AppError::PayloadTooLarge => {
                let body = Json(ErrorResponse {
                    error: "payload too large".to_string(),
                });
                (StatusCode::PAYLOAD_TOO_LARGE, body).into_response()
            }
        }
    }
}
