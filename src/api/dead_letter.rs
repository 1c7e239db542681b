//! Dead-letter admin view.
//!
//! Dispatch failures are visible here rather than surfaced to the original
//! producer, which already received its synchronous accept.

use crate::lane::{DeadLetter, DeadLetterStore};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// State for the dead-letter API.
#[derive(Clone)]
pub struct DeadLetterAppState {
    pub dead_letters: Arc<DeadLetterStore>,
}

#[derive(Serialize)]
struct DeadLetterListResponse {
    count: usize,
    #[serde(rename = "deadLetters")]
    dead_letters: Vec<DeadLetter>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_dead_letter_router(state: DeadLetterAppState) -> Router {
    Router::new()
        .route("/api/dead-letters", get(list_dead_letters))
        .route("/api/dead-letters/:dedupe_id", get(get_dead_letter))
        .with_state(Arc::new(state))
}

/// GET /api/dead-letters - All terminal failures, oldest first
async fn list_dead_letters(State(state): State<Arc<DeadLetterAppState>>) -> Response {
    let dead_letters = state.dead_letters.list();
    Json(DeadLetterListResponse {
        count: dead_letters.len(),
        dead_letters,
    })
    .into_response()
}

/// GET /api/dead-letters/:dedupe_id - Single dead letter by dedupe id
async fn get_dead_letter(
    State(state): State<Arc<DeadLetterAppState>>,
    Path(dedupe_id): Path<String>,
) -> Response {
    match state.dead_letters.get(&dedupe_id) {
        Some(letter) => Json(letter).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no dead letter for dedupe id '{}'", dedupe_id),
            }),
        )
            .into_response(),
    }
}
