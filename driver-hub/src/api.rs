//! Admin API for connectors and drivers.
//!
//! All connector writes funnel through `validate_store_request`; a failed
//! validation returns 422 with the field-keyed error map and writes nothing.
//! Secrets in `config` never leave this API - responses carry summaries
//! only.

use crate::checker::{CheckerError, HealthChecker};
use crate::registry::DriverRegistry;
use crate::validation::{
    validate_store_request, ConfigValidationError, StoreConnectorRequest, WriteMode,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use trellis::connector::{ConnectorRecord, ConnectorStore};

/// Shared application state
#[derive(Clone)]
pub struct DriverHubAppState {
    pub registry: Arc<DriverRegistry>,
    pub store: Arc<dyn ConnectorStore>,
    pub checker: Arc<HealthChecker>,
}

/// Connector as returned by the API: everything except the config payload.
#[derive(Serialize)]
struct ConnectorSummary {
    key: String,
    name: String,
    kind: String,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
    #[serde(rename = "lastHealthAt", skip_serializing_if = "Option::is_none")]
    last_health_at: Option<String>,
    #[serde(rename = "lastHealth", skip_serializing_if = "Option::is_none")]
    last_health: Option<Map<String, Value>>,
    #[serde(rename = "configFields")]
    config_fields: Vec<String>,
}

impl ConnectorSummary {
    fn from_record(record: &ConnectorRecord) -> Self {
        let config_fields = record
            .config
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            key: record.key.clone(),
            name: record.name.clone(),
            kind: record.kind.as_str().to_string(),
            enabled: record.enabled,
            meta: record.meta.clone(),
            last_health_at: record
                .last_health_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            last_health: record.last_health.as_ref().map(|h| h.to_map()),
            config_fields,
        }
    }
}

#[derive(Serialize)]
struct ConnectorListResponse {
    count: usize,
    connectors: Vec<ConnectorSummary>,
}

#[derive(Serialize)]
struct DriverListResponse {
    drivers: Vec<String>,
}

#[derive(Serialize)]
struct ValidationResponse {
    errors: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the admin API router
pub fn create_admin_router(state: DriverHubAppState) -> Router {
    Router::new()
        .route("/api/drivers", get(list_drivers))
        .route("/api/connectors", get(list_connectors).post(create_connector))
        .route(
            "/api/connectors/:key",
            get(get_connector)
                .put(update_connector)
                .delete(delete_connector),
        )
        .route("/api/connectors/:key/health", post(check_connector_health))
        .with_state(Arc::new(state))
}

/// GET /api/drivers - Registered driver keys
async fn list_drivers(State(state): State<Arc<DriverHubAppState>>) -> Json<DriverListResponse> {
    Json(DriverListResponse {
        drivers: state.registry.keys(),
    })
}

/// GET /api/connectors - List all connectors
async fn list_connectors(
    State(state): State<Arc<DriverHubAppState>>,
) -> Result<Json<ConnectorListResponse>, AdminError> {
    let records = state.store.list().map_err(AdminError::store)?;
    let connectors: Vec<ConnectorSummary> =
        records.iter().map(ConnectorSummary::from_record).collect();
    Ok(Json(ConnectorListResponse {
        count: connectors.len(),
        connectors,
    }))
}

/// GET /api/connectors/:key - Fetch one connector
async fn get_connector(
    State(state): State<Arc<DriverHubAppState>>,
    Path(key): Path<String>,
) -> Result<Json<ConnectorSummary>, AdminError> {
    let record = state
        .store
        .get(&key)
        .map_err(AdminError::store)?
        .ok_or_else(|| AdminError::NotFound(key))?;
    Ok(Json(ConnectorSummary::from_record(&record)))
}

/// POST /api/connectors - Create a connector
async fn create_connector(
    State(state): State<Arc<DriverHubAppState>>,
    Json(request): Json<StoreConnectorRequest>,
) -> Result<Response, AdminError> {
    let record =
        validate_store_request(&request, &state.registry, state.store.as_ref(), WriteMode::Create)?;
    state.store.upsert(&record).map_err(AdminError::store)?;
    info!(connector = %record.key, kind = %record.kind, "connector created");
    Ok((StatusCode::CREATED, Json(ConnectorSummary::from_record(&record))).into_response())
}

/// PUT /api/connectors/:key - Replace a connector
async fn update_connector(
    State(state): State<Arc<DriverHubAppState>>,
    Path(key): Path<String>,
    Json(request): Json<StoreConnectorRequest>,
) -> Result<Json<ConnectorSummary>, AdminError> {
    if request.key != key {
        let mut errors = ConfigValidationError::new();
        errors.add("key", "does not match the request path");
        return Err(AdminError::Validation(errors));
    }
    let record =
        validate_store_request(&request, &state.registry, state.store.as_ref(), WriteMode::Update)?;
    state.store.upsert(&record).map_err(AdminError::store)?;
    info!(connector = %record.key, "connector updated");
    Ok(Json(ConnectorSummary::from_record(&record)))
}

/// DELETE /api/connectors/:key - Remove a connector
async fn delete_connector(
    State(state): State<Arc<DriverHubAppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, AdminError> {
    let removed = state.store.delete(&key).map_err(AdminError::store)?;
    if !removed {
        return Err(AdminError::NotFound(key));
    }
    info!(connector = %key, "connector deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/connectors/:key/health - Run an on-demand health check
async fn check_connector_health(
    State(state): State<Arc<DriverHubAppState>>,
    Path(key): Path<String>,
) -> Result<Json<Map<String, Value>>, AdminError> {
    let result = state.checker.check_connector(&key).await?;
    Ok(Json(result.to_map()))
}

/// Application error types
enum AdminError {
    Validation(ConfigValidationError),
    NotFound(String),
    Internal(String),
}

impl AdminError {
    fn store(e: anyhow::Error) -> Self {
        error!("connector store failure: {}", e);
        AdminError::Internal("connector store unavailable".to_string())
    }
}

impl From<ConfigValidationError> for AdminError {
    fn from(e: ConfigValidationError) -> Self {
        AdminError::Validation(e)
    }
}

impl From<CheckerError> for AdminError {
    fn from(e: CheckerError) -> Self {
        match e {
            CheckerError::UnknownConnector(key) => AdminError::NotFound(key),
            CheckerError::UnknownDriver(key) => {
                AdminError::Internal(format!("no driver registered for '{}'", key))
            }
            CheckerError::Store(e) => AdminError::store(e),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            AdminError::Validation(e) => {
                let body = Json(ValidationResponse { errors: e.errors });
                (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
            }
            AdminError::NotFound(key) => {
                let body = Json(ErrorResponse {
                    error: format!("no connector with key '{}'", key),
                });
                (StatusCode::NOT_FOUND, body).into_response()
            }
            AdminError::Internal(msg) => {
                let body = Json(ErrorResponse { error: msg });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
