// Integration tests for the connector admin API

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use driver_hub::{create_admin_router, default_drivers, DriverHubAppState, DriverRegistry, HealthChecker};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use trellis::connector::{ConnectorStore, MemoryConnectorStore, SqliteConnectorStore};

fn create_test_app() -> (Router, Arc<MemoryConnectorStore>) {
    let store = Arc::new(MemoryConnectorStore::new());
    let registry = Arc::new(DriverRegistry::new(default_drivers()).unwrap());
    let checker = Arc::new(HealthChecker::new(
        Arc::clone(&registry),
        store.clone() as Arc<dyn ConnectorStore>,
    ));

    let app = create_admin_router(DriverHubAppState {
        registry,
        store: store.clone(),
        checker,
    });
    (app, store)
}

fn create_sqlite_app(store: Arc<SqliteConnectorStore>) -> Router {
    let registry = Arc::new(DriverRegistry::new(default_drivers()).unwrap());
    let checker = Arc::new(HealthChecker::new(
        Arc::clone(&registry),
        store.clone() as Arc<dyn ConnectorStore>,
    ));
    create_admin_router(DriverHubAppState {
        registry,
        store,
        checker,
    })
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_create_and_get_connector() {
    let (app, _store) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "jira-assets",
                "name": "Jira Assets",
                "kind": "asset.discovery",
                "config": {}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = response_json(response).await;
    assert_eq!(json["key"], "jira-assets");
    assert_eq!(json["kind"], "asset.discovery");
    assert_eq!(json["enabled"], true);
    // Config payloads never come back through the API
    assert!(json.get("config").is_none());

    let response = app
        .oneshot(get_request("/api/connectors/jira-assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["name"], "Jira Assets");
}

#[tokio::test]
async fn test_missing_secret_rejected_and_not_persisted() {
    let (app, store) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "corp-sso",
                "name": "Corporate SSO",
                "kind": "auth.provider",
                "config": {
                    "provider": "oidc",
                    "issuer": "https://id.example.com",
                    "client_id": "trellis"
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = response_json(response).await;
    assert_eq!(json["errors"]["config.client_secret"][0], "is required");

    // A failed validation writes nothing
    assert!(store.get("corp-sso").unwrap().is_none());
}

#[tokio::test]
async fn test_entra_tolerates_missing_issuer() {
    let (app, _store) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "entra-sso",
                "name": "Entra SSO",
                "kind": "auth.provider",
                "config": {
                    "provider": "entra",
                    "client_id": "trellis",
                    "client_secret": "s3cret",
                    "tenant_id": "11111111-2222-3333-4444-555555555555"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // tenant_id is still required for entra
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "entra-sso-2",
                "name": "Entra SSO 2",
                "kind": "auth.provider",
                "config": {
                    "provider": "entra",
                    "client_id": "trellis",
                    "client_secret": "s3cret"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = response_json(response).await;
    assert_eq!(json["errors"]["config.tenant_id"][0], "is required");
}

#[tokio::test]
async fn test_unknown_provider_rejected() {
    let (app, _store) = create_test_app();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "corp-sso",
                "name": "Corporate SSO",
                "kind": "auth.provider",
                "config": {"provider": "kerberos"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = response_json(response).await;
    assert_eq!(
        json["errors"]["config.provider"][0],
        "no driver registered for 'kerberos'"
    );
}

#[tokio::test]
async fn test_duplicate_key_rejected() {
    let (app, _store) = create_test_app();

    let body = json!({
        "key": "jira-assets",
        "name": "Jira Assets",
        "kind": "asset.discovery",
        "config": {}
    });

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/connectors", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(json_request(Method::POST, "/api/connectors", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = response_json(response).await;
    assert_eq!(json["errors"]["key"][0], "is already in use");
}

#[tokio::test]
async fn test_update_requires_existing_and_matching_key() {
    let (app, _store) = create_test_app();

    let body = json!({
        "key": "jira-assets",
        "name": "Jira Assets",
        "kind": "asset.discovery",
        "config": {}
    });

    // No such connector yet
    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            "/api/connectors/jira-assets",
            body.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = response_json(response).await;
    assert_eq!(json["errors"]["key"][0], "no such connector");

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/connectors", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Body key must match the path
    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            "/api/connectors/other-key",
            body.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut updated = body;
    updated["name"] = json!("Jira Assets (prod)");
    updated["enabled"] = json!(false);
    let response = app
        .oneshot(json_request(
            Method::PUT,
            "/api/connectors/jira-assets",
            updated,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["name"], "Jira Assets (prod)");
    assert_eq!(json["enabled"], false);
}

#[tokio::test]
async fn test_delete_connector() {
    let (app, _store) = create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "jira-assets",
                "name": "Jira Assets",
                "kind": "asset.discovery",
                "config": {}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let delete = || {
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/connectors/jira-assets")
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(get_request("/api/connectors/jira-assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_on_demand_health_check() {
    let (app, store) = create_test_app();

    // Push-ingest connector with no endpoint: always healthy
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "jira-assets",
                "name": "Jira Assets",
                "kind": "asset.discovery",
                "config": {}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/connectors/jira-assets/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["message"], "Health check passed.");
    assert_eq!(json["details"], json!({}));
    assert!(json["checked_at"].as_str().is_some());

    // Result is persisted on the record
    let record = store.get("jira-assets").unwrap().unwrap();
    assert!(record.last_health_at.is_some());

    let response = app
        .oneshot(get_request("/api/connectors/jira-assets"))
        .await
        .unwrap();
    let json = response_json(response).await;
    assert_eq!(json["lastHealth"]["status"], "ok");
}

#[tokio::test]
async fn test_health_check_unknown_connector() {
    let (app, _store) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/connectors/nope/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("connectors.db");
    let key = BASE64.encode([7u8; 32]);

    let store = Arc::new(SqliteConnectorStore::new(&db_path, &key).unwrap());
    let app = create_sqlite_app(store);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/connectors",
            json!({
                "key": "entra-sso",
                "name": "Entra SSO",
                "kind": "auth.provider",
                "config": {
                    "provider": "entra",
                    "client_id": "trellis",
                    "client_secret": "s3cret",
                    "tenant_id": "11111111-2222-3333-4444-555555555555"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Fresh store over the same file with the same key decrypts the config
    let reopened = SqliteConnectorStore::new(&db_path, &key).unwrap();
    let record = reopened.get("entra-sso").unwrap().unwrap();
    assert_eq!(record.config["client_secret"], "s3cret");
    assert_eq!(record.name, "Entra SSO");
}

#[tokio::test]
async fn test_list_drivers() {
    let (app, _store) = create_test_app();

    let response = app.oneshot(get_request("/api/drivers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;

    let drivers: Vec<&str> = json["drivers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_str().unwrap())
        .collect();
    for expected in ["oidc", "entra", "saml", "ldap", "asset.discovery", "cyber.metric"] {
        assert!(drivers.contains(&expected), "missing driver {}", expected);
    }
}
