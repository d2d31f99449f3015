//! HTTP tests for the generate, verify and health endpoints.

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{Duration, Utc};
use licensa::config::DatabaseConfig;
use licensa::keys::{FileKeyProvider, StaticKeyProvider};
use licensa::server::{build_router, AppState, Database};
use serde_json::{json, Value};
use tower::ServiceExt;

const PRIVATE_PEM: &str = include_str!("fixtures/private_key.pem");

async fn setup_test_app() -> Router {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: "sqlite::memory:".to_string(),
        ..Default::default()
    };
    let db = Database::connect(&config).await.unwrap();
    db.migrate().await.unwrap();

    let keys = Arc::new(StaticKeyProvider::from_private_pem(PRIVATE_PEM).unwrap());
    build_router(AppState::new(Arc::new(db), keys))
}

async fn json_request(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body_bytes = body
        .map(|v| serde_json::to_vec(&v).unwrap())
        .unwrap_or_default();

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body_bytes))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, body)
}

fn acme_body(expiration_date: &str) -> Value {
    json!({
        "owner": "Acme Inc",
        "access_level": { "max_users": 100, "max_messages": 10000 },
        "expiration_date": expiration_date
    })
}

fn next_year() -> String {
    (Utc::now() + Duration::days(365)).to_rfc3339()
}

#[tokio::test]
async fn generate_then_verify_is_valid() {
    let app = setup_test_app().await;

    let (status, issued) =
        json_request(app.clone(), "POST", "/api/license/generate", Some(acme_body(&next_year())))
            .await;
    assert_eq!(status, StatusCode::OK);
    assert!(issued["license_key"].is_string());
    assert!(issued["license_id"].is_string());
    assert!(issued["expires_at"].as_str().unwrap().ends_with('Z'));

    let (status, body) = json_request(
        app,
        "POST",
        "/api/license/verify",
        Some(json!({ "license_key": issued["license_key"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "valid");
    assert_eq!(body["license_id"], issued["license_id"]);
    assert_eq!(body["owner"], "Acme Inc");
    assert_eq!(body["max_users"], 100);
    assert_eq!(body["max_messages"], 10000);
}

#[tokio::test]
async fn tampered_license_is_invalid() {
    let app = setup_test_app().await;

    let (_, issued) =
        json_request(app.clone(), "POST", "/api/license/generate", Some(acme_body(&next_year())))
            .await;

    let raw = B64.decode(issued["license_key"].as_str().unwrap()).unwrap();
    let mut record: Value = serde_json::from_slice(&raw).unwrap();
    record["max_users"] = json!(999);
    let forged = B64.encode(serde_json::to_vec(&record).unwrap());

    let (status, body) = json_request(
        app,
        "POST",
        "/api/license/verify",
        Some(json!({ "license_key": forged })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "invalid" }));
}

#[tokio::test]
async fn malformed_license_key_is_bad_request() {
    let app = setup_test_app().await;

    let (status, body) = json_request(
        app,
        "POST",
        "/api/license/verify",
        Some(json!({ "license_key": "not base64 at all!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MALFORMED_LICENSE");
}

#[tokio::test]
async fn second_license_for_owner_is_conflict() {
    let app = setup_test_app().await;

    let (status, _) =
        json_request(app.clone(), "POST", "/api/license/generate", Some(acme_body(&next_year())))
            .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        json_request(app, "POST", "/api/license/generate", Some(acme_body(&next_year()))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn invalid_fields_are_rejected() {
    let app = setup_test_app().await;

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/license/generate",
        Some(json!({
            "owner": "Acme Inc",
            "access_level": { "max_users": 0, "max_messages": 10 },
            "expiration_date": next_year()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FIELD");
    assert_eq!(body["error"]["details"]["field"], "max_users");

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/license/generate",
        Some(acme_body("2001-01-01")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "expires_at");

    let (status, body) = json_request(
        app,
        "POST",
        "/api/license/generate",
        Some(acme_body("next tuesday")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "expiration_date");
}

#[tokio::test]
async fn missing_fields_are_invalid_request() {
    let app = setup_test_app().await;

    let (status, body) = json_request(
        app,
        "POST",
        "/api/license/generate",
        Some(json!({ "owner": "Acme Inc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn date_only_expiration_is_end_of_day() {
    let app = setup_test_app().await;
    let date = (Utc::now() + Duration::days(30)).format("%Y-%m-%d").to_string();

    let (status, issued) =
        json_request(app, "POST", "/api/license/generate", Some(acme_body(&date))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(issued["expires_at"], format!("{date}T23:59:59Z"));
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = setup_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn health_reports_database_and_keys() {
    let app = setup_test_app().await;

    let (status, body) = json_request(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "licensa");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["database"]["db_type"], "sqlite");
    assert_eq!(body["keys_loaded"], true);
}

#[tokio::test]
async fn missing_keys_degrade_health_and_block_issuance() {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: "sqlite::memory:".to_string(),
        ..Default::default()
    };
    let db = Database::connect(&config).await.unwrap();
    db.migrate().await.unwrap();
    let keys = Arc::new(FileKeyProvider::new(
        "/nonexistent/private_key.pem",
        "/nonexistent/public_key.pem",
    ));
    let app = build_router(AppState::new(Arc::new(db), keys));

    let (status, body) = json_request(app.clone(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["keys_loaded"], false);

    let (status, body) =
        json_request(app, "POST", "/api/license/generate", Some(acme_body(&next_year()))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "KEY_UNAVAILABLE");
}

#[tokio::test]
async fn default_state_reports_unprotected_routes() {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: "sqlite::memory:".to_string(),
        ..Default::default()
    };
    let db = Database::connect(&config).await.unwrap();
    let keys = Arc::new(StaticKeyProvider::from_private_pem(PRIVATE_PEM).unwrap());

    assert!(!AppState::new(Arc::new(db), keys).routes_protected());
}

#[cfg(not(feature = "admin-api"))]
#[tokio::test]
async fn admin_routes_absent_without_admin_api() {
    let app = setup_test_app().await;

    let (status, _) = json_request(app, "GET", "/api/admin/licenses", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
