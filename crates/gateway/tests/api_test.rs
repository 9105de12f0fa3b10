//! Full-router tests: each test builds an in-memory stack and drives it
//! through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use isx_auth::AuthService;
use isx_domain::config::{Config, Environment, ServiceMode};
use isx_domain::model::IsnVisibility;
use isx_gateway::api;
use isx_gateway::cache::{PublicIsnCache, SchemaCache};
use isx_gateway::state::AppState;
use isx_store::Store;

const SECRET: &str = "0123456789abcdef0123456789abcdef";
const SKIP_URL: &str = "https://github.com/skip/validation/main/schema.json";

const TEST_SCHEMA: &str = r#"{
    "type": "object",
    "properties": { "test": { "type": "string" } },
    "required": ["test"],
    "additionalProperties": false
}"#;

fn test_config() -> Config {
    Config {
        environment: Environment::Test,
        host: "127.0.0.1".into(),
        port: 8080,
        secret_key: SECRET.into(),
        database_url: "sqlite::memory:".into(),
        log_level: "info".into(),
        allowed_origins: vec!["http://localhost:5173".into()],
        read_timeout: Duration::from_secs(15),
        write_timeout: Duration::from_secs(15),
        idle_timeout: Duration::from_secs(60),
        max_signal_payload_size: 5 * 1024 * 1024,
        max_api_request_size: 64 * 1024,
        rate_limit_rps: 0,
        rate_limit_burst: 0,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connection_lifetime: Duration::from_secs(3600),
        public_base_url: "http://localhost:8080".into(),
        service_mode: ServiceMode::All,
        schema_allowed_hosts: vec!["github.com".into(), "raw.githubusercontent.com".into()],
    }
}

async fn build_app_with(store: Store) -> (Router, AppState) {
    let config = Arc::new(test_config());
    let state = AppState {
        config,
        store: store.clone(),
        auth: AuthService::new(store.clone(), SECRET),
        schema_cache: Arc::new(SchemaCache::load(store.clone()).await.unwrap()),
        public_isns: Arc::new(PublicIsnCache::load(&store).await.unwrap()),
        http: reqwest::Client::new(),
    };
    (api::router(state.clone()), state)
}

async fn build_app() -> (Router, AppState) {
    let store = Store::connect("sqlite::memory:", 1, 1, Duration::from_secs(3600))
        .await
        .unwrap();
    build_app_with(store).await
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, HeaderMap) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value, headers)
}

async fn register(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    let (status, body, _) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    (status, body)
}

async fn login_token(app: &Router, email: &str, password: &str) -> String {
    let (status, body, _) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["access_token"].as_str().unwrap().to_string()
}

/// Owner + private ISN `isn-a` + skip-validation signal type `t` v1.0.0.
/// Returns a fresh owner token carrying the new ISN perms.
async fn seed_isn(app: &Router) -> String {
    let (status, _) = register(app, "owner@x.org", "passwordAAA").await;
    assert_eq!(status, StatusCode::CREATED);
    let token = login_token(app, "owner@x.org", "passwordAAA").await;

    let (status, body, _) = send(
        app,
        Method::POST,
        "/api/isn",
        Some(&token),
        Some(json!({ "slug": "isn-a", "title": "ISN A", "visibility": "private" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "isn create failed: {body}");

    let (status, body, _) = send(
        app,
        Method::POST,
        "/api/isn/isn-a/signal_types",
        Some(&token),
        Some(json!({
            "slug": "t",
            "title": "Test type",
            "bump_type": "major",
            "schema_url": SKIP_URL,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signal type create failed: {body}");
    assert_eq!(body["sem_ver"], "1.0.0", "first major bump yields 1.0.0");

    // Refresh claims so the new ISN appears in the token.
    login_token(app, "owner@x.org", "passwordAAA").await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registration & login
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn first_registrant_is_owner_second_is_member() {
    let (app, _) = build_app().await;

    let (status, body) = register(&app, "a@x.org", "passwordAAA").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "owner");

    let (status, body) = register(&app, "b@x.org", "passwordAAA").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "member");
}

#[tokio::test]
async fn duplicate_email_conflicts_case_insensitively() {
    let (app, _) = build_app().await;
    register(&app, "a@x.org", "passwordAAA").await;
    let (status, body) = register(&app, "A@X.ORG", "passwordAAA").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "resource_already_exists");
}

#[tokio::test]
async fn login_sets_refresh_cookie_scoped_to_oauth() {
    let (app, _) = build_app().await;
    register(&app, "a@x.org", "passwordAAA").await;

    let (status, _, headers) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "a@x.org", "password": "passwordAAA" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let cookie = headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("set-cookie header");
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/oauth"));
}

#[tokio::test]
async fn bad_credentials_and_error_shape() {
    let (app, _) = build_app().await;
    register(&app, "a@x.org", "passwordAAA").await;

    let (status, body, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "a@x.org", "password": "nope-nope-nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "invalid_credentials");
    assert!(body["message"].is_string());
    assert_eq!(body.as_object().unwrap().len(), 2, "error shape is exactly two fields");
}

#[tokio::test]
async fn malformed_body_uses_error_shape() {
    let (app, _) = build_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error_code"], "malformed_body");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Refresh rotation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn extract_refresh_cookie(headers: &HeaderMap) -> String {
    let raw = headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("set-cookie header");
    raw.split(';').next().unwrap().to_string()
}

async fn refresh(app: &Router, cookie: &str) -> (StatusCode, Value, HeaderMap) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/oauth/token?grant_type=refresh_token")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value, headers)
}

#[tokio::test]
async fn rotation_chain_then_replay_revokes_everything() {
    let (app, _) = build_app().await;
    register(&app, "a@x.org", "passwordAAA").await;
    let (_, _, headers) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "a@x.org", "password": "passwordAAA" })),
    )
    .await;
    let first = extract_refresh_cookie(&headers);

    let (status, body, headers) = refresh(&app, &first).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());
    let second = extract_refresh_cookie(&headers);
    assert_ne!(first, second);

    let (status, _, headers) = refresh(&app, &second).await;
    assert_eq!(status, StatusCode::OK);
    let third = extract_refresh_cookie(&headers);

    // Replay of the first token: reuse detected.
    let (status, body, _) = refresh(&app, &first).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "token_reuse_detected");

    // The chain is dead: even the newest token no longer rotates.
    let (status, _, _) = refresh(&app, &third).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signal ingestion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SIGNALS_URI: &str = "/api/isn/isn-a/signal_types/t/v1.0.0/signals";

#[tokio::test]
async fn submit_stores_and_versions_signals() {
    let (app, _) = build_app().await;
    let token = seed_isn(&app).await;

    let payload = json!({ "signals": [{ "local_ref": "L1", "content": { "test": "ok" } }] });
    let (status, body, _) = send(&app, Method::POST, SIGNALS_URI, Some(&token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["stored_count"], 1);
    assert_eq!(body["failed_count"], 0);
    assert_eq!(body["results"][0]["status"], "stored");
    assert_eq!(body["results"][0]["version_number"], 1);

    // Same local_ref again: version 2, same signal.
    let (status, body2, _) = send(&app, Method::POST, SIGNALS_URI, Some(&token), Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body2["results"][0]["version_number"], 2);
    assert_eq!(body2["results"][0]["signal_id"], body["results"][0]["signal_id"]);
}

#[tokio::test]
async fn schema_invalid_payloads_are_reported_per_item() {
    let store = Store::connect("sqlite::memory:", 1, 1, Duration::from_secs(3600))
        .await
        .unwrap();
    let (app, _) = build_app_with(store.clone()).await;
    let token = seed_isn(&app).await;

    // A second, schema-validated type created behind the cache's back —
    // the first submission exercises the miss-then-reload path too.
    let isn = store.get_isn_by_slug("isn-a").await.unwrap().unwrap();
    store
        .create_signal_type(
            isn.id,
            "strict",
            "1.0.0",
            "Strict",
            "https://example.org/strict.json",
            TEST_SCHEMA,
            None,
        )
        .await
        .unwrap();

    let uri = "/api/isn/isn-a/signal_types/strict/v1.0.0/signals";
    let (status, body, _) = send(
        &app,
        Method::POST,
        uri,
        Some(&token),
        Some(json!({ "signals": [{ "local_ref": "bad", "content": { "wrong": 1 } }] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["stored_count"], 0);
    assert_eq!(body["results"][0]["error_code"], "schema_validation_failed");

    // Mixed batch: one good, one bad → 200 with per-item statuses.
    let (status, body, _) = send(
        &app,
        Method::POST,
        uri,
        Some(&token),
        Some(json!({ "signals": [
            { "local_ref": "good", "content": { "test": "ok" } },
            { "local_ref": "bad", "content": { "wrong": 1 } },
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored_count"], 1);
    assert_eq!(body["failed_count"], 1);
}

#[tokio::test]
async fn empty_signal_array_is_rejected_whole() {
    let (app, _) = build_app().await;
    let token = seed_isn(&app).await;
    let (status, body, _) = send(
        &app,
        Method::POST,
        SIGNALS_URI,
        Some(&token),
        Some(json!({ "signals": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_field");
}

#[tokio::test]
async fn unknown_signal_type_is_request_level_404() {
    let (app, _) = build_app().await;
    let token = seed_isn(&app).await;
    let (status, body, _) = send(
        &app,
        Method::POST,
        "/api/isn/isn-a/signal_types/nope/v1.0.0/signals",
        Some(&token),
        Some(json!({ "signals": [{ "local_ref": "L1", "content": {} }] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "resource_not_found");
}

#[tokio::test]
async fn correlation_must_stay_inside_the_isn() {
    let (app, _) = build_app().await;
    let token = seed_isn(&app).await;

    let (_, body, _) = send(
        &app,
        Method::POST,
        SIGNALS_URI,
        Some(&token),
        Some(json!({ "signals": [{ "local_ref": "target", "content": { "test": "ok" } }] })),
    )
    .await;
    let target_id = body["results"][0]["signal_id"].as_str().unwrap().to_string();

    // Valid correlation.
    let (status, body, _) = send(
        &app,
        Method::POST,
        SIGNALS_URI,
        Some(&token),
        Some(json!({ "signals": [{
            "local_ref": "linked",
            "content": { "test": "ok" },
            "correlated_to_signal_id": target_id,
        }]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["stored_count"], 1);

    // Unknown target fails per-item.
    let (status, body, _) = send(
        &app,
        Method::POST,
        SIGNALS_URI,
        Some(&token),
        Some(json!({ "signals": [{
            "local_ref": "dangling",
            "content": { "test": "ok" },
            "correlated_to_signal_id": uuid::Uuid::new_v4(),
        }]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["results"][0]["error_code"], "correlation_target_not_found");
}

#[tokio::test]
async fn withdraw_hides_until_resubmission() {
    let (app, _) = build_app().await;
    let token = seed_isn(&app).await;
    let payload = json!({ "signals": [{ "local_ref": "L1", "content": { "test": "ok" } }] });
    send(&app, Method::POST, SIGNALS_URI, Some(&token), Some(payload.clone())).await;

    let (status, _, _) = send(
        &app,
        Method::PUT,
        "/api/isn/isn-a/signal_types/t/v1.0.0/signals/withdraw",
        Some(&token),
        Some(json!({ "local_ref": "L1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let search_uri = "/api/isn/isn-a/signal_types/t/v1.0.0/signals/search";
    let (_, body, _) = send(&app, Method::GET, search_uri, Some(&token), None).await;
    assert_eq!(body["count"], 0, "withdrawn signal hidden");

    let (_, body, _) = send(
        &app,
        Method::GET,
        &format!("{search_uri}?include_withdrawn=true"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["signals"][0]["is_withdrawn"], true);

    // Re-submission reactivates at version 2.
    let (_, body, _) = send(&app, Method::POST, SIGNALS_URI, Some(&token), Some(payload)).await;
    assert_eq!(body["results"][0]["version_number"], 2);
    let (_, body, _) = send(&app, Method::GET, search_uri, Some(&token), None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["signals"][0]["is_withdrawn"], false);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Permissions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn member_needs_a_grant_and_read_does_not_allow_write() {
    let (app, _) = build_app().await;
    let owner_token = seed_isn(&app).await;
    register(&app, "member@x.org", "passwordAAA").await;
    let member_token = login_token(&app, "member@x.org", "passwordAAA").await;

    let payload = json!({ "signals": [{ "local_ref": "L1", "content": { "test": "ok" } }] });
    send(&app, Method::POST, SIGNALS_URI, Some(&owner_token), Some(payload.clone())).await;

    // No grant: submit and search are both forbidden.
    let (status, body, _) = send(&app, Method::POST, SIGNALS_URI, Some(&member_token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["error_code"], "forbidden");

    let search_uri = "/api/isn/isn-a/signal_types/t/v1.0.0/signals/search";
    let (status, _, _) = send(&app, Method::GET, search_uri, Some(&member_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Grant read.
    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/isn/isn-a/permissions",
        Some(&owner_token),
        Some(json!({ "email": "member@x.org", "permission": "read" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let member_token = login_token(&app, "member@x.org", "passwordAAA").await;

    // Read now works and sees the owner's signal; write still forbidden.
    let (status, body, _) = send(&app, Method::GET, search_uri, Some(&member_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _, _) = send(&app, Method::POST, SIGNALS_URI, Some(&member_token), Some(payload)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_token_is_401_unknown_isn_is_404() {
    let (app, _) = build_app().await;
    let token = seed_isn(&app).await;

    let (status, body, _) = send(&app, Method::POST, SIGNALS_URI, None, Some(json!({ "signals": [] }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "invalid_token");

    let (status, body, _) = send(
        &app,
        Method::POST,
        "/api/isn/ghost/signal_types/t/v1.0.0/signals",
        Some(&token),
        Some(json!({ "signals": [{ "local_ref": "L", "content": {} }] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "resource_not_found");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service accounts & batches
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn service_account_batch_lifecycle() {
    let (app, state) = build_app().await;
    let owner_token = seed_isn(&app).await;

    // Onboard a service account and grant it write.
    let (status, body, _) = send(
        &app,
        Method::POST,
        "/api/service-accounts",
        Some(&owner_token),
        Some(json!({ "organization": "Acme Corp" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let client_id = body["client_id"].as_str().unwrap().to_string();
    let client_secret = body["client_secret"].as_str().unwrap().to_string();

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/isn/isn-a/permissions",
        Some(&owner_token),
        Some(json!({ "client_id": client_id, "permission": "write" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Client-credentials login.
    let (status, body, _) = send(
        &app,
        Method::POST,
        "/oauth/token?grant_type=client_credentials",
        None,
        Some(json!({ "client_id": client_id, "client_secret": client_secret })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let sa_token = body["access_token"].as_str().unwrap().to_string();

    // No batch yet: submission is a 412 precondition failure.
    let payload = json!({ "signals": [{ "local_ref": "L1", "content": { "test": "ok" } }] });
    let (status, body, _) = send(&app, Method::POST, SIGNALS_URI, Some(&sa_token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error_code"], "batch_required");

    // Open a batch; the same payload now stores.
    let (status, first_batch, _) = send(
        &app,
        Method::POST,
        "/api/isn/isn-a/batches",
        Some(&sa_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body, _) = send(&app, Method::POST, SIGNALS_URI, Some(&sa_token), Some(payload)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["stored_count"], 1);

    // A second batch atomically closes the first.
    let (status, second_batch, _) = send(
        &app,
        Method::POST,
        "/api/isn/isn-a/batches",
        Some(&sa_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(first_batch["batch_id"], second_batch["batch_id"]);

    let isn = state.store.get_isn_by_slug("isn-a").await.unwrap().unwrap();
    let sa_account = state
        .store
        .find_service_account_by_client_id(&client_id)
        .await
        .unwrap()
        .unwrap()
        .0;
    let latest = state
        .store
        .latest_batch(isn.id, sa_account.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id.to_string(), second_batch["batch_id"].as_str().unwrap());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn public_search_is_gated_by_the_startup_snapshot() {
    let store = Store::connect("sqlite::memory:", 1, 1, Duration::from_secs(3600))
        .await
        .unwrap();

    // Seed before the caches load: one public, one private ISN.
    let (owner, _) = store.create_user("o@x.org", "unused-hash").await.unwrap();
    let public_isn = store
        .create_isn("isn-p", "Public", None, IsnVisibility::Public, owner.id)
        .await
        .unwrap();
    store
        .create_signal_type(public_isn.id, "alert", "1.0.0", "Alert", SKIP_URL, "{}", None)
        .await
        .unwrap();
    let private_isn = store
        .create_isn("isn-a", "Private", None, IsnVisibility::Private, owner.id)
        .await
        .unwrap();
    store
        .create_signal_type(private_isn.id, "t", "1.0.0", "T", SKIP_URL, "{}", None)
        .await
        .unwrap();

    let (app, _) = build_app_with(store).await;

    // Public ISN: reachable unauthenticated.
    let (status, body, _) = send(
        &app,
        Method::GET,
        "/api/public/isn/isn-p/signal_types/alert/v1.0.0/signals/search",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Private ISN on the public route: not in the snapshot → 404.
    let (status, _, _) = send(
        &app,
        Method::GET,
        "/api/public/isn/isn-a/signal_types/t/v1.0.0/signals/search",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Middleware
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn oversized_declared_body_is_413_without_reaching_the_handler() {
    let (app, _) = build_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, (64 * 1024 + 1).to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error_code"], "request_too_large");
}

#[tokio::test]
async fn security_headers_are_always_set() {
    let (app, _) = build_app().await;
    let (_, _, headers) = send(&app, Method::GET, "/health/live", None, None).await;
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(
        headers.get("referrer-policy").unwrap(),
        "strict-origin-when-cross-origin"
    );
    assert!(headers.contains_key("content-security-policy"));
    // Test env is not hardened: no HSTS.
    assert!(!headers.contains_key("strict-transport-security"));
    // Request-id middleware tagged the response.
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn health_probes() {
    let (app, _) = build_app().await;
    let (status, body, _) = send(&app, Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body, _) = send(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn dev_reset_truncates_everything() {
    let (app, state) = build_app().await;
    let token = seed_isn(&app).await;

    let (status, _, _) = send(&app, Method::DELETE, "/api/dev/reset", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.store.list_isns().await.unwrap().is_empty());
}
