// crates/metric-pilot-rest/tests/transport.rs
// ============================================================================
// Module: REST Transport Tests
// Description: Tests for auth headers, role checks, and body handling.
// Purpose: Validate the transport plumbing around the core error taxonomy.
// ============================================================================
//! ## Overview
//! Covers the tenant-header requirement, role enforcement on mutating
//! routes, malformed JSON handling, and the one-mebibyte body cap.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use metric_pilot_core::Engine;
use metric_pilot_rest::build_router;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;

/// Boots an in-memory server and returns its base URL.
async fn spawn_server() -> String {
    let engine = Engine::in_memory().unwrap();
    let router = build_router(engine);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Creates a tenant and returns its id.
async fn create_tenant(client: &Client, base: &str) -> String {
    let response = client
        .post(format!("{base}/v1/tenants"))
        .json(&json!({"name": "acme"}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    body["tenant"]["id"].as_str().unwrap().to_string()
}

/// Verifies tenant-scoped routes demand the tenant header.
#[tokio::test]
async fn missing_tenant_header_is_bad_request() {
    let base = spawn_server().await;
    let client = Client::new();
    let response =
        client.get(format!("{base}/v1/settings")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("x-tenant-id"));
}

/// Verifies viewer roles cannot hit admin-only routes.
#[tokio::test]
async fn viewer_role_is_forbidden_on_admin_routes() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(&client, &base).await;

    let response = client
        .post(format!("{base}/v1/sources/connections"))
        .header("x-tenant-id", &tenant)
        .header("x-user-role", "viewer")
        .json(&json!({"source_type": "google_ads"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unknown roles fail closed to viewer.
    let response = client
        .post(format!("{base}/v1/sources/connections"))
        .header("x-tenant-id", &tenant)
        .header("x-user-role", "superuser")
        .json(&json!({"source_type": "google_ads"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Read routes stay open to viewers.
    let response = client
        .get(format!("{base}/v1/sources/connections"))
        .header("x-tenant-id", &tenant)
        .header("x-user-role", "viewer")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Verifies malformed JSON is a bad request with the wire error shape.
#[tokio::test]
async fn malformed_json_is_bad_request() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(&client, &base).await;

    let response = client
        .post(format!("{base}/v1/reports/generate"))
        .header("x-tenant-id", &tenant)
        .header("x-user-role", "owner")
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["statusCode"], 400);
}

/// Verifies bodies beyond one mebibyte are rejected as payload-too-large.
#[tokio::test]
async fn oversized_body_is_rejected() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(&client, &base).await;

    let padding = "x".repeat(1_200_000);
    let response = client
        .post(format!("{base}/v1/reports/generate"))
        .header("x-tenant-id", &tenant)
        .header("x-user-role", "owner")
        .header("content-type", "application/json")
        .body(format!("{{\"title\": \"{padding}\"}}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

/// Verifies the static surfaces respond without tenant scoping.
#[tokio::test]
async fn static_surfaces_are_open() {
    let base = spawn_server().await;
    let client = Client::new();
    for path in ["/v1/feature-flags", "/v1/blueprints", "/v1/sources/catalog", "/v1/skills/catalog"]
    {
        let response = client.get(format!("{base}{path}")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "path {path}");
    }
}
