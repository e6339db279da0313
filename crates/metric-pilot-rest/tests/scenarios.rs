// crates/metric-pilot-rest/tests/scenarios.rs
// ============================================================================
// Module: REST Scenario Tests
// Description: End-to-end pipeline scenarios over a live HTTP server.
// Purpose: Validate the composed system through the public surface.
// ============================================================================
//! ## Overview
//! Each test boots an in-memory server on an ephemeral port and drives it
//! with a real HTTP client: audit isolation, idempotent syncs, low-history
//! model warnings, delivery retries, live query policy, and the analysis-run
//! quality gate.

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

// ============================================================================
// SECTION: Harness
// ============================================================================

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
async fn create_tenant(client: &Client, base: &str, body: Value) -> String {
    let response = client.post(format!("{base}/v1/tenants")).json(&body).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    body["tenant"]["id"].as_str().unwrap().to_string()
}

/// Builds an owner-role request builder factory for one tenant.
fn owner_headers(tenant_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("x-tenant-id", tenant_id.to_string()),
        ("x-user-id", "user-1".to_string()),
        ("x-user-role", "owner".to_string()),
    ]
}

/// Sends a request with the given tenant headers.
async fn send(
    client: &Client,
    method: reqwest::Method,
    url: String,
    headers: &[(&'static str, String)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = client.request(method, url);
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.unwrap();
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// Scenario 1: audit events are tenant-isolated; cross-tenant reads are 403.
#[tokio::test]
async fn audit_events_are_tenant_isolated() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant_a = create_tenant(&client, &base, json!({"name": "tenant-a"})).await;
    let tenant_b = create_tenant(&client, &base, json!({"name": "tenant-b"})).await;

    for tenant in [&tenant_a, &tenant_b] {
        let (status, _) = send(
            &client,
            reqwest::Method::POST,
            format!("{base}/v1/connectors/google_ads/sync"),
            &owner_headers(tenant),
            Some(json!({"period_days": 14})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Tenant A asking for tenant B's audit stream is forbidden.
    let (status, body) = send(
        &client,
        reqwest::Method::GET,
        format!("{base}/v1/audit/events?tenant_id={tenant_b}"),
        &owner_headers(&tenant_a),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["statusCode"], 403);

    // The same query against its own tenant succeeds and stays scoped.
    let (status, body) = send(
        &client,
        reqwest::Method::GET,
        format!("{base}/v1/audit/events?tenant_id={tenant_a}"),
        &owner_headers(&tenant_a),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert!(!events.is_empty());
    assert!(events.iter().all(|event| event["tenant_id"] == Value::from(tenant_a.clone())));
}

/// Scenario 2: repeating a sync over the same period inserts nothing.
#[tokio::test]
async fn repeated_connector_sync_is_idempotent() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(&client, &base, json!({"name": "acme"})).await;

    let (status, first) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/connectors/google_ads/sync"),
        &owner_headers(&tenant),
        Some(json!({"period_days": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(first["run"]["diagnostics"]["inserted_records"].as_u64().unwrap() > 0);

    let (status, second) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/connectors/google_ads/sync"),
        &owner_headers(&tenant),
        Some(json!({"period_days": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["run"]["diagnostics"]["inserted_records"].as_u64().unwrap(), 0);
}

/// Scenario 3: a short history warns, lowers confidence, and gates actions.
#[tokio::test]
async fn low_history_model_run_warns_and_gates_actions() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(
        &client,
        &base,
        json!({
            "name": "cautious",
            "autonomy_policy": {
                "confidence_threshold": 0.95,
                "action_allowlist": ["notify_owner", "create_report"],
            },
        }),
    )
    .await;

    let (status, _) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/connectors/google_ads/sync"),
        &owner_headers(&tenant),
        Some(json!({"period_days": 7, "domain": "marketing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/models/run"),
        &owner_headers(&tenant),
        Some(json!({
            "objective": "forecast",
            "output_metric_ids": ["revenue"],
            "horizon_days": 5,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run"]["status"], "completed_with_warnings");
    let warnings = body["insight"]["quality_warnings"].as_array().unwrap();
    assert!(warnings
        .iter()
        .any(|warning| warning == "insufficient_history_for_reliable_modeling"));
    let actions = body["insight"]["recommended_actions"].as_array().unwrap();
    assert!(!actions.is_empty());
    for action in actions {
        let decision = action["policy_decision"].as_str().unwrap();
        assert!(decision == "review" || decision == "deny", "unexpected {decision}");
    }

    let (status, pending) = send(
        &client,
        reqwest::Method::GET,
        format!("{base}/v1/agents/actions/pending"),
        &owner_headers(&tenant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!pending["actions"].as_array().unwrap().is_empty());
}

/// Scenario 4: delivery records per-channel status and retries recover
/// once the channel is wired.
#[tokio::test]
async fn report_delivery_retries_after_channel_wiring() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(&client, &base, json!({"name": "acme"})).await;
    let headers = owner_headers(&tenant);

    for provider in ["google_ads", "quickbooks"] {
        let (status, _) = send(
            &client,
            reqwest::Method::POST,
            format!("{base}/v1/connectors/{provider}/sync"),
            &headers,
            Some(json!({"period_days": 20})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/models/run"),
        &headers,
        Some(json!({"objective": "forecast", "output_metric_ids": ["revenue"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/reports/generate"),
        &headers,
        Some(json!({"channels": ["email", "slack", "telegram"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let events = body["deliveryEvents"].as_array().unwrap();
    assert_eq!(events.len(), 3);
    let telegram = events
        .iter()
        .find(|event| event["channel"] == "telegram")
        .unwrap();
    assert_eq!(telegram["status"], "failed");
    assert_eq!(telegram["last_error"], "telegram_disabled");
    let telegram_id = telegram["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &client,
        reqwest::Method::PATCH,
        format!("{base}/v1/settings/channels"),
        &headers,
        Some(json!({
            "telegram": {"enabled": true, "bot_token_ref": "secret_tg", "chat_id": "chat-9"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/channels/events/{telegram_id}/retry"),
        &headers,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["status"], "delivered");
    assert!(body["event"]["attempt_count"].as_u64().unwrap() >= 2);
}

/// Scenario 5: live queries honor the connection's table allowlist.
#[tokio::test]
async fn live_query_policy_gates_tables() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(&client, &base, json!({"name": "acme"})).await;
    let headers = owner_headers(&tenant);

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/sources/connections"),
        &headers,
        Some(json!({
            "source_type": "bigquery",
            "mode": "hybrid",
            "auth": {"service_account": "sa"},
            "query_policy": {"allowed_tables": ["metrics_daily"]},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let connection_id = body["connection"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/sources/connections/{connection_id}/sync"),
        &headers,
        Some(json!({"period_days": 10, "domain": "marketing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/query/live"),
        &headers,
        Some(json!({
            "connection_id": connection_id,
            "query": {"table": "finance_ledger", "limit": 50},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/query/live"),
        &headers,
        Some(json!({
            "connection_id": connection_id,
            "query": {"table": "metrics_daily", "limit": 50},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["result"]["result_id"].as_str().unwrap().is_empty());
    assert!(!body["result"]["rows"].as_array().unwrap().is_empty());
}

/// Scenario 6: a blocking quality gate fails the analysis run with 400.
#[tokio::test]
async fn quality_gate_blocks_analysis_execution() {
    let base = spawn_server().await;
    let client = Client::new();
    let tenant = create_tenant(&client, &base, json!({"name": "acme"})).await;
    let headers = owner_headers(&tenant);

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/sources/connections"),
        &headers,
        Some(json!({
            "source_type": "google_ads",
            "mode": "hybrid",
            "auth": {"token": "t"},
            "quality_policy": {"min_quality_score": 1.0, "block_model_run": true},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let connection_id = body["connection"]["id"].as_str().unwrap().to_string();

    let (_, profiles) = send(
        &client,
        reqwest::Method::GET,
        format!("{base}/v1/models/profiles"),
        &headers,
        None,
    )
    .await;
    let profile_id = profiles["profiles"][0]["id"].as_str().unwrap().to_string();
    let (_, types) = send(
        &client,
        reqwest::Method::GET,
        format!("{base}/v1/reports/types"),
        &headers,
        None,
    )
    .await;
    let report_type_id = types["reportTypes"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/analysis-runs"),
        &headers,
        Some(json!({
            "source_connection_id": connection_id,
            "model_profile_id": profile_id,
            "report_type_id": report_type_id,
            "channels": ["email"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = body["run"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &client,
        reqwest::Method::POST,
        format!("{base}/v1/analysis-runs/{run_id}/execute"),
        &headers,
        Some(json!({"force_sync": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("quality gate failed"));

    let (_, stored) = send(
        &client,
        reqwest::Method::GET,
        format!("{base}/v1/analysis-runs/{run_id}"),
        &headers,
        None,
    )
    .await;
    assert_eq!(stored["run"]["status"], "failed");
}
