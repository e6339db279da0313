// crates/metric-pilot-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Shared fixtures for core integration tests.
// Purpose: Build tenants, contexts, and synced connections deterministically.
// Dependencies: metric-pilot-core
// ============================================================================
//! ## Overview
//! Fixture builders shared by the core integration suites. All helpers use a
//! fixed base timestamp so assertions stay deterministic.

#![allow(
    dead_code,
    reason = "each integration test binary uses a subset of the helpers"
)]

use metric_pilot_core::AuthContext;
use metric_pilot_core::CreateConnectionRequest;
use metric_pilot_core::CreateTenantRequest;
use metric_pilot_core::Engine;
use metric_pilot_core::Role;
use metric_pilot_core::SourceConnection;
use metric_pilot_core::SourceRun;
use metric_pilot_core::SourceSyncOptions;
use metric_pilot_core::Tenant;
use metric_pilot_core::Timestamp;
use serde_json::json;

/// Fixed base instant: 2025-07-31T00:00:00Z.
pub const BASE_MILLIS: i64 = 1_753_920_000_000;

/// Returns the fixed base timestamp used across suites.
pub fn base_now() -> Timestamp {
    Timestamp::from_unix_millis(BASE_MILLIS)
}

/// Boots an in-memory engine.
pub fn engine() -> Engine {
    Engine::in_memory().unwrap()
}

/// Creates a tenant with default policies.
pub fn create_tenant(engine: &Engine, name: &str) -> Tenant {
    engine
        .create_tenant(
            CreateTenantRequest {
                name: name.to_string(),
                ..CreateTenantRequest::default()
            },
            base_now(),
        )
        .unwrap()
}

/// Builds an owner-role auth context for a tenant.
pub fn owner_ctx(tenant: &Tenant) -> AuthContext {
    AuthContext {
        tenant_id: tenant.id.clone(),
        user_id: "user-1".to_string(),
        role: Role::Owner,
        channel: "api".to_string(),
    }
}

/// Creates a connection with credentials for the given source type.
pub fn create_connection(
    engine: &Engine,
    ctx: &AuthContext,
    source_type: &str,
) -> SourceConnection {
    engine
        .create_connection(
            ctx,
            CreateConnectionRequest {
                source_type: source_type.to_string(),
                auth: Some(json!({"token": "t-123"})),
                ..CreateConnectionRequest::default()
            },
            base_now(),
        )
        .unwrap()
}

/// Creates a connection and syncs it over the given period.
pub fn synced_connection(
    engine: &Engine,
    ctx: &AuthContext,
    source_type: &str,
    period_days: i64,
) -> (SourceConnection, SourceRun) {
    let connection = create_connection(engine, ctx, source_type);
    let run = engine
        .sync_connection(
            ctx,
            &connection.id,
            SourceSyncOptions {
                period_days: Some(period_days),
                ..SourceSyncOptions::default()
            },
            base_now(),
        )
        .unwrap();
    (connection, run)
}
