// crates/metric-pilot-rest/src/seed.rs
// ============================================================================
// Module: Demo Seeding
// Description: Optional demo tenant provisioning on an empty boot.
// Purpose: Give fresh deployments something to explore immediately.
// Dependencies: metric-pilot-core, crate::api
// ============================================================================

//! ## Overview
//! When seeding is enabled and the snapshot was empty, boot provisions one
//! demo tenant with two ingest connections and a two-week backfill. Seeding
//! is idempotent across restarts because it only runs when no tenant exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use metric_pilot_core::AuthContext;
use metric_pilot_core::CoreError;
use metric_pilot_core::CreateConnectionRequest;
use metric_pilot_core::CreateTenantRequest;
use metric_pilot_core::Engine;
use metric_pilot_core::SourceSyncOptions;
use serde_json::json;

use crate::api::now;

// ============================================================================
// SECTION: Seeding
// ============================================================================

/// Seeds the demo tenant when the engine booted empty.
///
/// # Errors
///
/// Propagates engine failures; a partially seeded tenant is left as-is.
pub fn seed_demo_tenant(engine: &Engine) -> Result<(), CoreError> {
    if !engine.list_tenants()?.is_empty() {
        return Ok(());
    }
    let tenant = engine.create_tenant(
        CreateTenantRequest {
            name: "Demo Workspace".to_string(),
            ..CreateTenantRequest::default()
        },
        now(),
    )?;
    let ctx = AuthContext::system(tenant.id);
    for source_type in ["google_ads", "quickbooks"] {
        let connection = engine.create_connection(
            &ctx,
            CreateConnectionRequest {
                source_type: source_type.to_string(),
                auth: Some(json!({"token": "demo"})),
                ..CreateConnectionRequest::default()
            },
            now(),
        )?;
        engine.sync_connection(
            &ctx,
            &connection.id,
            SourceSyncOptions {
                period_days: Some(14),
                ..SourceSyncOptions::default()
            },
            now(),
        )?;
    }
    Ok(())
}
