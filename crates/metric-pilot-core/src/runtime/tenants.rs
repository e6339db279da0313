// crates/metric-pilot-core/src/runtime/tenants.rs
// ============================================================================
// Module: Metric Pilot Tenant Lifecycle
// Description: Tenant creation and listing.
// Purpose: Provision the top-level isolation unit with policy defaults.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Tenant creation validates the blueprint, applies policy defaults, and
//! merges any policy overrides the caller supplies. Tenants are never
//! destroyed; all later mutation flows through settings patches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::AutonomyPolicy;
use crate::core::CoreError;
use crate::core::DEFAULT_BLUEPRINT_ID;
use crate::core::DataPolicy;
use crate::core::ModelConfig;
use crate::core::PlatformState;
use crate::core::Tenant;
use crate::core::TenantBranding;
use crate::core::TenantId;
use crate::core::TenantStatus;
use crate::core::Timestamp;
use crate::core::find_blueprint;
use crate::runtime::settings::deep_merge;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request to create a tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    /// Display name.
    pub name: String,
    /// Blueprint id; defaults to the standard blueprint.
    #[serde(default)]
    pub blueprint_id: Option<String>,
    /// Branding metadata.
    #[serde(default)]
    pub branding: Option<TenantBranding>,
    /// Training opt-in.
    #[serde(default)]
    pub training_opt_in: bool,
    /// Model configuration overrides merged over defaults.
    #[serde(default)]
    pub model_config: Option<Value>,
    /// Autonomy policy overrides merged over defaults.
    #[serde(default)]
    pub autonomy_policy: Option<Value>,
    /// Data policy overrides merged over defaults.
    #[serde(default)]
    pub data_policy: Option<Value>,
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Creates a tenant with defaults merged under caller overrides.
///
/// # Errors
///
/// Returns `BadRequest` on empty names, unknown blueprints, or overrides
/// that no longer deserialize.
pub fn create_tenant(
    state: &mut PlatformState,
    request: CreateTenantRequest,
    now: Timestamp,
) -> Result<Tenant, CoreError> {
    if request.name.is_empty() {
        return Err(CoreError::bad_request("tenant name is required"));
    }
    let blueprint_id =
        request.blueprint_id.unwrap_or_else(|| DEFAULT_BLUEPRINT_ID.to_string());
    if find_blueprint(&blueprint_id).is_none() {
        return Err(CoreError::bad_request(format!("unknown blueprint: {blueprint_id}")));
    }
    let tenant = Tenant {
        id: TenantId::generate(),
        name: request.name,
        status: TenantStatus::Active,
        blueprint_id,
        branding: request.branding.unwrap_or_default(),
        training_opt_in: request.training_opt_in,
        model_config: merge_defaults(&ModelConfig::default(), request.model_config.as_ref())?,
        autonomy_policy: merge_defaults(
            &AutonomyPolicy::default(),
            request.autonomy_policy.as_ref(),
        )?,
        data_policy: merge_defaults(&DataPolicy::default(), request.data_policy.as_ref())?,
        created_at: now,
        updated_at: now,
    };
    state.tenants.insert(tenant.id.clone(), tenant.clone());
    Ok(tenant)
}

/// Merges optional overrides over a default-valued config block.
fn merge_defaults<T>(defaults: &T, overrides: Option<&Value>) -> Result<T, CoreError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let Some(overrides) = overrides else {
        return serde_json::from_value(
            serde_json::to_value(defaults)
                .map_err(|err| CoreError::internal(format!("defaults serialization: {err}")))?,
        )
        .map_err(|err| CoreError::internal(format!("defaults round-trip: {err}")));
    };
    let mut value = serde_json::to_value(defaults)
        .map_err(|err| CoreError::internal(format!("defaults serialization: {err}")))?;
    deep_merge(&mut value, overrides);
    serde_json::from_value(value)
        .map_err(|err| CoreError::bad_request(format!("invalid tenant config: {err}")))
}

/// Lists all tenants.
#[must_use]
pub fn list_tenants(state: &PlatformState) -> Vec<Tenant> {
    state.tenants.values().cloned().collect()
}
