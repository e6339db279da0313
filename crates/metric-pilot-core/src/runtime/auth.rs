// crates/metric-pilot-core/src/runtime/auth.rs
// ============================================================================
// Module: Metric Pilot Auth Context
// Description: Auth context resolution and role-based access checks.
// Purpose: Provide strict, fail-closed tenant scoping for every operation.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! The core consumes an already-resolved identity: transports hand over a
//! header map and this module produces `{tenant, user, role, channel}`.
//! Tenant-scoped routes fail with `MissingTenant` when the tenant header is
//! absent, role checks fail closed on unknown roles, and cross-tenant access
//! is rejected by direct comparison.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::CoreError;
use crate::core::TenantId;

// ============================================================================
// SECTION: Headers
// ============================================================================

/// Header carrying the tenant identifier.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header carrying the user identifier.
pub const USER_HEADER: &str = "x-user-id";

/// Header carrying the user role.
pub const ROLE_HEADER: &str = "x-user-role";

/// Header carrying the originating channel.
pub const CHANNEL_HEADER: &str = "x-channel-id";

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Flat role set; each route declares its allowed roles explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Tenant owner.
    Owner,
    /// Administrator.
    Admin,
    /// Operator running pipelines.
    Operator,
    /// Analyst authoring profiles and reports.
    Analyst,
    /// Read-only viewer.
    Viewer,
}

impl Role {
    /// Parses a role label, failing closed to viewer on unknown input.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "owner" => Self::Owner,
            "admin" => Self::Admin,
            "operator" => Self::Operator,
            "analyst" => Self::Analyst,
            _ => Self::Viewer,
        }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Analyst => "analyst",
            Self::Viewer => "viewer",
        }
    }
}

/// Roles allowed to mutate tenant configuration.
pub const ROLES_ADMIN: &[Role] = &[Role::Owner, Role::Admin, Role::Operator];

/// Roles allowed to author profiles, reports, and runs.
pub const ROLES_AUTHOR: &[Role] = &[Role::Owner, Role::Admin, Role::Operator, Role::Analyst];

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Resolved caller identity for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Tenant the caller operates in.
    pub tenant_id: TenantId,
    /// User identifier, defaulting to `system`.
    pub user_id: String,
    /// Caller role.
    pub role: Role,
    /// Originating channel label.
    pub channel: String,
}

impl AuthContext {
    /// Resolves a tenant-scoped auth context from a header map.
    ///
    /// # Errors
    ///
    /// Returns a `BadRequest` [`CoreError`] when the tenant header is absent.
    pub fn resolve(headers: &BTreeMap<String, String>) -> Result<Self, CoreError> {
        let tenant = headers
            .get(TENANT_HEADER)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CoreError::bad_request("missing tenant: x-tenant-id is required"))?;
        Ok(Self {
            tenant_id: TenantId::new(tenant),
            user_id: headers
                .get(USER_HEADER)
                .filter(|value| !value.is_empty())
                .cloned()
                .unwrap_or_else(|| "system".to_string()),
            role: headers.get(ROLE_HEADER).map_or(Role::Viewer, |value| Role::parse(value)),
            channel: headers
                .get(CHANNEL_HEADER)
                .cloned()
                .unwrap_or_else(|| "api".to_string()),
        })
    }

    /// Builds a system context for scheduler and boot paths.
    #[must_use]
    pub fn system(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: "system".to_string(),
            role: Role::Owner,
            channel: "scheduler".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Requires the caller's role to be in the allowed set.
///
/// # Errors
///
/// Returns a `Forbidden` [`CoreError`] when the role is not allowed.
pub fn require_role(ctx: &AuthContext, allowed: &[Role]) -> Result<(), CoreError> {
    if allowed.contains(&ctx.role) {
        return Ok(());
    }
    Err(CoreError::forbidden(format!("role {} is not permitted", ctx.role.as_str())))
}

/// Requires a path or query tenant to match the caller's tenant.
///
/// # Errors
///
/// Returns a `Forbidden` [`CoreError`] on mismatch.
pub fn require_same_tenant(ctx: &AuthContext, tenant_id: &TenantId) -> Result<(), CoreError> {
    if ctx.tenant_id == *tenant_id {
        return Ok(());
    }
    Err(CoreError::forbidden("cross-tenant access is not permitted"))
}
