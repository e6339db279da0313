// crates/metric-pilot-core/src/core/audit.rs
// ============================================================================
// Module: Metric Pilot Audit Events
// Description: Append-only audit event records.
// Purpose: Capture every mutating invocation for tenant-scoped review.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Audit events are append-only and totally ordered by insertion within a
//! tenant. Queries are scoped by tenant plus an optional since-timestamp;
//! cross-tenant access fails closed at the auth layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AuditEventId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Audit Event
// ============================================================================

/// A single audit event.
///
/// # Invariants
/// - Events are append-only and ordered by insertion within a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub id: AuditEventId,
    /// Event timestamp.
    pub at: Timestamp,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Acting user (or `system`).
    pub actor_id: String,
    /// Stable action label (`source.sync`, `model.run`, ...).
    pub action: String,
    /// Structured event details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
