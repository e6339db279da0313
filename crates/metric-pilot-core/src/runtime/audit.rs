// crates/metric-pilot-core/src/runtime/audit.rs
// ============================================================================
// Module: Metric Pilot Audit Runtime
// Description: Audit event recording and tenant-scoped queries.
// Purpose: Keep the append-only mutation trail and serve since-queries.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Every mutating engine operation records an audit event. Queries are
//! tenant-scoped with an optional since-timestamp; the engine rejects
//! cross-tenant reads before this module is reached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::AuditEvent;
use crate::core::AuditEventId;
use crate::core::PlatformState;
use crate::core::TenantId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Recording
// ============================================================================

/// Appends an audit event for a tenant-scoped mutation.
pub fn record_audit_event(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    actor_id: &str,
    action: &str,
    details: Option<Value>,
    now: Timestamp,
) {
    state.audit_events.push(AuditEvent {
        id: AuditEventId::generate(),
        at: now,
        tenant_id: tenant_id.clone(),
        actor_id: actor_id.to_string(),
        action: action.to_string(),
        details,
    });
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Returns a tenant's audit events at or after `since`, in insertion order.
#[must_use]
pub fn query_audit_events(
    state: &PlatformState,
    tenant_id: &TenantId,
    since: Option<Timestamp>,
) -> Vec<AuditEvent> {
    state
        .audit_events
        .iter()
        .filter(|event| event.tenant_id == *tenant_id)
        .filter(|event| since.is_none_or(|since| event.at >= since))
        .cloned()
        .collect()
}
