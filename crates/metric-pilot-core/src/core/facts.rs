// crates/metric-pilot-core/src/core/facts.rs
// ============================================================================
// Module: Metric Pilot Canonical Facts
// Description: Normalized, tenant-scoped measurement records with lineage.
// Purpose: Provide the idempotent fact model all aggregation reads from.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A canonical fact is the normalized measurement record every pipeline stage
//! writes into and every metric query reads from. Idempotency is keyed on the
//! tuple `(tenant, date, domain, metric, source)`: re-ingesting the same tuple
//! is a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FactId;
use crate::core::identifiers::TenantId;
use crate::core::time::IsoDate;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Lineage
// ============================================================================

/// Provenance attached to every canonical fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactLineage {
    /// Upstream provider or generator label.
    pub provider: String,
    /// Connector run that produced the fact, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_run_id: Option<String>,
    /// Extraction timestamp.
    pub extracted_at: Timestamp,
}

// ============================================================================
// SECTION: Canonical Fact
// ============================================================================

/// Normalized, tenant-scoped measurement record.
///
/// # Invariants
/// - The tuple `(tenant_id, date, domain, metric_id, source)` is unique in
///   the state store; duplicate inserts are no-ops.
/// - `value` is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFact {
    /// Fact identifier.
    pub id: FactId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Business domain.
    pub domain: String,
    /// Metric identifier.
    pub metric_id: String,
    /// Calendar date of the measurement.
    pub date: IsoDate,
    /// Measured value.
    pub value: f64,
    /// Source tag (connector type or `materialized:{dataset}`).
    pub source: String,
    /// Provenance metadata.
    pub lineage: FactLineage,
}

impl CanonicalFact {
    /// Returns the idempotency key for this fact.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        fact_key(&self.tenant_id, &self.date, &self.domain, &self.metric_id, &self.source)
    }
}

/// Builds the idempotency key for a fact tuple.
#[must_use]
pub fn fact_key(
    tenant_id: &TenantId,
    date: &IsoDate,
    domain: &str,
    metric_id: &str,
    source: &str,
) -> String {
    format!("{tenant_id}|{date}|{domain}|{metric_id}|{source}")
}
