// crates/metric-pilot-core/src/core/query.rs
// ============================================================================
// Module: Metric Pilot Live Query Records
// Description: Normalized live queries, cached results, and materializations.
// Purpose: Model the policy-gated read path over the canonical store.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! The live query broker never executes SQL: callers submit either a
//! normalized query or a `SELECT` statement that is reduced to one, and rows
//! are projected from canonical facts in table-specific shapes. Results are
//! cached for sixty seconds per normalized key, and a cached result can be
//! materialized back into canonical facts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ConnectionId;
use crate::core::identifiers::MaterializationId;
use crate::core::identifiers::QueryResultId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Normalized Queries
// ============================================================================

/// Maximum rows a live query may request.
pub const MAX_LIVE_QUERY_LIMIT: usize = 1_000;

/// Cache time-to-live for live query results, in seconds.
pub const LIVE_QUERY_CACHE_TTL_SECONDS: i64 = 60;

/// A live query normalized to its policy-checkable form.
///
/// # Invariants
/// - `limit` is within `[1, 1000]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    /// Target table.
    pub table: String,
    /// Requested columns; empty means all projected columns.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Row limit.
    pub limit: usize,
    /// String-equality filters over projected columns.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

/// Query execution metadata echoed with each result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Table served.
    pub table: String,
    /// Rows returned after limit truncation.
    pub row_count: usize,
    /// Rows matched before truncation.
    pub total_rows: usize,
    /// Whether this result came from the cache.
    pub cached: bool,
}

/// A live query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveQueryResult {
    /// Result identifier usable for materialization.
    pub result_id: QueryResultId,
    /// Projected rows.
    pub rows: Vec<BTreeMap<String, Value>>,
    /// Execution metadata.
    pub query_metadata: QueryMetadata,
}

/// Cached live query entry.
///
/// # Invariants
/// - Entries are tenant-scoped; eviction is lazy on read after `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveQueryCacheEntry {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Connection the query ran against.
    pub connection_id: ConnectionId,
    /// Cached result.
    pub result: LiveQueryResult,
    /// Expiry instant.
    pub expires_at: Timestamp,
}

// ============================================================================
// SECTION: Materialization
// ============================================================================

/// Column mapping for materializing rows into canonical facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationMapping {
    /// Domain assigned to materialized facts.
    pub domain: String,
    /// Column carrying the metric id, when per-row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_column: Option<String>,
    /// Fixed metric id, when uniform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_metric_id: Option<String>,
    /// Column carrying the value.
    pub value_column: String,
    /// Column carrying the date.
    pub date_column: String,
}

/// A completed materialization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationRun {
    /// Materialization identifier.
    pub id: MaterializationId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Result the rows came from.
    pub source_result_id: QueryResultId,
    /// Dataset label recorded in fact sources.
    pub dataset_name: String,
    /// Facts inserted after idempotency filtering.
    pub inserted_records: usize,
    /// Rows considered.
    pub total_rows: usize,
    /// Run timestamp.
    pub created_at: Timestamp,
}
