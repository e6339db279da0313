// crates/metric-pilot-core/src/core/connection.rs
// ============================================================================
// Module: Metric Pilot Source Connections
// Description: Source connection aggregate, sync runs, and the source catalog.
// Purpose: Model connection lifecycle state and per-connection policies.
// Dependencies: crate::core::{error, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A source connection binds a tenant to an external data source type in one
//! of three modes: `ingest` (periodic sync into canonical facts), `live`
//! (policy-gated read-through queries), or `hybrid` (both). Credentials never
//! enter the state store; connections carry only a fingerprint reference. The
//! source catalog is a static table of supported types, their domains, and
//! their supported modes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::GuardrailCheck;
use crate::core::identifiers::ConnectionId;
use crate::core::identifiers::SourceRunId;
use crate::core::identifiers::TenantId;
use crate::core::time::IsoDate;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Source Catalog
// ============================================================================

/// Connection mode for a source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Periodic sync into canonical facts.
    Ingest,
    /// Policy-gated live queries only.
    Live,
    /// Both ingest and live.
    Hybrid,
}

impl ConnectionMode {
    /// Returns true when the mode permits ingest syncs.
    #[must_use]
    pub const fn supports_ingest(self) -> bool {
        matches!(self, Self::Ingest | Self::Hybrid)
    }

    /// Returns true when the mode permits live queries.
    #[must_use]
    pub const fn supports_live(self) -> bool {
        matches!(self, Self::Live | Self::Hybrid)
    }
}

/// Static descriptor for a supported source type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTypeSpec {
    /// Source type identifier (e.g. `google_ads`).
    pub source_type: String,
    /// Product family label.
    pub family: String,
    /// Domains the source can populate, in preference order.
    pub domains: Vec<String>,
    /// Modes the source supports.
    pub modes: Vec<ConnectionMode>,
}

/// Returns the static source catalog.
#[must_use]
pub fn source_catalog() -> Vec<SourceTypeSpec> {
    let entry = |source_type: &str, family: &str, domains: &[&str], modes: &[ConnectionMode]| {
        SourceTypeSpec {
            source_type: source_type.to_string(),
            family: family.to_string(),
            domains: domains.iter().map(ToString::to_string).collect(),
            modes: modes.to_vec(),
        }
    };
    vec![
        entry(
            "google_ads",
            "advertising",
            &["marketing"],
            &[ConnectionMode::Ingest, ConnectionMode::Hybrid],
        ),
        entry(
            "facebook_ads",
            "advertising",
            &["marketing"],
            &[ConnectionMode::Ingest, ConnectionMode::Hybrid],
        ),
        entry(
            "quickbooks",
            "accounting",
            &["finance"],
            &[ConnectionMode::Ingest, ConnectionMode::Hybrid],
        ),
        entry(
            "stripe",
            "payments",
            &["finance"],
            &[ConnectionMode::Ingest, ConnectionMode::Hybrid],
        ),
        entry(
            "hubspot",
            "crm",
            &["crm"],
            &[ConnectionMode::Ingest, ConnectionMode::Hybrid],
        ),
        entry(
            "bigquery",
            "warehouse",
            &["marketing", "finance", "crm"],
            &[ConnectionMode::Live, ConnectionMode::Hybrid],
        ),
        entry(
            "snowflake",
            "warehouse",
            &["marketing", "finance", "crm"],
            &[ConnectionMode::Live, ConnectionMode::Hybrid],
        ),
    ]
}

/// Looks up a source type in the static catalog.
#[must_use]
pub fn find_source_type(source_type: &str) -> Option<SourceTypeSpec> {
    source_catalog().into_iter().find(|spec| spec.source_type == source_type)
}

// ============================================================================
// SECTION: Connection Policies
// ============================================================================

/// Sync cadence and freshness policy for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Minutes between scheduled syncs.
    pub interval_minutes: i64,
    /// Days of history backfilled on sync.
    pub backfill_days: i64,
    /// Maximum age of the latest run before a re-sync is forced.
    pub freshness_sla_hours: i64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            interval_minutes: 360,
            backfill_days: 30,
            freshness_sla_hours: 24,
        }
    }
}

/// Quality gate policy applied to sync runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityPolicy {
    /// Minimum acceptable quality score.
    pub min_quality_score: f64,
    /// Whether a failing gate blocks downstream model runs.
    pub block_model_run: bool,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_quality_score: 0.6,
            block_model_run: false,
        }
    }
}

/// Table/column allowlist policy for live queries.
///
/// # Invariants
/// - An empty `allowed_tables` list denies every live query on the connection.
/// - Column lookups fall back to the `default` key when a table has no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPolicy {
    /// Tables the connection may serve.
    #[serde(default)]
    pub allowed_tables: Vec<String>,
    /// Allowed columns per table.
    #[serde(default)]
    pub allowed_columns_by_table: BTreeMap<String, Vec<String>>,
}

/// Descriptive metadata attached to a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    /// Display label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Owning user label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Quality checks applied after each sync.
    #[serde(default)]
    pub quality_checks: Vec<String>,
    /// Free-form extraction spec forwarded to the connector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_spec: Option<serde_json::Value>,
}

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// Stored descriptor for connection credentials.
///
/// # Invariants
/// - Plaintext credentials never reach the state store; only the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDescriptor {
    /// Whether any credentials were supplied.
    pub has_credentials: bool,
    /// SHA-256 fingerprint of the tenant-scoped credential payload.
    pub fingerprint: String,
}

// ============================================================================
// SECTION: Source Connection
// ============================================================================

/// Connection health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Connection is usable.
    Active,
    /// Last operation failed.
    Error,
}

/// Source connection aggregate.
///
/// # Invariants
/// - `mode` is one of the source type's supported modes.
/// - `auth_ref` references a [`SecretDescriptor`]; it is never a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConnection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Source type from the catalog.
    pub source_type: String,
    /// Connection mode.
    pub mode: ConnectionMode,
    /// Secret reference (fingerprint key, never the secret).
    pub auth_ref: String,
    /// Health status.
    pub status: ConnectionStatus,
    /// Sync cadence policy.
    pub sync_policy: SyncPolicy,
    /// Quality gate policy.
    pub quality_policy: QualityPolicy,
    /// Live query allowlist policy.
    pub query_policy: QueryPolicy,
    /// Descriptive metadata.
    pub metadata: ConnectionMetadata,
    /// Latest ingest checkpoint (cursor date), when any sync has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<IsoDate>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last mutation timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Source Runs
// ============================================================================

/// Sync run outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRunStatus {
    /// Sync completed.
    Success,
    /// Sync failed.
    Error,
}

/// Diagnostics captured for a sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRunDiagnostics {
    /// Records the connector generated.
    pub generated_records: usize,
    /// Records inserted after idempotency filtering.
    pub inserted_records: usize,
    /// Computed quality score.
    pub quality_score: f64,
    /// Retry count recorded by the connector.
    pub retries: u32,
    /// Whether the quality gate passed.
    pub quality_passed: bool,
    /// Individual quality check outcomes.
    pub quality_checks: Vec<GuardrailCheck>,
}

/// Options controlling a single sync invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSyncOptions {
    /// Domain to generate; defaults per catalog/blueprint preference.
    #[serde(default)]
    pub domain: Option<String>,
    /// Days of history to generate; defaults to the connection backfill.
    #[serde(default)]
    pub period_days: Option<i64>,
    /// Force the run to fail, for pipeline exercises.
    #[serde(default)]
    pub simulate_failure: bool,
    /// Force the schema drift check to fail.
    #[serde(default)]
    pub simulate_schema_drift: bool,
}

/// A single sync run of a source connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRun {
    /// Run identifier.
    pub id: SourceRunId,
    /// Connection that ran.
    pub connection_id: ConnectionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Outcome status.
    pub status: SourceRunStatus,
    /// Diagnostics for the run.
    pub diagnostics: SourceRunDiagnostics,
    /// Cursor: latest ingested date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<IsoDate>,
    /// Run timestamp.
    pub started_at: Timestamp,
}
