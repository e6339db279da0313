// crates/metric-pilot-core/src/core/state.rs
// ============================================================================
// Module: Metric Pilot Platform State
// Description: Process-wide, tenant-partitioned state container.
// Purpose: Hold every entity sequence and map plus the idempotency sets.
// Dependencies: crate::core entity modules, serde
// ============================================================================

//! ## Overview
//! [`PlatformState`] is the single mutable container for the control plane.
//! Sequences are append-only; maps are keyed lookups. Two sets enforce core
//! invariants: the fact idempotency set (one fact per canonical tuple) and the
//! consumed-tick set (exactly-once scheduler fires). Mutations flow through
//! the runtime engine, which serializes them and persists a snapshot after
//! each one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::analysis::AnalysisRun;
use crate::core::audit::AuditEvent;
use crate::core::connection::SecretDescriptor;
use crate::core::connection::SourceConnection;
use crate::core::connection::SourceRun;
use crate::core::facts::CanonicalFact;
use crate::core::identifiers::AnalysisRunId;
use crate::core::identifiers::ConnectionId;
use crate::core::identifiers::TenantId;
use crate::core::model::ActionApproval;
use crate::core::model::Insight;
use crate::core::model::ModelRun;
use crate::core::model::ProviderHealth;
use crate::core::query::LiveQueryCacheEntry;
use crate::core::query::MaterializationRun;
use crate::core::report::ChannelEvent;
use crate::core::report::Report;
use crate::core::report::ReportSchedule;
use crate::core::settings::ModelProfile;
use crate::core::settings::ReportType;
use crate::core::settings::TenantSettings;
use crate::core::skill::InstalledSkill;
use crate::core::skill::SkillDraft;
use crate::core::skill::SkillRun;
use crate::core::tenant::Tenant;

// ============================================================================
// SECTION: Platform State
// ============================================================================

/// Process-wide, tenant-partitioned state container.
///
/// # Invariants
/// - Every entity in a sequence carries the tenant that owns it.
/// - `fact_keys` contains exactly the idempotency keys of `facts`.
/// - `consumed_ticks` grows monotonically; a consumed tick never fires again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformState {
    /// Tenants by id.
    pub tenants: BTreeMap<TenantId, Tenant>,
    /// Stored settings by tenant.
    pub settings: BTreeMap<TenantId, TenantSettings>,
    /// Canonical facts, append-only.
    pub facts: Vec<CanonicalFact>,
    /// Idempotency keys of `facts`.
    pub fact_keys: BTreeSet<String>,
    /// Source connections, append-only.
    pub connections: Vec<SourceConnection>,
    /// Source sync runs, append-only.
    pub source_runs: Vec<SourceRun>,
    /// Secret descriptors by auth reference.
    pub secrets: BTreeMap<String, SecretDescriptor>,
    /// Live query cache by normalized key.
    pub query_cache: BTreeMap<String, LiveQueryCacheEntry>,
    /// Materialization runs, append-only.
    pub materializations: Vec<MaterializationRun>,
    /// Model provider health keyed by `{tenant}|{provider}`.
    pub provider_health: BTreeMap<String, ProviderHealth>,
    /// Model runs, append-only.
    pub model_runs: Vec<ModelRun>,
    /// Insights, append-only.
    pub insights: Vec<Insight>,
    /// Action approvals, append-only.
    pub approvals: Vec<ActionApproval>,
    /// Installed skills, append-only.
    pub skills: Vec<InstalledSkill>,
    /// Skill drafts, append-only.
    pub skill_drafts: Vec<SkillDraft>,
    /// Skill runs, append-only.
    pub skill_runs: Vec<SkillRun>,
    /// Reports, append-only.
    pub reports: Vec<Report>,
    /// Report schedules, append-only.
    pub report_schedules: Vec<ReportSchedule>,
    /// Channel delivery events, append-only.
    pub channel_events: Vec<ChannelEvent>,
    /// Analysis runs, append-only.
    pub analysis_runs: Vec<AnalysisRun>,
    /// Model profiles, append-only.
    pub model_profiles: Vec<ModelProfile>,
    /// Report types, append-only.
    pub report_types: Vec<ReportType>,
    /// Audit events, append-only.
    pub audit_events: Vec<AuditEvent>,
    /// Consumed scheduler tick keys (`{schedule}|{next_run_at}`).
    pub consumed_ticks: BTreeSet<String>,
}

impl PlatformState {
    /// Returns the tenant with the given id, when it exists.
    #[must_use]
    pub fn tenant(&self, tenant_id: &TenantId) -> Option<&Tenant> {
        self.tenants.get(tenant_id)
    }

    /// Returns a mutable reference to the tenant with the given id.
    pub fn tenant_mut(&mut self, tenant_id: &TenantId) -> Option<&mut Tenant> {
        self.tenants.get_mut(tenant_id)
    }

    /// Inserts a canonical fact, honoring the idempotency tuple.
    ///
    /// Returns true when the fact was inserted and false on a duplicate
    /// tuple, which is a no-op.
    pub fn insert_fact(&mut self, fact: CanonicalFact) -> bool {
        let key = fact.idempotency_key();
        if self.fact_keys.contains(&key) {
            return false;
        }
        self.fact_keys.insert(key);
        self.facts.push(fact);
        true
    }

    /// Returns the connection with the given id within a tenant.
    #[must_use]
    pub fn connection(
        &self,
        tenant_id: &TenantId,
        connection_id: &ConnectionId,
    ) -> Option<&SourceConnection> {
        self.connections
            .iter()
            .find(|conn| conn.id == *connection_id && conn.tenant_id == *tenant_id)
    }

    /// Returns a mutable reference to a connection within a tenant.
    pub fn connection_mut(
        &mut self,
        tenant_id: &TenantId,
        connection_id: &ConnectionId,
    ) -> Option<&mut SourceConnection> {
        self.connections
            .iter_mut()
            .find(|conn| conn.id == *connection_id && conn.tenant_id == *tenant_id)
    }

    /// Returns the most recent source run for a connection.
    #[must_use]
    pub fn latest_source_run(&self, connection_id: &ConnectionId) -> Option<&SourceRun> {
        self.source_runs.iter().rev().find(|run| run.connection_id == *connection_id)
    }

    /// Returns the provider health key for a (tenant, provider) pair.
    #[must_use]
    pub fn provider_health_key(tenant_id: &TenantId, provider: &str) -> String {
        format!("{tenant_id}|{provider}")
    }

    /// Returns a mutable provider health entry, creating it when absent.
    pub fn provider_health_mut(
        &mut self,
        tenant_id: &TenantId,
        provider: &str,
    ) -> &mut ProviderHealth {
        self.provider_health
            .entry(Self::provider_health_key(tenant_id, provider))
            .or_default()
    }

    /// Returns an analysis run within a tenant.
    #[must_use]
    pub fn analysis_run(
        &self,
        tenant_id: &TenantId,
        run_id: &AnalysisRunId,
    ) -> Option<&AnalysisRun> {
        self.analysis_runs
            .iter()
            .find(|run| run.id == *run_id && run.tenant_id == *tenant_id)
    }

    /// Returns a mutable analysis run within a tenant.
    pub fn analysis_run_mut(
        &mut self,
        tenant_id: &TenantId,
        run_id: &AnalysisRunId,
    ) -> Option<&mut AnalysisRun> {
        self.analysis_runs
            .iter_mut()
            .find(|run| run.id == *run_id && run.tenant_id == *tenant_id)
    }
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable projection of the full platform state.
///
/// # Invariants
/// - Round-tripping a snapshot yields an observationally equal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Snapshot format version.
    pub version: u32,
    /// The captured state.
    pub state: PlatformState,
}

impl StateSnapshot {
    /// Captures a snapshot of the given state.
    #[must_use]
    pub fn capture(state: &PlatformState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            state: state.clone(),
        }
    }
}
