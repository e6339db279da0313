// crates/metric-pilot-core/src/lib.rs
// ============================================================================
// Module: Metric Pilot Core Library
// Description: Public API surface for the Metric Pilot core.
// Purpose: Expose the data model, interfaces, and runtime operations.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Metric Pilot core is the orchestration and policy spine of a multi-tenant
//! analytics control plane: tenant-isolated state, policy-gated actions,
//! idempotent fact ingestion, provider-failover model runs, signed skill
//! packs, bounded-retry report delivery, and an exactly-once report
//! scheduler. It is transport-agnostic; adapters integrate through explicit
//! interfaces and the engine facade.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::MemorySnapshotStore;
pub use interfaces::NoopObservabilitySink;
pub use interfaces::ObservabilitySink;
pub use interfaces::ObservedMutation;
pub use interfaces::RunAdapters;
pub use interfaces::SnapshotStore;
pub use interfaces::StoreError;
pub use runtime::AuthContext;
pub use runtime::CoreAdapters;
pub use runtime::CreateAnalysisRunRequest;
pub use runtime::CreateConnectionRequest;
pub use runtime::CreateScheduleRequest;
pub use runtime::CreateTenantRequest;
pub use runtime::Engine;
pub use runtime::ExecuteOptions;
pub use runtime::LiveQueryRequest;
pub use runtime::MaterializeRequest;
pub use runtime::MetricQuery;
pub use runtime::MetricSeries;
pub use runtime::ModelProfileRequest;
pub use runtime::PatchConnectionRequest;
pub use runtime::ReportTypeRequest;
pub use runtime::Role;
pub use runtime::SettingsSection;
pub use runtime::SkillRunRequest;
pub use runtime::TickOutcome;
pub use runtime::require_role;
pub use runtime::require_same_tenant;
