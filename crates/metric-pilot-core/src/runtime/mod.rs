// crates/metric-pilot-core/src/runtime/mod.rs
// ============================================================================
// Module: Metric Pilot Runtime
// Description: Operational modules over the core data model.
// Purpose: Group every control-plane operation behind the engine facade.
// Dependencies: crate::{core, interfaces}, runtime submodules
// ============================================================================

//! ## Overview
//! Runtime modules implement the control-plane operations as free functions
//! over [`crate::core::PlatformState`]; the [`engine::Engine`] facade wraps
//! them with locking, persistence, audit, and observability.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod analysis;
pub mod audit;
pub mod auth;
pub mod connector;
pub mod engine;
pub mod metrics;
pub mod model;
pub mod query;
pub mod reports;
pub mod scheduler;
pub mod settings;
pub mod skills;
pub mod sources;
pub mod tenants;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use analysis::CreateAnalysisRunRequest;
pub use analysis::ExecuteOptions;
pub use auth::AuthContext;
pub use auth::ROLES_ADMIN;
pub use auth::ROLES_AUTHOR;
pub use auth::Role;
pub use auth::require_role;
pub use auth::require_same_tenant;
pub use engine::CoreAdapters;
pub use engine::Engine;
pub use metrics::MetricPoint;
pub use metrics::MetricQuery;
pub use metrics::MetricSeries;
pub use metrics::MetricSummary;
pub use metrics::query_metric;
pub use query::LiveQueryRequest;
pub use query::MaterializeRequest;
pub use scheduler::CreateScheduleRequest;
pub use scheduler::TickOutcome;
pub use settings::ModelProfileRequest;
pub use settings::ReportTypeRequest;
pub use settings::SettingsSection;
pub use skills::SkillRunRequest;
pub use sources::ConnectionTestResult;
pub use sources::CreateConnectionRequest;
pub use sources::PatchConnectionRequest;
pub use tenants::CreateTenantRequest;
