// crates/metric-pilot-core/src/runtime/engine.rs
// ============================================================================
// Module: Metric Pilot Control Plane Engine
// Description: Locked mutation path, persistence, audit, and adapters.
// Purpose: Expose every core operation behind one canonical execution path.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The engine is the single canonical execution path for the control plane.
//! All API surfaces (REST, schedulers, tests) must call these methods to
//! preserve the invariants: one write lock held across mutation plus
//! persistence save, an audit event per mutating invocation, and a process
//! sink record for observability. Read operations take the same lock briefly
//! and copy out.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Value;
use serde_json::json;

use crate::core::ActionApproval;
use crate::core::ActionExecutionState;
use crate::core::AnalysisRun;
use crate::core::AnalysisRunId;
use crate::core::ApprovalDecision;
use crate::core::ApprovalId;
use crate::core::AuditEvent;
use crate::core::Blueprint;
use crate::core::Channel;
use crate::core::ChannelEvent;
use crate::core::ChannelEventId;
use crate::core::ChannelSettings;
use crate::core::ConnectionId;
use crate::core::CoreError;
use crate::core::GuardrailCheck;
use crate::core::Insight;
use crate::core::InsightId;
use crate::core::InstalledSkill;
use crate::core::MaterializationRun;
use crate::core::ModelProfile;
use crate::core::ModelProfileId;
use crate::core::ModelTaskOutcome;
use crate::core::ModelTaskRequest;
use crate::core::PlatformState;
use crate::core::RecommendedAction;
use crate::core::Report;
use crate::core::ReportId;
use crate::core::ReportOutcome;
use crate::core::ReportRequest;
use crate::core::ReportSchedule;
use crate::core::ReportType;
use crate::core::ReportTypeId;
use crate::core::SkillDraft;
use crate::core::SkillDraftId;
use crate::core::SkillManifest;
use crate::core::SkillPrecedence;
use crate::core::SkillRun;
use crate::core::SourceConnection;
use crate::core::SourceRun;
use crate::core::SourceSyncOptions;
use crate::core::SourceTypeSpec;
use crate::core::StateSnapshot;
use crate::core::Tenant;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::blueprint_catalog;
use crate::core::bundled_skill_catalog;
use crate::core::source_catalog;
use crate::interfaces::NoopObservabilitySink;
use crate::interfaces::ObservabilitySink;
use crate::interfaces::ObservedMutation;
use crate::interfaces::RunAdapters;
use crate::interfaces::SnapshotStore;
use crate::runtime::analysis;
use crate::runtime::analysis::CreateAnalysisRunRequest;
use crate::runtime::analysis::ExecuteOptions;
use crate::runtime::audit::query_audit_events;
use crate::runtime::audit::record_audit_event;
use crate::runtime::auth::AuthContext;
use crate::runtime::metrics::MetricQuery;
use crate::runtime::metrics::MetricSeries;
use crate::runtime::metrics::query_metric;
use crate::runtime::model::run_model_task;
use crate::runtime::query::LiveQueryRequest;
use crate::runtime::query::MaterializeRequest;
use crate::runtime::query::materialize_query_result;
use crate::runtime::query::run_live_query;
use crate::runtime::reports;
use crate::runtime::reports::render_template;
use crate::runtime::reports::retry_channel_event;
use crate::runtime::scheduler::CreateScheduleRequest;
use crate::runtime::scheduler::TickOutcome;
use crate::runtime::scheduler::create_schedule;
use crate::runtime::scheduler::run_scheduler_tick;
use crate::runtime::settings;
use crate::runtime::settings::ModelProfileRequest;
use crate::runtime::settings::ReportTypeRequest;
use crate::runtime::settings::SettingsSection;
use crate::runtime::skills;
use crate::runtime::skills::SkillRunRequest;
use crate::runtime::sources;
use crate::runtime::sources::ConnectionTestResult;
use crate::runtime::sources::CreateConnectionRequest;
use crate::runtime::sources::PatchConnectionRequest;
use crate::runtime::tenants::CreateTenantRequest;
use crate::runtime::tenants::create_tenant;
use crate::runtime::tenants::list_tenants;

// ============================================================================
// SECTION: Core Adapters
// ============================================================================

/// Adapter surface backed by the real runtime operations.
///
/// The skill runtime, analysis orchestrator, and scheduler call through this
/// so tests can substitute fakes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreAdapters;

impl RunAdapters for CoreAdapters {
    fn run_model(
        &self,
        state: &mut PlatformState,
        tenant_id: &TenantId,
        request: ModelTaskRequest,
        now: Timestamp,
    ) -> Result<ModelTaskOutcome, CoreError> {
        run_model_task(state, tenant_id, request, now)
    }

    fn sync_source(
        &self,
        state: &mut PlatformState,
        tenant_id: &TenantId,
        connection_id: &ConnectionId,
        options: SourceSyncOptions,
        now: Timestamp,
    ) -> Result<SourceRun, CoreError> {
        sources::run_source_sync(state, tenant_id, connection_id, options, now)
    }

    fn generate_report(
        &self,
        state: &mut PlatformState,
        tenant_id: &TenantId,
        request: ReportRequest,
        now: Timestamp,
    ) -> Result<ReportOutcome, CoreError> {
        reports::generate_report(state, tenant_id, request, now)
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Control plane engine owning the state, persistence, and observability.
pub struct Engine {
    /// Platform state behind the single write lock.
    state: Mutex<PlatformState>,
    /// Snapshot persistence port.
    store: Arc<dyn SnapshotStore>,
    /// Process observability sink.
    sink: Arc<dyn ObservabilitySink>,
}

impl Engine {
    /// Builds an engine over a snapshot store, hydrating any saved snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the store cannot initialize or load.
    pub fn boot(
        store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<Self, CoreError> {
        store.init().map_err(|err| CoreError::internal(err.to_string()))?;
        let state = store
            .load()
            .map_err(|err| CoreError::internal(err.to_string()))?
            .map(|snapshot| snapshot.state)
            .unwrap_or_default();
        Ok(Self {
            state: Mutex::new(state),
            store,
            sink,
        })
    }

    /// Builds an in-memory engine for tests.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when boot fails (it cannot for the memory store).
    pub fn in_memory() -> Result<Self, CoreError> {
        Self::boot(
            Arc::new(crate::interfaces::MemorySnapshotStore::new()),
            Arc::new(NoopObservabilitySink),
        )
    }

    /// Locks the state for an operation.
    fn lock(&self) -> Result<MutexGuard<'_, PlatformState>, CoreError> {
        self.state.lock().map_err(|_| CoreError::internal("state lock poisoned"))
    }

    /// Runs a mutating operation: lock, mutate, audit, persist, observe.
    ///
    /// The snapshot save happens under the same lock as the mutation so an
    /// in-flight mutation is atomic from the caller's perspective. Failed
    /// operations persist too, since orchestrators record failure state before
    /// propagating.
    fn mutate<T>(
        &self,
        tenant_id: Option<&TenantId>,
        actor_id: &str,
        action: &str,
        now: Timestamp,
        details: Option<Value>,
        op: impl FnOnce(&mut PlatformState) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut state = self.lock()?;
        let result = op(&mut state);
        if result.is_ok()
            && let Some(tenant_id) = tenant_id
        {
            record_audit_event(&mut state, tenant_id, actor_id, action, details, now);
        }
        self.store
            .save(&StateSnapshot::capture(&state))
            .map_err(|err| CoreError::internal(err.to_string()))?;
        drop(state);
        self.sink.record(&ObservedMutation {
            action: action.to_string(),
            tenant_id: tenant_id.cloned(),
            actor_id: actor_id.to_string(),
            at: now,
            outcome: match &result {
                Ok(_) => "ok".to_string(),
                Err(error) => format!("error:{}", error.kind.http_status()),
            },
        });
        result
    }

    /// Runs a read-only operation under a brief lock.
    fn read<T>(
        &self,
        op: impl FnOnce(&PlatformState) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let state = self.lock()?;
        op(&state)
    }

    // ------------------------------------------------------------------
    // Static surfaces
    // ------------------------------------------------------------------

    /// Returns the feature flag map exposed to consoles.
    #[must_use]
    pub fn feature_flags() -> Value {
        json!({
            "autopilot": true,
            "live_query": true,
            "skills": true,
            "report_schedules": true,
            "materialization": true,
        })
    }

    /// Returns the static blueprint catalog.
    #[must_use]
    pub fn blueprints() -> Vec<Blueprint> {
        blueprint_catalog()
    }

    /// Returns the static source catalog.
    #[must_use]
    pub fn sources_catalog() -> Vec<SourceTypeSpec> {
        source_catalog()
    }

    /// Returns the bundled skill catalog.
    #[must_use]
    pub fn skills_catalog() -> Vec<SkillManifest> {
        bundled_skill_catalog()
    }

    // ------------------------------------------------------------------
    // Tenants
    // ------------------------------------------------------------------

    /// Creates a tenant.
    ///
    /// # Errors
    ///
    /// Propagates validation failures.
    pub fn create_tenant(
        &self,
        request: CreateTenantRequest,
        now: Timestamp,
    ) -> Result<Tenant, CoreError> {
        self.mutate(None, "system", "tenant.create", now, None, |state| {
            let tenant = create_tenant(state, request, now)?;
            // The creation lands in the new tenant's own audit trail.
            record_audit_event(state, &tenant.id, "system", "tenant.create", None, now);
            Ok(tenant)
        })
    }

    /// Lists all tenants.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_tenants(&self) -> Result<Vec<Tenant>, CoreError> {
        self.read(|state| Ok(list_tenants(state)))
    }

    // ------------------------------------------------------------------
    // Settings, profiles, report types
    // ------------------------------------------------------------------

    /// Returns the caller's settings view.
    ///
    /// # Errors
    ///
    /// Propagates unknown-tenant failures.
    pub fn get_settings(
        &self,
        ctx: &AuthContext,
        now: Timestamp,
    ) -> Result<crate::core::SettingsView, CoreError> {
        self.mutate(Some(&ctx.tenant_id), &ctx.user_id, "settings.read", now, None, |state| {
            settings::get_settings(state, &ctx.tenant_id)
        })
    }

    /// Patches one settings section.
    ///
    /// # Errors
    ///
    /// Propagates validation failures.
    pub fn patch_settings(
        &self,
        ctx: &AuthContext,
        section: SettingsSection,
        patch: &Value,
        now: Timestamp,
    ) -> Result<crate::core::SettingsView, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "settings.patch",
            now,
            Some(patch.clone()),
            |state| settings::patch_settings(state, &ctx.tenant_id, section, patch, now),
        )
    }

    /// Returns the caller's channel settings.
    ///
    /// # Errors
    ///
    /// Propagates unknown-tenant failures.
    pub fn get_channel_settings(
        &self,
        ctx: &AuthContext,
        now: Timestamp,
    ) -> Result<ChannelSettings, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "settings.channels.read",
            now,
            None,
            |state| settings::get_channel_settings(state, &ctx.tenant_id),
        )
    }

    /// Lists model profiles, seeding presets on first use.
    ///
    /// # Errors
    ///
    /// Propagates unknown-tenant failures.
    pub fn list_model_profiles(
        &self,
        ctx: &AuthContext,
        now: Timestamp,
    ) -> Result<Vec<ModelProfile>, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "models.profiles.list",
            now,
            None,
            |state| settings::list_model_profiles(state, &ctx.tenant_id, now),
        )
    }

    /// Creates a model profile.
    ///
    /// # Errors
    ///
    /// Propagates validation failures.
    pub fn create_model_profile(
        &self,
        ctx: &AuthContext,
        request: ModelProfileRequest,
        now: Timestamp,
    ) -> Result<ModelProfile, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "models.profiles.create",
            now,
            None,
            |state| settings::create_model_profile(state, &ctx.tenant_id, request, now),
        )
    }

    /// Patches a model profile.
    ///
    /// # Errors
    ///
    /// Propagates unknown-profile failures.
    pub fn patch_model_profile(
        &self,
        ctx: &AuthContext,
        profile_id: &ModelProfileId,
        request: ModelProfileRequest,
        now: Timestamp,
    ) -> Result<ModelProfile, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "models.profiles.patch",
            now,
            None,
            |state| settings::patch_model_profile(state, &ctx.tenant_id, profile_id, request),
        )
    }

    /// Activates a model profile.
    ///
    /// # Errors
    ///
    /// Propagates unknown-profile failures.
    pub fn activate_model_profile(
        &self,
        ctx: &AuthContext,
        profile_id: &ModelProfileId,
        now: Timestamp,
    ) -> Result<ModelProfile, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "models.profiles.activate",
            now,
            None,
            |state| settings::activate_model_profile(state, &ctx.tenant_id, profile_id),
        )
    }

    /// Lists report types, seeding presets on first use.
    ///
    /// # Errors
    ///
    /// Propagates unknown-tenant failures.
    pub fn list_report_types(
        &self,
        ctx: &AuthContext,
        now: Timestamp,
    ) -> Result<Vec<ReportType>, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "reports.types.list",
            now,
            None,
            |state| settings::list_report_types(state, &ctx.tenant_id, now),
        )
    }

    /// Creates a report type.
    ///
    /// # Errors
    ///
    /// Propagates validation failures.
    pub fn create_report_type(
        &self,
        ctx: &AuthContext,
        request: ReportTypeRequest,
        now: Timestamp,
    ) -> Result<ReportType, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "reports.types.create",
            now,
            None,
            |state| settings::create_report_type(state, &ctx.tenant_id, request, now),
        )
    }

    /// Patches a report type.
    ///
    /// # Errors
    ///
    /// Propagates unknown-type failures.
    pub fn patch_report_type(
        &self,
        ctx: &AuthContext,
        report_type_id: &ReportTypeId,
        request: ReportTypeRequest,
        now: Timestamp,
    ) -> Result<ReportType, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "reports.types.patch",
            now,
            None,
            |state| {
                settings::patch_report_type(state, &ctx.tenant_id, report_type_id, request)
            },
        )
    }

    /// Renders a report type's body without persisting a report.
    ///
    /// # Errors
    ///
    /// Propagates unknown-type failures.
    pub fn preview_report_type(
        &self,
        ctx: &AuthContext,
        report_type_id: &ReportTypeId,
        metric_ids: &[String],
    ) -> Result<Value, CoreError> {
        self.read(|state| {
            let rtype = state
                .report_types
                .iter()
                .find(|rtype| rtype.id == *report_type_id && rtype.tenant_id == ctx.tenant_id)
                .ok_or_else(|| CoreError::not_found("report type not found"))?;
            let metric_ids = reports::effective_metric_ids(metric_ids);
            let body = reports::render_report_body(
                state,
                &ctx.tenant_id,
                &metric_ids,
                reports::parse_grain(None),
            )?;
            Ok(json!({
                "reportType": rtype.id,
                "title": rtype.name,
                "sections": rtype.sections,
                "body": body,
            }))
        })
    }

    /// Renders a report type's per-channel delivery messages without
    /// dispatching anything.
    ///
    /// # Errors
    ///
    /// Propagates unknown-type failures.
    pub fn preview_report_type_delivery(
        &self,
        ctx: &AuthContext,
        report_type_id: &ReportTypeId,
    ) -> Result<Value, CoreError> {
        self.read(|state| {
            let rtype = state
                .report_types
                .iter()
                .find(|rtype| rtype.id == *report_type_id && rtype.tenant_id == ctx.tenant_id)
                .ok_or_else(|| CoreError::not_found("report type not found"))?;
            let mut context = BTreeMap::new();
            context.insert("reportTitle".to_string(), rtype.name.clone());
            context.insert("reportSummary".to_string(), "preview".to_string());
            context.insert("tenantId".to_string(), ctx.tenant_id.to_string());
            context.insert("confidence".to_string(), "0.80".to_string());
            context.insert("actionsCount".to_string(), "0".to_string());
            context.insert("runId".to_string(), String::new());
            context.insert("insightId".to_string(), String::new());
            let mut rendered = serde_json::Map::new();
            for (channel, template) in &rtype.delivery_templates {
                let mut context = context.clone();
                context.insert("channel".to_string(), channel.as_str().to_string());
                rendered.insert(
                    channel.as_str().to_string(),
                    Value::from(render_template(template, &context)),
                );
            }
            Ok(Value::Object(rendered))
        })
    }

    // ------------------------------------------------------------------
    // Source connections
    // ------------------------------------------------------------------

    /// Creates a source connection.
    ///
    /// # Errors
    ///
    /// Propagates catalog validation failures.
    pub fn create_connection(
        &self,
        ctx: &AuthContext,
        request: CreateConnectionRequest,
        now: Timestamp,
    ) -> Result<SourceConnection, CoreError> {
        let source_type = request.source_type.clone();
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "sources.connections.create",
            now,
            Some(json!({"sourceType": source_type})),
            |state| sources::create_connection(state, &ctx.tenant_id, request, now),
        )
    }

    /// Lists the caller's connections.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_connections(&self, ctx: &AuthContext) -> Result<Vec<SourceConnection>, CoreError> {
        self.read(|state| {
            Ok(state
                .connections
                .iter()
                .filter(|connection| connection.tenant_id == ctx.tenant_id)
                .cloned()
                .collect())
        })
    }

    /// Patches a connection.
    ///
    /// # Errors
    ///
    /// Propagates unknown-connection failures.
    pub fn patch_connection(
        &self,
        ctx: &AuthContext,
        connection_id: &ConnectionId,
        request: PatchConnectionRequest,
        now: Timestamp,
    ) -> Result<SourceConnection, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "sources.connections.patch",
            now,
            None,
            |state| sources::patch_connection(state, &ctx.tenant_id, connection_id, request, now),
        )
    }

    /// Tests a connection's credentials.
    ///
    /// # Errors
    ///
    /// Propagates unknown-connection failures.
    pub fn test_connection(
        &self,
        ctx: &AuthContext,
        connection_id: &ConnectionId,
        now: Timestamp,
    ) -> Result<ConnectionTestResult, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "sources.connections.test",
            now,
            None,
            |state| sources::test_connection(state, &ctx.tenant_id, connection_id),
        )
    }

    /// Syncs a connection.
    ///
    /// # Errors
    ///
    /// Propagates mode and unknown-connection failures.
    pub fn sync_connection(
        &self,
        ctx: &AuthContext,
        connection_id: &ConnectionId,
        options: SourceSyncOptions,
        now: Timestamp,
    ) -> Result<SourceRun, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "sources.connections.sync",
            now,
            Some(json!({"connectionId": connection_id})),
            |state| sources::run_source_sync(state, &ctx.tenant_id, connection_id, options, now),
        )
    }

    /// Lists a connection's sync runs.
    ///
    /// # Errors
    ///
    /// Propagates unknown-connection failures.
    pub fn list_connection_runs(
        &self,
        ctx: &AuthContext,
        connection_id: &ConnectionId,
    ) -> Result<Vec<SourceRun>, CoreError> {
        self.read(|state| {
            if state.connection(&ctx.tenant_id, connection_id).is_none() {
                return Err(CoreError::not_found("source connection not found"));
            }
            Ok(state
                .source_runs
                .iter()
                .filter(|run| run.connection_id == *connection_id)
                .cloned()
                .collect())
        })
    }

    /// Quick-sync: reuses or creates a connection for a provider, then syncs.
    ///
    /// # Errors
    ///
    /// Propagates catalog and sync failures.
    pub fn connector_quick_sync(
        &self,
        ctx: &AuthContext,
        provider: &str,
        options: SourceSyncOptions,
        now: Timestamp,
    ) -> Result<SourceRun, CoreError> {
        let provider = provider.to_string();
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "connectors.sync",
            now,
            Some(json!({"provider": provider})),
            |state| {
                let existing = state
                    .connections
                    .iter()
                    .find(|connection| {
                        connection.tenant_id == ctx.tenant_id
                            && connection.source_type == provider
                            && connection.mode.supports_ingest()
                    })
                    .map(|connection| connection.id.clone());
                let connection_id = match existing {
                    Some(id) => id,
                    None => {
                        sources::create_connection(
                            state,
                            &ctx.tenant_id,
                            CreateConnectionRequest {
                                source_type: provider.clone(),
                                auth: Some(json!({"token": "quick-sync"})),
                                ..CreateConnectionRequest::default()
                            },
                            now,
                        )?
                        .id
                    }
                };
                sources::run_source_sync(state, &ctx.tenant_id, &connection_id, options, now)
            },
        )
    }

    // ------------------------------------------------------------------
    // Metrics and queries
    // ------------------------------------------------------------------

    /// Runs a metric query.
    ///
    /// # Errors
    ///
    /// Propagates missing-metric failures.
    pub fn query_metric(
        &self,
        ctx: &AuthContext,
        query: &MetricQuery,
    ) -> Result<MetricSeries, CoreError> {
        self.read(|state| query_metric(state, &ctx.tenant_id, query))
    }

    /// Runs a live query.
    ///
    /// # Errors
    ///
    /// Propagates policy and allowlist failures.
    pub fn run_live_query(
        &self,
        ctx: &AuthContext,
        request: &LiveQueryRequest,
        now: Timestamp,
    ) -> Result<crate::core::LiveQueryResult, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "query.live",
            now,
            None,
            |state| run_live_query(state, &ctx.tenant_id, request, now),
        )
    }

    /// Materializes query rows into canonical facts.
    ///
    /// # Errors
    ///
    /// Propagates query and mapping failures.
    pub fn materialize(
        &self,
        ctx: &AuthContext,
        request: MaterializeRequest,
        now: Timestamp,
    ) -> Result<MaterializationRun, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "query.materialize",
            now,
            None,
            |state| materialize_query_result(state, &ctx.tenant_id, request, now),
        )
    }

    // ------------------------------------------------------------------
    // Models and insights
    // ------------------------------------------------------------------

    /// Runs a model task.
    ///
    /// # Errors
    ///
    /// Propagates task validation failures.
    pub fn run_model(
        &self,
        ctx: &AuthContext,
        request: ModelTaskRequest,
        now: Timestamp,
    ) -> Result<ModelTaskOutcome, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "models.run",
            now,
            None,
            |state| run_model_task(state, &ctx.tenant_id, request, now),
        )
    }

    /// Returns the latest insight for the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no insight exists yet.
    pub fn latest_insight(&self, ctx: &AuthContext) -> Result<Insight, CoreError> {
        self.read(|state| {
            state
                .insights
                .iter()
                .rev()
                .find(|insight| insight.tenant_id == ctx.tenant_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("no insights recorded yet"))
        })
    }

    /// Returns an insight by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` outside the caller's tenant.
    pub fn get_insight(&self, ctx: &AuthContext, insight_id: &InsightId) -> Result<Insight, CoreError> {
        self.read(|state| {
            state
                .insights
                .iter()
                .find(|insight| insight.id == *insight_id && insight.tenant_id == ctx.tenant_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("insight not found"))
        })
    }

    /// Lists recommended actions still pending a decision.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn pending_actions(&self, ctx: &AuthContext) -> Result<Vec<RecommendedAction>, CoreError> {
        self.read(|state| {
            Ok(state
                .insights
                .iter()
                .filter(|insight| insight.tenant_id == ctx.tenant_id)
                .flat_map(|insight| insight.recommended_actions.iter())
                .filter(|action| action.execution_state == ActionExecutionState::Pending)
                .cloned()
                .collect())
        })
    }

    /// Applies a human decision to a pending action.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no pending action matches.
    pub fn approve_action(
        &self,
        ctx: &AuthContext,
        action_id: &crate::core::ActionId,
        decision: ApprovalDecision,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<ActionApproval, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "agents.actions.approve",
            now,
            Some(json!({"actionId": action_id})),
            |state| {
                let action = state
                    .insights
                    .iter_mut()
                    .filter(|insight| insight.tenant_id == ctx.tenant_id)
                    .flat_map(|insight| insight.recommended_actions.iter_mut())
                    .find(|action| action.id == *action_id)
                    .ok_or_else(|| CoreError::not_found("action not found"))?;
                action.execution_state = match decision {
                    ApprovalDecision::Approve => ActionExecutionState::Executed,
                    ApprovalDecision::Reject => ActionExecutionState::Rejected,
                };
                let approval = ActionApproval {
                    id: ApprovalId::generate(),
                    tenant_id: ctx.tenant_id.clone(),
                    action_id: action_id.clone(),
                    decision,
                    reason,
                    decided_at: now,
                };
                state.approvals.push(approval.clone());
                Ok(approval)
            },
        )
    }

    // ------------------------------------------------------------------
    // Skills
    // ------------------------------------------------------------------

    /// Installs a skill manifest (or a bundled catalog skill by id).
    ///
    /// # Errors
    ///
    /// Propagates manifest validation failures.
    pub fn install_skill(
        &self,
        ctx: &AuthContext,
        manifest: Option<SkillManifest>,
        catalog_id: Option<String>,
        now: Timestamp,
    ) -> Result<InstalledSkill, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "skills.install",
            now,
            None,
            |state| match (manifest, catalog_id) {
                (Some(manifest), _) => skills::install_skill(
                    state,
                    &ctx.tenant_id,
                    manifest,
                    SkillPrecedence::Local,
                    now,
                ),
                (None, Some(catalog_id)) => {
                    skills::install_from_catalog(state, &ctx.tenant_id, &catalog_id, now)
                }
                (None, None) => {
                    Err(CoreError::bad_request("either manifest or catalogId is required"))
                }
            },
        )
    }

    /// Lists installed skills.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_installed_skills(&self, ctx: &AuthContext) -> Result<Vec<InstalledSkill>, CoreError> {
        self.read(|state| {
            Ok(state
                .skills
                .iter()
                .filter(|skill| skill.tenant_id == ctx.tenant_id)
                .cloned()
                .collect())
        })
    }

    /// Activates or deactivates an installed skill.
    ///
    /// # Errors
    ///
    /// Propagates unknown-skill failures.
    pub fn set_skill_active(
        &self,
        ctx: &AuthContext,
        skill_id: &str,
        active: bool,
        now: Timestamp,
    ) -> Result<InstalledSkill, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            if active { "skills.activate" } else { "skills.deactivate" },
            now,
            Some(json!({"skillId": skill_id})),
            |state| skills::set_skill_active(state, &ctx.tenant_id, skill_id, active),
        )
    }

    /// Runs a skill pack.
    ///
    /// # Errors
    ///
    /// Propagates routing, signature, and guardrail failures.
    pub fn run_skill(
        &self,
        ctx: &AuthContext,
        request: &SkillRunRequest,
        now: Timestamp,
    ) -> Result<SkillRun, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "skills.run",
            now,
            Some(json!({"intent": request.intent})),
            |state| skills::run_skill_pack(state, &ctx.tenant_id, request, &CoreAdapters, now),
        )
    }

    /// Lists skill runs.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_skill_runs(&self, ctx: &AuthContext) -> Result<Vec<SkillRun>, CoreError> {
        self.read(|state| {
            Ok(state
                .skill_runs
                .iter()
                .filter(|run| run.tenant_id == ctx.tenant_id)
                .cloned()
                .collect())
        })
    }

    /// Creates a skill draft.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn create_skill_draft(
        &self,
        ctx: &AuthContext,
        manifest: SkillManifest,
        now: Timestamp,
    ) -> Result<SkillDraft, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "skills.drafts.create",
            now,
            None,
            |state| Ok(skills::create_draft(state, &ctx.tenant_id, manifest, now)),
        )
    }

    /// Lists skill drafts.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_skill_drafts(&self, ctx: &AuthContext) -> Result<Vec<SkillDraft>, CoreError> {
        self.read(|state| {
            Ok(state
                .skill_drafts
                .iter()
                .filter(|draft| draft.tenant_id == ctx.tenant_id)
                .cloned()
                .collect())
        })
    }

    /// Replaces a draft's manifest.
    ///
    /// # Errors
    ///
    /// Propagates unknown-draft failures.
    pub fn patch_skill_draft(
        &self,
        ctx: &AuthContext,
        draft_id: &SkillDraftId,
        manifest: SkillManifest,
        now: Timestamp,
    ) -> Result<SkillDraft, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "skills.drafts.patch",
            now,
            None,
            |state| skills::patch_draft(state, &ctx.tenant_id, draft_id, manifest, now),
        )
    }

    /// Validates a draft's manifest.
    ///
    /// # Errors
    ///
    /// Propagates unknown-draft failures.
    pub fn validate_skill_draft(
        &self,
        ctx: &AuthContext,
        draft_id: &SkillDraftId,
    ) -> Result<Vec<GuardrailCheck>, CoreError> {
        self.read(|state| skills::validate_draft(state, &ctx.tenant_id, draft_id))
    }

    /// Publishes a draft as an installed skill.
    ///
    /// # Errors
    ///
    /// Propagates validation failures.
    pub fn publish_skill_draft(
        &self,
        ctx: &AuthContext,
        draft_id: &SkillDraftId,
        now: Timestamp,
    ) -> Result<InstalledSkill, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "skills.drafts.publish",
            now,
            None,
            |state| skills::publish_draft(state, &ctx.tenant_id, draft_id, now),
        )
    }

    // ------------------------------------------------------------------
    // Reports and channels
    // ------------------------------------------------------------------

    /// Generates a report.
    ///
    /// # Errors
    ///
    /// Propagates aggregation failures.
    pub fn generate_report(
        &self,
        ctx: &AuthContext,
        request: ReportRequest,
        now: Timestamp,
    ) -> Result<ReportOutcome, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "reports.generate",
            now,
            None,
            |state| reports::generate_report(state, &ctx.tenant_id, request, now),
        )
    }

    /// Lists the caller's reports.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_reports(&self, ctx: &AuthContext) -> Result<Vec<Report>, CoreError> {
        self.read(|state| {
            Ok(state
                .reports
                .iter()
                .filter(|report| report.tenant_id == ctx.tenant_id)
                .cloned()
                .collect())
        })
    }

    /// Returns a report by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` outside the caller's tenant.
    pub fn get_report(&self, ctx: &AuthContext, report_id: &ReportId) -> Result<Report, CoreError> {
        self.read(|state| {
            state
                .reports
                .iter()
                .find(|report| report.id == *report_id && report.tenant_id == ctx.tenant_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("report not found"))
        })
    }

    /// Creates a report schedule.
    ///
    /// # Errors
    ///
    /// Propagates unknown-tenant failures.
    pub fn create_report_schedule(
        &self,
        ctx: &AuthContext,
        request: CreateScheduleRequest,
        now: Timestamp,
    ) -> Result<ReportSchedule, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "reports.schedules.create",
            now,
            None,
            |state| create_schedule(state, &ctx.tenant_id, request, now),
        )
    }

    /// Lists channel events.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_channel_events(&self, ctx: &AuthContext) -> Result<Vec<ChannelEvent>, CoreError> {
        self.read(|state| {
            Ok(state
                .channel_events
                .iter()
                .filter(|event| event.tenant_id == ctx.tenant_id)
                .cloned()
                .collect())
        })
    }

    /// Retries a channel event.
    ///
    /// # Errors
    ///
    /// Propagates unknown-event failures.
    pub fn retry_channel_event(
        &self,
        ctx: &AuthContext,
        event_id: &ChannelEventId,
        force_fail: bool,
        now: Timestamp,
    ) -> Result<ChannelEvent, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "channels.events.retry",
            now,
            Some(json!({"eventId": event_id})),
            |state| retry_channel_event(state, &ctx.tenant_id, event_id, force_fail, now),
        )
    }

    // ------------------------------------------------------------------
    // Analysis runs
    // ------------------------------------------------------------------

    /// Creates an analysis run.
    ///
    /// # Errors
    ///
    /// Propagates reference validation failures.
    pub fn create_analysis_run(
        &self,
        ctx: &AuthContext,
        request: CreateAnalysisRunRequest,
        now: Timestamp,
    ) -> Result<AnalysisRun, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "analysis.runs.create",
            now,
            None,
            |state| analysis::create_analysis_run(state, &ctx.tenant_id, request, now),
        )
    }

    /// Lists analysis runs.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn list_analysis_runs(&self, ctx: &AuthContext) -> Result<Vec<AnalysisRun>, CoreError> {
        self.read(|state| {
            Ok(state
                .analysis_runs
                .iter()
                .filter(|run| run.tenant_id == ctx.tenant_id)
                .cloned()
                .collect())
        })
    }

    /// Returns an analysis run by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` outside the caller's tenant.
    pub fn get_analysis_run(
        &self,
        ctx: &AuthContext,
        run_id: &AnalysisRunId,
    ) -> Result<AnalysisRun, CoreError> {
        self.read(|state| {
            state
                .analysis_run(&ctx.tenant_id, run_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("analysis run not found"))
        })
    }

    /// Executes an analysis run.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step's error.
    pub fn execute_analysis_run(
        &self,
        ctx: &AuthContext,
        run_id: &AnalysisRunId,
        options: &ExecuteOptions,
        now: Timestamp,
    ) -> Result<AnalysisRun, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "analysis.runs.execute",
            now,
            Some(json!({"runId": run_id})),
            |state| {
                analysis::execute_analysis_run(
                    state,
                    &ctx.tenant_id,
                    run_id,
                    options,
                    &CoreAdapters,
                    now,
                )
            },
        )
    }

    /// Re-delivers a run's report.
    ///
    /// # Errors
    ///
    /// Propagates missing-report failures.
    pub fn deliver_analysis_run(
        &self,
        ctx: &AuthContext,
        run_id: &AnalysisRunId,
        channels: Option<Vec<Channel>>,
        now: Timestamp,
    ) -> Result<AnalysisRun, CoreError> {
        self.mutate(
            Some(&ctx.tenant_id),
            &ctx.user_id,
            "analysis.runs.deliver",
            now,
            Some(json!({"runId": run_id})),
            |state| {
                analysis::deliver_analysis_run(
                    state,
                    &ctx.tenant_id,
                    run_id,
                    channels,
                    &CoreAdapters,
                    now,
                )
            },
        )
    }

    // ------------------------------------------------------------------
    // Audit and scheduler
    // ------------------------------------------------------------------

    /// Queries the caller's audit events.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn audit_events(
        &self,
        ctx: &AuthContext,
        since: Option<Timestamp>,
    ) -> Result<Vec<AuditEvent>, CoreError> {
        self.read(|state| Ok(query_audit_events(state, &ctx.tenant_id, since)))
    }

    /// Processes one scheduler tick.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned; schedule callback
    /// failures are swallowed into the outcome.
    pub fn scheduler_tick(&self, now: Timestamp) -> Result<TickOutcome, CoreError> {
        let mut state = self.lock()?;
        let outcome = run_scheduler_tick(&mut state, &CoreAdapters, now);
        self.store
            .save(&StateSnapshot::capture(&state))
            .map_err(|err| CoreError::internal(err.to_string()))?;
        Ok(outcome)
    }

    /// Runs an arbitrary read over the state; test and seed helper.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the lock is poisoned.
    pub fn with_state<T>(
        &self,
        op: impl FnOnce(&PlatformState) -> T,
    ) -> Result<T, CoreError> {
        let state = self.lock()?;
        Ok(op(&state))
    }
}
