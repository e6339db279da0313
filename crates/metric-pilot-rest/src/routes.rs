// crates/metric-pilot-rest/src/routes.rs
// ============================================================================
// Module: REST Routes
// Description: Route table and handlers for every core operation.
// Purpose: Bind the HTTP surface to engine calls with explicit role sets.
// Dependencies: axum, metric-pilot-core, crate::api
// ============================================================================

//! ## Overview
//! Every handler follows the same shape: resolve the auth context, check the
//! route's declared role set, call the engine with a host-supplied timestamp,
//! and render the result. Handlers never reach into state directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use metric_pilot_core::ActionId;
use metric_pilot_core::AnalysisRunId;
use metric_pilot_core::ApprovalDecision;
use metric_pilot_core::Channel;
use metric_pilot_core::ChannelEventId;
use metric_pilot_core::ConnectionId;
use metric_pilot_core::CoreError;
use metric_pilot_core::CreateAnalysisRunRequest;
use metric_pilot_core::CreateConnectionRequest;
use metric_pilot_core::CreateScheduleRequest;
use metric_pilot_core::CreateTenantRequest;
use metric_pilot_core::Engine;
use metric_pilot_core::ExecuteOptions;
use metric_pilot_core::InsightId;
use metric_pilot_core::LiveQueryRequest;
use metric_pilot_core::MaterializeRequest;
use metric_pilot_core::MetricQuery;
use metric_pilot_core::ModelProfileId;
use metric_pilot_core::ModelProfileRequest;
use metric_pilot_core::ModelTaskRequest;
use metric_pilot_core::PatchConnectionRequest;
use metric_pilot_core::ReportId;
use metric_pilot_core::ReportRequest;
use metric_pilot_core::ReportTypeId;
use metric_pilot_core::ReportTypeRequest;
use metric_pilot_core::SettingsSection;
use metric_pilot_core::SkillDraftId;
use metric_pilot_core::SkillManifest;
use metric_pilot_core::SkillRunRequest;
use metric_pilot_core::SourceSyncOptions;
use metric_pilot_core::TenantId;
use metric_pilot_core::Timestamp;
use metric_pilot_core::runtime::ROLES_ADMIN;
use metric_pilot_core::runtime::ROLES_AUTHOR;
use metric_pilot_core::runtime::require_role;
use metric_pilot_core::runtime::require_same_tenant;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::api::ApiJson;
use crate::api::ApiResult;
use crate::api::Ctx;
use crate::api::MAX_BODY_BYTES;
use crate::api::now;
use crate::server::AppState;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full route table over the shared state.
#[must_use]
#[allow(clippy::too_many_lines, reason = "the route table reads best in one place")]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/feature-flags", get(feature_flags))
        .route("/v1/blueprints", get(blueprints))
        .route("/v1/tenants", get(list_tenants).post(create_tenant))
        .route("/v1/settings", get(get_settings))
        .route("/v1/settings/channels", get(get_channels).patch(patch_channels))
        .route("/v1/settings/{section}", patch(patch_settings))
        .route("/v1/models/profiles", get(list_profiles).post(create_profile))
        .route("/v1/models/profiles/{id}", patch(patch_profile))
        .route("/v1/models/profiles/{id}/activate", post(activate_profile))
        .route("/v1/models/run", post(run_model))
        .route("/v1/metrics/query", get(metrics_query))
        .route("/v1/query/live", post(live_query))
        .route("/v1/query/materialize", post(materialize))
        .route("/v1/sources/catalog", get(sources_catalog))
        .route("/v1/sources/connections", get(list_connections).post(create_connection))
        .route("/v1/sources/connections/{id}", patch(patch_connection))
        .route("/v1/sources/connections/{id}/test", post(test_connection))
        .route("/v1/sources/connections/{id}/sync", post(sync_connection))
        .route("/v1/sources/connections/{id}/runs", get(connection_runs))
        .route("/v1/connectors/{provider}/sync", post(connector_sync))
        .route("/v1/skills/catalog", get(skills_catalog))
        .route("/v1/skills/install", post(install_skill))
        .route("/v1/skills/installed", get(installed_skills))
        .route("/v1/skills/run", post(run_skill))
        .route("/v1/skills/runs", get(skill_runs))
        .route("/v1/skills/drafts", get(list_drafts).post(create_draft))
        .route("/v1/skills/drafts/{id}", patch(patch_draft))
        .route("/v1/skills/drafts/{id}/validate", post(validate_draft))
        .route("/v1/skills/drafts/{id}/publish", post(publish_draft))
        .route("/v1/skills/{id}/activate", post(activate_skill))
        .route("/v1/skills/{id}/deactivate", post(deactivate_skill))
        .route("/v1/reports/types", get(list_report_types).post(create_report_type))
        .route("/v1/reports/types/{id}", patch(patch_report_type))
        .route("/v1/reports/types/{id}/preview", post(preview_report_type))
        .route("/v1/reports/types/{id}/delivery-preview", post(delivery_preview))
        .route("/v1/reports/generate", post(generate_report))
        .route("/v1/reports/schedules", post(create_schedule))
        .route("/v1/reports", get(list_reports))
        .route("/v1/reports/{id}", get(get_report))
        .route("/v1/channels/events", get(channel_events))
        .route("/v1/channels/events/{id}/retry", post(retry_event))
        .route("/v1/analysis-runs", get(list_analysis_runs).post(create_analysis_run))
        .route("/v1/analysis-runs/{id}", get(get_analysis_run))
        .route("/v1/analysis-runs/{id}/execute", post(execute_analysis_run))
        .route("/v1/analysis-runs/{id}/deliver", post(deliver_analysis_run))
        .route("/v1/agents/jobs", post(agent_job))
        .route("/v1/agents/actions/approve", post(approve_action))
        .route("/v1/agents/actions/pending", get(pending_actions))
        .route("/v1/insights/latest", get(latest_insight))
        .route("/v1/insights/{id}", get(get_insight))
        .route("/v1/audit/events", get(audit_events))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Engine accessor shorthand.
fn engine(state: &AppState) -> &Engine {
    &state.engine
}

// ============================================================================
// SECTION: Platform Handlers
// ============================================================================

/// `GET /v1/feature-flags`
async fn feature_flags() -> Json<Value> {
    Json(Engine::feature_flags())
}

/// `GET /v1/blueprints`
async fn blueprints() -> Json<Value> {
    Json(json!({"blueprints": Engine::blueprints()}))
}

/// `GET /v1/tenants`
async fn list_tenants(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let tenants = engine(&state).list_tenants()?;
    Ok(Json(json!({"tenants": tenants})))
}

/// `POST /v1/tenants`
async fn create_tenant(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let tenant = engine(&state).create_tenant(request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"tenant": tenant}))))
}

/// `GET /v1/settings`
async fn get_settings(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let view = engine(&state).get_settings(&ctx, now())?;
    Ok(Json(json!({"settings": view})))
}

/// `PATCH /v1/settings/{section}`
async fn patch_settings(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(section): Path<String>,
    ApiJson(patch): ApiJson<Value>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let section = SettingsSection::parse(&section)
        .ok_or_else(|| CoreError::not_found(format!("unknown settings section: {section}")))?;
    let view = engine(&state).patch_settings(&ctx, section, &patch, now())?;
    Ok(Json(json!({"settings": view})))
}

/// `GET /v1/settings/channels`
async fn get_channels(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let channels = engine(&state).get_channel_settings(&ctx, now())?;
    Ok(Json(json!({"channels": channels})))
}

/// `PATCH /v1/settings/channels`
async fn patch_channels(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(patch): ApiJson<Value>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let view = engine(&state).patch_settings(&ctx, SettingsSection::Channels, &patch, now())?;
    Ok(Json(json!({"channels": view.settings.channels})))
}

/// Query parameters for the audit listing.
#[derive(Debug, Deserialize)]
struct AuditParams {
    /// Tenant the caller claims to read; must equal the context tenant.
    tenant_id: Option<String>,
    /// Inclusive lower bound in unix milliseconds.
    since: Option<i64>,
}

/// `GET /v1/audit/events`
async fn audit_events(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Query(params): Query<AuditParams>,
) -> ApiResult<Json<Value>> {
    if let Some(tenant_id) = &params.tenant_id {
        require_same_tenant(&ctx, &TenantId::new(tenant_id.clone()))?;
    }
    let events =
        engine(&state).audit_events(&ctx, params.since.map(Timestamp::from_unix_millis))?;
    Ok(Json(json!({"events": events})))
}

// ============================================================================
// SECTION: Model Profile Handlers
// ============================================================================

/// `GET /v1/models/profiles`
async fn list_profiles(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let profiles = engine(&state).list_model_profiles(&ctx, now())?;
    Ok(Json(json!({"profiles": profiles})))
}

/// `POST /v1/models/profiles`
async fn create_profile(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<ModelProfileRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let profile = engine(&state).create_model_profile(&ctx, request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"profile": profile}))))
}

/// `PATCH /v1/models/profiles/{id}`
async fn patch_profile(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<ModelProfileRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let profile =
        engine(&state).patch_model_profile(&ctx, &ModelProfileId::new(id), request, now())?;
    Ok(Json(json!({"profile": profile})))
}

/// `POST /v1/models/profiles/{id}/activate`
async fn activate_profile(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let profile = engine(&state).activate_model_profile(&ctx, &ModelProfileId::new(id), now())?;
    Ok(Json(json!({"profile": profile})))
}

// ============================================================================
// SECTION: Metric and Query Handlers
// ============================================================================

/// `GET /v1/metrics/query`
async fn metrics_query(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Query(query): Query<MetricQuery>,
) -> ApiResult<Json<Value>> {
    let series = engine(&state).query_metric(&ctx, &query)?;
    Ok(Json(json!({"metric": series})))
}

/// `POST /v1/query/live`
async fn live_query(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<LiveQueryRequest>,
) -> ApiResult<Json<Value>> {
    let result = engine(&state).run_live_query(&ctx, &request, now())?;
    Ok(Json(json!({"result": result})))
}

/// `POST /v1/query/materialize`
async fn materialize(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<MaterializeRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let run = engine(&state).materialize(&ctx, request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"materialization": run}))))
}

// ============================================================================
// SECTION: Model Run and Insight Handlers
// ============================================================================

/// `POST /v1/models/run`
async fn run_model(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<ModelTaskRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = engine(&state).run_model(&ctx, request, now())?;
    Ok(Json(json!({"run": outcome.run, "insight": outcome.insight})))
}

/// `GET /v1/insights/latest`
async fn latest_insight(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let insight = engine(&state).latest_insight(&ctx)?;
    Ok(Json(json!({"insight": insight})))
}

/// `GET /v1/insights/{id}`
async fn get_insight(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let insight = engine(&state).get_insight(&ctx, &InsightId::new(id))?;
    Ok(Json(json!({"insight": insight})))
}

/// Body for the action approval route.
#[derive(Debug, Deserialize)]
struct ApproveBody {
    /// Action under decision.
    action_id: ActionId,
    /// Decision to apply.
    decision: ApprovalDecision,
    /// Optional reviewer note.
    #[serde(default)]
    reason: Option<String>,
}

/// `POST /v1/agents/actions/approve`
async fn approve_action(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(body): ApiJson<ApproveBody>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let approval =
        engine(&state).approve_action(&ctx, &body.action_id, body.decision, body.reason, now())?;
    Ok(Json(json!({"approval": approval})))
}

/// `GET /v1/agents/actions/pending`
async fn pending_actions(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let actions = engine(&state).pending_actions(&ctx)?;
    Ok(Json(json!({"actions": actions})))
}

/// `POST /v1/agents/jobs`: routes an intent through the skill runtime.
async fn agent_job(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<SkillRunRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let run = engine(&state).run_skill(&ctx, &request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"job": run}))))
}

// ============================================================================
// SECTION: Source Handlers
// ============================================================================

/// `GET /v1/sources/catalog`
async fn sources_catalog() -> Json<Value> {
    Json(json!({"catalog": Engine::sources_catalog()}))
}

/// `POST /v1/sources/connections`
async fn create_connection(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<CreateConnectionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_ADMIN)?;
    let connection = engine(&state).create_connection(&ctx, request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"connection": connection}))))
}

/// `GET /v1/sources/connections`
async fn list_connections(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let connections = engine(&state).list_connections(&ctx)?;
    Ok(Json(json!({"connections": connections})))
}

/// `PATCH /v1/sources/connections/{id}`
async fn patch_connection(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<PatchConnectionRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let connection =
        engine(&state).patch_connection(&ctx, &ConnectionId::new(id), request, now())?;
    Ok(Json(json!({"connection": connection})))
}

/// `POST /v1/sources/connections/{id}/test`
async fn test_connection(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let result = engine(&state).test_connection(&ctx, &ConnectionId::new(id), now())?;
    Ok(Json(json!({"test": result})))
}

/// `POST /v1/sources/connections/{id}/sync`
async fn sync_connection(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(options): ApiJson<SourceSyncOptions>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let run = engine(&state).sync_connection(&ctx, &ConnectionId::new(id), options, now())?;
    Ok(Json(json!({"run": run})))
}

/// `GET /v1/sources/connections/{id}/runs`
async fn connection_runs(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let runs = engine(&state).list_connection_runs(&ctx, &ConnectionId::new(id))?;
    Ok(Json(json!({"runs": runs})))
}

/// `POST /v1/connectors/{provider}/sync`
async fn connector_sync(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(provider): Path<String>,
    ApiJson(options): ApiJson<SourceSyncOptions>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let run = engine(&state).connector_quick_sync(&ctx, &provider, options, now())?;
    Ok(Json(json!({"run": run})))
}

// ============================================================================
// SECTION: Skill Handlers
// ============================================================================

/// `GET /v1/skills/catalog`
async fn skills_catalog() -> Json<Value> {
    Json(json!({"catalog": Engine::skills_catalog()}))
}

/// Body for the skill install route.
#[derive(Debug, Deserialize)]
struct InstallBody {
    /// Full manifest to install.
    #[serde(default)]
    manifest: Option<SkillManifest>,
    /// Bundled catalog skill to install instead.
    #[serde(default)]
    catalog_id: Option<String>,
}

/// `POST /v1/skills/install`
async fn install_skill(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(body): ApiJson<InstallBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_ADMIN)?;
    let installed = engine(&state).install_skill(&ctx, body.manifest, body.catalog_id, now())?;
    Ok((StatusCode::CREATED, Json(json!({"skill": installed}))))
}

/// `GET /v1/skills/installed`
async fn installed_skills(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let skills = engine(&state).list_installed_skills(&ctx)?;
    Ok(Json(json!({"skills": skills})))
}

/// `POST /v1/skills/run`
async fn run_skill(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<SkillRunRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let run = engine(&state).run_skill(&ctx, &request, now())?;
    Ok(Json(json!({"run": run})))
}

/// `GET /v1/skills/runs`
async fn skill_runs(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let runs = engine(&state).list_skill_runs(&ctx)?;
    Ok(Json(json!({"runs": runs})))
}

/// `POST /v1/skills/{id}/activate`
async fn activate_skill(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let skill = engine(&state).set_skill_active(&ctx, &id, true, now())?;
    Ok(Json(json!({"skill": skill})))
}

/// `POST /v1/skills/{id}/deactivate`
async fn deactivate_skill(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_ADMIN)?;
    let skill = engine(&state).set_skill_active(&ctx, &id, false, now())?;
    Ok(Json(json!({"skill": skill})))
}

/// Body for draft create/patch routes.
#[derive(Debug, Deserialize)]
struct DraftBody {
    /// Manifest under edit.
    manifest: SkillManifest,
}

/// `POST /v1/skills/drafts`
async fn create_draft(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(body): ApiJson<DraftBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let draft = engine(&state).create_skill_draft(&ctx, body.manifest, now())?;
    Ok((StatusCode::CREATED, Json(json!({"draft": draft}))))
}

/// `GET /v1/skills/drafts`
async fn list_drafts(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let drafts = engine(&state).list_skill_drafts(&ctx)?;
    Ok(Json(json!({"drafts": drafts})))
}

/// `PATCH /v1/skills/drafts/{id}`
async fn patch_draft(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<DraftBody>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let draft =
        engine(&state).patch_skill_draft(&ctx, &SkillDraftId::new(id), body.manifest, now())?;
    Ok(Json(json!({"draft": draft})))
}

/// `POST /v1/skills/drafts/{id}/validate`
async fn validate_draft(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let checks = engine(&state).validate_skill_draft(&ctx, &SkillDraftId::new(id))?;
    let passed = metric_pilot_core::runtime::skills::validation_passed(&checks);
    Ok(Json(json!({"passed": passed, "checks": checks})))
}

/// `POST /v1/skills/drafts/{id}/publish`
async fn publish_draft(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_ADMIN)?;
    let installed = engine(&state).publish_skill_draft(&ctx, &SkillDraftId::new(id), now())?;
    Ok((StatusCode::CREATED, Json(json!({"skill": installed}))))
}

// ============================================================================
// SECTION: Report Handlers
// ============================================================================

/// `GET /v1/reports/types`
async fn list_report_types(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let types = engine(&state).list_report_types(&ctx, now())?;
    Ok(Json(json!({"reportTypes": types})))
}

/// `POST /v1/reports/types`
async fn create_report_type(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<ReportTypeRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let rtype = engine(&state).create_report_type(&ctx, request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"reportType": rtype}))))
}

/// `PATCH /v1/reports/types/{id}`
async fn patch_report_type(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<ReportTypeRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let rtype =
        engine(&state).patch_report_type(&ctx, &ReportTypeId::new(id), request, now())?;
    Ok(Json(json!({"reportType": rtype})))
}

/// Body for report type previews.
#[derive(Debug, Default, Deserialize)]
struct PreviewBody {
    /// Metrics to preview; defaults apply when empty.
    #[serde(default)]
    metric_ids: Vec<String>,
}

/// `POST /v1/reports/types/{id}/preview`
async fn preview_report_type(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PreviewBody>,
) -> ApiResult<Json<Value>> {
    let preview =
        engine(&state).preview_report_type(&ctx, &ReportTypeId::new(id), &body.metric_ids)?;
    Ok(Json(json!({"preview": preview})))
}

/// `POST /v1/reports/types/{id}/delivery-preview`
async fn delivery_preview(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let preview = engine(&state).preview_report_type_delivery(&ctx, &ReportTypeId::new(id))?;
    Ok(Json(json!({"preview": preview})))
}

/// `POST /v1/reports/generate`
async fn generate_report(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<ReportRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let outcome = engine(&state).generate_report(&ctx, request, now())?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"report": outcome.report, "deliveryEvents": outcome.delivery_events})),
    ))
}

/// `POST /v1/reports/schedules`
async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<CreateScheduleRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_ADMIN)?;
    let schedule = engine(&state).create_report_schedule(&ctx, request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"schedule": schedule}))))
}

/// `GET /v1/reports`
async fn list_reports(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let reports = engine(&state).list_reports(&ctx)?;
    Ok(Json(json!({"reports": reports})))
}

/// `GET /v1/reports/{id}`
async fn get_report(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let report = engine(&state).get_report(&ctx, &ReportId::new(id))?;
    Ok(Json(json!({"report": report})))
}

/// `GET /v1/channels/events`
async fn channel_events(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let events = engine(&state).list_channel_events(&ctx)?;
    Ok(Json(json!({"events": events})))
}

/// Query parameters for the retry route.
#[derive(Debug, Default, Deserialize)]
struct RetryParams {
    /// Force the retry attempt to fail; exercise hook.
    #[serde(default)]
    force_fail: bool,
}

/// `POST /v1/channels/events/{id}/retry`
async fn retry_event(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    Query(params): Query<RetryParams>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let event = engine(&state).retry_channel_event(
        &ctx,
        &ChannelEventId::new(id),
        params.force_fail,
        now(),
    )?;
    Ok(Json(json!({"event": event})))
}

// ============================================================================
// SECTION: Analysis Run Handlers
// ============================================================================

/// `POST /v1/analysis-runs`
async fn create_analysis_run(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    ApiJson(request): ApiJson<CreateAnalysisRunRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let run = engine(&state).create_analysis_run(&ctx, request, now())?;
    Ok((StatusCode::CREATED, Json(json!({"run": run}))))
}

/// `GET /v1/analysis-runs`
async fn list_analysis_runs(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
) -> ApiResult<Json<Value>> {
    let runs = engine(&state).list_analysis_runs(&ctx)?;
    Ok(Json(json!({"runs": runs})))
}

/// `GET /v1/analysis-runs/{id}`
async fn get_analysis_run(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let run = engine(&state).get_analysis_run(&ctx, &AnalysisRunId::new(id))?;
    Ok(Json(json!({"run": run})))
}

/// `POST /v1/analysis-runs/{id}/execute`
async fn execute_analysis_run(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(options): ApiJson<ExecuteOptions>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let run =
        engine(&state).execute_analysis_run(&ctx, &AnalysisRunId::new(id), &options, now())?;
    Ok(Json(json!({"run": run})))
}

/// Body for the deliver route.
#[derive(Debug, Default, Deserialize)]
struct DeliverBody {
    /// Channel override; defaults to the run's channels.
    #[serde(default)]
    channels: Option<Vec<Channel>>,
}

/// `POST /v1/analysis-runs/{id}/deliver`
async fn deliver_analysis_run(
    State(state): State<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<DeliverBody>,
) -> ApiResult<Json<Value>> {
    require_role(&ctx, ROLES_AUTHOR)?;
    let run = engine(&state).deliver_analysis_run(
        &ctx,
        &AnalysisRunId::new(id),
        body.channels,
        now(),
    )?;
    Ok(Json(json!({"run": run})))
}
