// crates/metric-pilot-core/src/runtime/analysis.rs
// ============================================================================
// Module: Metric Pilot Analysis Orchestrator
// Description: Five-step pipeline execution with quality gating.
// Purpose: Compose source, model, skill, report, and delivery into one run.
// Dependencies: crate::core, crate::interfaces, crate::runtime::{skills, sources}
// ============================================================================

//! ## Overview
//! The orchestrator drives an analysis run through its declared steps in
//! order, holding the single-running-step invariant: a step is marked
//! running, executed, then marked done before the next begins. A failing
//! step is marked `error` with the message, the run flips to failed, and the
//! error propagates to the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::AnalysisArtifacts;
use crate::core::AnalysisRun;
use crate::core::AnalysisRunId;
use crate::core::AnalysisRunStatus;
use crate::core::Channel;
use crate::core::ChannelEventId;
use crate::core::ConnectionId;
use crate::core::CoreError;
use crate::core::ModelProfileId;
use crate::core::ModelTaskRequest;
use crate::core::PlatformState;
use crate::core::ReportRequest;
use crate::core::ReportTypeId;
use crate::core::SourceSyncOptions;
use crate::core::StepName;
use crate::core::StepStatus;
use crate::core::TenantId;
use crate::core::TimelineEntry;
use crate::core::Timestamp;
use crate::interfaces::RunAdapters;
use crate::runtime::skills::SkillRunRequest;
use crate::runtime::skills::run_skill_pack;
use crate::runtime::sources::sync_is_stale;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request to create an analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAnalysisRunRequest {
    /// Source connection to read from.
    pub source_connection_id: ConnectionId,
    /// Model profile selecting objective and target metric.
    pub model_profile_id: ModelProfileId,
    /// Report type selecting sections and delivery defaults.
    pub report_type_id: ReportTypeId,
    /// Optional skill to run between model and report.
    #[serde(default)]
    pub skill_id: Option<String>,
    /// Delivery channels; defaults to the report type's.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// Options controlling one execution of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Force a re-sync regardless of freshness.
    #[serde(default)]
    pub force_sync: bool,
    /// Period override passed to a forced or stale sync.
    #[serde(default)]
    pub period_days: Option<i64>,
}

// ============================================================================
// SECTION: Creation
// ============================================================================

/// Creates a draft analysis run after reference validation.
///
/// # Errors
///
/// Returns `NotFound` when any referenced entity is missing from the tenant.
pub fn create_analysis_run(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: CreateAnalysisRunRequest,
    now: Timestamp,
) -> Result<AnalysisRun, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    if state.connection(tenant_id, &request.source_connection_id).is_none() {
        return Err(CoreError::not_found("source connection not found"));
    }
    let profile_exists = state
        .model_profiles
        .iter()
        .any(|profile| profile.id == request.model_profile_id && profile.tenant_id == *tenant_id);
    if !profile_exists {
        return Err(CoreError::not_found("model profile not found"));
    }
    let report_type = state
        .report_types
        .iter()
        .find(|rtype| rtype.id == request.report_type_id && rtype.tenant_id == *tenant_id)
        .ok_or_else(|| CoreError::not_found("report type not found"))?;
    let channels = if request.channels.is_empty() {
        report_type.default_channels.clone()
    } else {
        request.channels
    };
    let run = AnalysisRun {
        id: AnalysisRunId::generate(),
        tenant_id: tenant_id.clone(),
        status: AnalysisRunStatus::Draft,
        source_connection_id: request.source_connection_id,
        model_profile_id: request.model_profile_id,
        report_type_id: request.report_type_id,
        skill_id: request.skill_id,
        channels,
        steps: AnalysisRun::initial_steps(),
        artifacts: AnalysisArtifacts::default(),
        timeline: vec![TimelineEntry {
            at: now,
            message: "run created".to_string(),
        }],
        created_at: now,
        updated_at: now,
    };
    state.analysis_runs.push(run.clone());
    Ok(run)
}

// ============================================================================
// SECTION: Step Bookkeeping
// ============================================================================

/// Marks a step running and appends a timeline entry.
fn begin_step(state: &mut PlatformState, tenant_id: &TenantId, run_id: &AnalysisRunId, step: StepName, now: Timestamp) {
    if let Some(run) = state.analysis_run_mut(tenant_id, run_id) {
        if let Some(entry) = run.step_mut(step) {
            entry.status = StepStatus::Running;
        }
        run.timeline.push(TimelineEntry {
            at: now,
            message: format!("{} step started", step_label(step)),
        });
        run.updated_at = now;
    }
}

/// Marks a step done with a detail message.
fn finish_step(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    run_id: &AnalysisRunId,
    step: StepName,
    detail: String,
    now: Timestamp,
) {
    if let Some(run) = state.analysis_run_mut(tenant_id, run_id) {
        if let Some(entry) = run.step_mut(step) {
            entry.status = StepStatus::Done;
            entry.detail = Some(detail.clone());
        }
        run.timeline.push(TimelineEntry {
            at: now,
            message: format!("{} step done: {detail}", step_label(step)),
        });
        run.updated_at = now;
    }
}

/// Marks a step errored and fails the run.
fn fail_step(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    run_id: &AnalysisRunId,
    step: StepName,
    error: &CoreError,
    now: Timestamp,
) {
    if let Some(run) = state.analysis_run_mut(tenant_id, run_id) {
        if let Some(entry) = run.step_mut(step) {
            entry.status = StepStatus::Error;
            entry.detail = Some(error.message.clone());
        }
        run.status = AnalysisRunStatus::Failed;
        run.timeline.push(TimelineEntry {
            at: now,
            message: format!("{} step failed: {}", step_label(step), error.message),
        });
        run.updated_at = now;
    }
}

/// Stable step label for timeline messages.
const fn step_label(step: StepName) -> &'static str {
    match step {
        StepName::Source => "source",
        StepName::Model => "model",
        StepName::Skill => "skill",
        StepName::Report => "report",
        StepName::Delivery => "delivery",
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes an analysis run through all five steps.
///
/// # Errors
///
/// Propagates the first step failure after recording it on the run.
#[allow(clippy::too_many_lines, reason = "the step sequence reads best in one place")]
pub fn execute_analysis_run(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    run_id: &AnalysisRunId,
    options: &ExecuteOptions,
    adapters: &dyn RunAdapters,
    now: Timestamp,
) -> Result<AnalysisRun, CoreError> {
    let run = state
        .analysis_run(tenant_id, run_id)
        .ok_or_else(|| CoreError::not_found("analysis run not found"))?
        .clone();
    if let Some(existing) = state.analysis_run_mut(tenant_id, run_id) {
        existing.status = AnalysisRunStatus::Running;
        existing.steps = AnalysisRun::initial_steps();
        existing.updated_at = now;
    }

    // Source step: freshness-gated sync plus the quality gate.
    begin_step(state, tenant_id, run_id, StepName::Source, now);
    let source_result = run_source_step(state, tenant_id, &run, options, adapters, now);
    let source_detail = match source_result {
        Ok(detail) => detail,
        Err(error) => {
            fail_step(state, tenant_id, run_id, StepName::Source, &error, now);
            return Err(error);
        }
    };
    finish_step(state, tenant_id, run_id, StepName::Source, source_detail, now);

    // Model step: run the profile's task.
    begin_step(state, tenant_id, run_id, StepName::Model, now);
    let profile = state
        .model_profiles
        .iter()
        .find(|profile| profile.id == run.model_profile_id && profile.tenant_id == *tenant_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("model profile not found"));
    let model_outcome = profile.and_then(|profile| {
        adapters.run_model(
            state,
            tenant_id,
            ModelTaskRequest {
                objective: Some(profile.objective),
                output_metric_ids: vec![profile.target_metric_id.clone()],
                horizon_days: Some(profile.horizon_days.max(1)),
                provider: profile.provider.clone(),
                ..ModelTaskRequest::default()
            },
            now,
        )
    });
    let (insight_id, confidence, actions_count) = match model_outcome {
        Ok(outcome) => {
            let detail = format!(
                "insight {} at confidence {:.2}",
                outcome.insight.id, outcome.insight.confidence
            );
            let counts = (
                outcome.insight.id.clone(),
                outcome.insight.confidence,
                outcome.insight.recommended_actions.len(),
            );
            if let Some(run) = state.analysis_run_mut(tenant_id, run_id) {
                run.artifacts.insight_id = Some(outcome.insight.id.clone());
            }
            finish_step(state, tenant_id, run_id, StepName::Model, detail, now);
            counts
        }
        Err(error) => {
            fail_step(state, tenant_id, run_id, StepName::Model, &error, now);
            return Err(error);
        }
    };

    // Skill step: only when the run names a skill.
    begin_step(state, tenant_id, run_id, StepName::Skill, now);
    if let Some(skill_id) = &run.skill_id {
        let skill_result = run_skill_pack(
            state,
            tenant_id,
            &SkillRunRequest {
                skill_id: Some(skill_id.clone()),
                intent: "scheduled analysis".to_string(),
                ..SkillRunRequest::default()
            },
            adapters,
            now,
        );
        match skill_result {
            Ok(skill_run) => {
                let detail = format!("skill {} completed", skill_run.skill_id);
                finish_step(state, tenant_id, run_id, StepName::Skill, detail, now);
            }
            Err(error) => {
                fail_step(state, tenant_id, run_id, StepName::Skill, &error, now);
                return Err(error);
            }
        }
    } else {
        finish_step(state, tenant_id, run_id, StepName::Skill, "skipped".to_string(), now);
    }

    // Report step: render with the report type defaults and run context.
    begin_step(state, tenant_id, run_id, StepName::Report, now);
    let report_type = state
        .report_types
        .iter()
        .find(|rtype| rtype.id == run.report_type_id && rtype.tenant_id == *tenant_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("report type not found"));
    let report_outcome = report_type.and_then(|rtype| {
        let mut context = BTreeMap::new();
        context.insert("runId".to_string(), run.id.to_string());
        context.insert("insightId".to_string(), insight_id.to_string());
        context.insert("confidence".to_string(), format!("{confidence:.2}"));
        context.insert("actionsCount".to_string(), actions_count.to_string());
        adapters.generate_report(
            state,
            tenant_id,
            ReportRequest {
                title: Some(rtype.name.clone()),
                format: Some(rtype.default_format),
                channels: run.channels.clone(),
                channel_templates: rtype.delivery_templates.clone(),
                channel_template_context: context,
                ..ReportRequest::default()
            },
            now,
        )
    });
    let delivery_events: Vec<ChannelEventId> = match report_outcome {
        Ok(outcome) => {
            let event_ids: Vec<ChannelEventId> =
                outcome.delivery_events.iter().map(|event| event.id.clone()).collect();
            if let Some(run) = state.analysis_run_mut(tenant_id, run_id) {
                run.artifacts.report_id = Some(outcome.report.id.clone());
            }
            finish_step(
                state,
                tenant_id,
                run_id,
                StepName::Report,
                format!("report {}", outcome.report.id),
                now,
            );
            event_ids
        }
        Err(error) => {
            fail_step(state, tenant_id, run_id, StepName::Report, &error, now);
            return Err(error);
        }
    };

    // Delivery step: done even when individual events failed; retries are an
    // explicit follow-up operation.
    begin_step(state, tenant_id, run_id, StepName::Delivery, now);
    if let Some(run) = state.analysis_run_mut(tenant_id, run_id) {
        run.artifacts.channel_event_ids.extend(delivery_events.iter().cloned());
    }
    finish_step(
        state,
        tenant_id,
        run_id,
        StepName::Delivery,
        format!("{} delivery events", delivery_events.len()),
        now,
    );

    let run = state
        .analysis_run_mut(tenant_id, run_id)
        .ok_or_else(|| CoreError::not_found("analysis run not found"))?;
    run.status = AnalysisRunStatus::Completed;
    run.updated_at = now;
    Ok(run.clone())
}

/// Runs the source step: freshness-gated sync plus the quality gate.
fn run_source_step(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    run: &AnalysisRun,
    options: &ExecuteOptions,
    adapters: &dyn RunAdapters,
    now: Timestamp,
) -> Result<String, CoreError> {
    let connection = state
        .connection(tenant_id, &run.source_connection_id)
        .ok_or_else(|| CoreError::not_found("source connection not found"))?
        .clone();
    let latest = state.latest_source_run(&connection.id).cloned();
    let needs_sync = options.force_sync || sync_is_stale(&connection, latest.as_ref(), now);
    let effective = if needs_sync {
        let period_days =
            options.period_days.unwrap_or(connection.sync_policy.backfill_days).max(1);
        Some(adapters.sync_source(
            state,
            tenant_id,
            &connection.id,
            SourceSyncOptions {
                period_days: Some(period_days),
                ..SourceSyncOptions::default()
            },
            now,
        )?)
    } else {
        latest
    };
    let Some(run_record) = effective else {
        return Err(CoreError::bad_request("no source run available"));
    };
    if connection.quality_policy.block_model_run {
        let diagnostics = &run_record.diagnostics;
        if !diagnostics.quality_passed
            || diagnostics.quality_score < connection.quality_policy.min_quality_score
        {
            return Err(CoreError::bad_request(format!(
                "quality gate failed: score {:.2} below minimum {:.2}",
                diagnostics.quality_score, connection.quality_policy.min_quality_score
            )));
        }
    }
    Ok(format!(
        "sync {} inserted {} records",
        run_record.id, run_record.diagnostics.inserted_records
    ))
}

// ============================================================================
// SECTION: Delivery
// ============================================================================

/// Re-delivers a completed run's report to the given channels.
///
/// # Errors
///
/// Returns `BadRequest` when the run has no report yet.
pub fn deliver_analysis_run(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    run_id: &AnalysisRunId,
    channels: Option<Vec<Channel>>,
    adapters: &dyn RunAdapters,
    now: Timestamp,
) -> Result<AnalysisRun, CoreError> {
    let run = state
        .analysis_run(tenant_id, run_id)
        .ok_or_else(|| CoreError::not_found("analysis run not found"))?
        .clone();
    let report_id = run
        .artifacts
        .report_id
        .clone()
        .ok_or_else(|| CoreError::bad_request("run has no report to deliver"))?;
    let report = state
        .reports
        .iter()
        .find(|report| report.id == report_id && report.tenant_id == *tenant_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("report not found"))?;
    let report_type = state
        .report_types
        .iter()
        .find(|rtype| rtype.id == run.report_type_id && rtype.tenant_id == *tenant_id)
        .cloned();
    let channels = channels.unwrap_or_else(|| run.channels.clone());
    let outcome = adapters.generate_report(
        state,
        tenant_id,
        ReportRequest {
            title: Some(report.title),
            metric_ids: report.metric_ids,
            format: Some(report.format),
            channels,
            channel_templates: report_type
                .map(|rtype| rtype.delivery_templates)
                .unwrap_or_default(),
            channel_template_context: BTreeMap::from([(
                "runId".to_string(),
                run.id.to_string(),
            )]),
            ..ReportRequest::default()
        },
        now,
    )?;
    let run = state
        .analysis_run_mut(tenant_id, run_id)
        .ok_or_else(|| CoreError::not_found("analysis run not found"))?;
    run.artifacts
        .channel_event_ids
        .extend(outcome.delivery_events.iter().map(|event| event.id.clone()));
    run.timeline.push(TimelineEntry {
        at: now,
        message: format!("re-delivered to {} channels", outcome.delivery_events.len()),
    });
    run.updated_at = now;
    Ok(run.clone())
}
