// crates/metric-pilot-core/tests/analysis_runs.rs
// ============================================================================
// Module: Analysis Run Tests
// Description: Tests for the five-step pipeline state machine.
// Purpose: Validate step ordering, quality gating, and failure shape.
// ============================================================================
//! ## Overview
//! Exercises the composed pipeline: a successful execute walks every step to
//! done in order with artifacts attached; a blocking quality gate fails the
//! source step, leaves exactly one step in error, and marks the run failed.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use common::base_now;
use common::create_tenant;
use common::engine;
use common::owner_ctx;
use metric_pilot_core::AnalysisRunStatus;
use metric_pilot_core::AuthContext;
use metric_pilot_core::Channel;
use metric_pilot_core::CreateAnalysisRunRequest;
use metric_pilot_core::CreateConnectionRequest;
use metric_pilot_core::Engine;
use metric_pilot_core::ErrorKind;
use metric_pilot_core::ExecuteOptions;
use metric_pilot_core::QualityPolicy;
use metric_pilot_core::StepStatus;
use metric_pilot_core::core::analysis::StepName;
use serde_json::json;

/// Seeds profiles and report types, returning the first of each.
fn seeded_refs(
    engine: &Engine,
    ctx: &AuthContext,
) -> (metric_pilot_core::ModelProfileId, metric_pilot_core::ReportTypeId) {
    let profiles = engine.list_model_profiles(ctx, base_now()).unwrap();
    let report_types = engine.list_report_types(ctx, base_now()).unwrap();
    (profiles[0].id.clone(), report_types[0].id.clone())
}

/// Verifies a successful execute walks every step to done in order.
#[test]
fn successful_execute_completes_every_step() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let connection = engine
        .create_connection(
            &ctx,
            CreateConnectionRequest {
                source_type: "google_ads".to_string(),
                auth: Some(json!({"token": "t"})),
                ..CreateConnectionRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let (profile_id, report_type_id) = seeded_refs(&engine, &ctx);

    let run = engine
        .create_analysis_run(
            &ctx,
            CreateAnalysisRunRequest {
                source_connection_id: connection.id.clone(),
                model_profile_id: profile_id,
                report_type_id,
                skill_id: None,
                channels: vec![Channel::Email],
            },
            base_now(),
        )
        .unwrap();
    assert_eq!(run.status, AnalysisRunStatus::Draft);
    assert!(run.steps.iter().all(|step| step.status == StepStatus::Pending));

    let executed = engine
        .execute_analysis_run(
            &ctx,
            &run.id,
            &ExecuteOptions {
                force_sync: true,
                period_days: Some(30),
            },
            base_now(),
        )
        .unwrap();
    assert_eq!(executed.status, AnalysisRunStatus::Completed);
    assert!(executed.steps.iter().all(|step| step.status == StepStatus::Done));
    assert!(executed.artifacts.insight_id.is_some());
    assert!(executed.artifacts.report_id.is_some());
    assert_eq!(executed.artifacts.channel_event_ids.len(), 1);
    assert!(executed.timeline.len() > 10);
}

/// Verifies a blocking quality gate fails the source step and the run.
#[test]
fn quality_gate_blocks_execution() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let connection = engine
        .create_connection(
            &ctx,
            CreateConnectionRequest {
                source_type: "google_ads".to_string(),
                auth: Some(json!({"token": "t"})),
                quality_policy: Some(QualityPolicy {
                    min_quality_score: 1.0,
                    block_model_run: true,
                }),
                ..CreateConnectionRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let (profile_id, report_type_id) = seeded_refs(&engine, &ctx);
    let run = engine
        .create_analysis_run(
            &ctx,
            CreateAnalysisRunRequest {
                source_connection_id: connection.id,
                model_profile_id: profile_id,
                report_type_id,
                skill_id: None,
                channels: vec![Channel::Email],
            },
            base_now(),
        )
        .unwrap();

    let error = engine
        .execute_analysis_run(
            &ctx,
            &run.id,
            &ExecuteOptions {
                force_sync: true,
                period_days: None,
            },
            base_now(),
        )
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::BadRequest);
    assert!(error.message.contains("quality gate failed"));

    let stored = engine.get_analysis_run(&ctx, &run.id).unwrap();
    assert_eq!(stored.status, AnalysisRunStatus::Failed);
    let errored: Vec<_> = stored
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Error)
        .collect();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].name, StepName::Source);
    assert!(errored[0].detail.as_deref().unwrap().contains("quality gate failed"));
    // Later steps never started.
    assert!(stored
        .steps
        .iter()
        .filter(|step| step.name != StepName::Source)
        .all(|step| step.status == StepStatus::Pending));
}

/// Verifies a fresh source run is reused instead of re-syncing.
#[test]
fn fresh_sync_is_reused() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let connection = engine
        .create_connection(
            &ctx,
            CreateConnectionRequest {
                source_type: "google_ads".to_string(),
                auth: Some(json!({"token": "t"})),
                ..CreateConnectionRequest::default()
            },
            base_now(),
        )
        .unwrap();
    engine
        .sync_connection(
            &ctx,
            &connection.id,
            metric_pilot_core::SourceSyncOptions {
                period_days: Some(30),
                ..metric_pilot_core::SourceSyncOptions::default()
            },
            base_now(),
        )
        .unwrap();
    let runs_before = engine
        .list_connection_runs(&ctx, &connection.id)
        .unwrap()
        .len();

    let (profile_id, report_type_id) = seeded_refs(&engine, &ctx);
    let run = engine
        .create_analysis_run(
            &ctx,
            CreateAnalysisRunRequest {
                source_connection_id: connection.id.clone(),
                model_profile_id: profile_id,
                report_type_id,
                skill_id: None,
                channels: vec![Channel::Email],
            },
            base_now(),
        )
        .unwrap();
    engine
        .execute_analysis_run(&ctx, &run.id, &ExecuteOptions::default(), base_now())
        .unwrap();
    let runs_after = engine
        .list_connection_runs(&ctx, &connection.id)
        .unwrap()
        .len();
    assert_eq!(runs_after, runs_before);
}

/// Verifies deliver requires a report and appends new delivery events.
#[test]
fn deliver_appends_channel_events() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let connection = engine
        .create_connection(
            &ctx,
            CreateConnectionRequest {
                source_type: "google_ads".to_string(),
                auth: Some(json!({"token": "t"})),
                ..CreateConnectionRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let (profile_id, report_type_id) = seeded_refs(&engine, &ctx);
    let run = engine
        .create_analysis_run(
            &ctx,
            CreateAnalysisRunRequest {
                source_connection_id: connection.id,
                model_profile_id: profile_id,
                report_type_id,
                skill_id: None,
                channels: vec![Channel::Email],
            },
            base_now(),
        )
        .unwrap();

    // Delivering before execution is rejected: no report exists yet.
    let error = engine
        .deliver_analysis_run(&ctx, &run.id, None, base_now())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::BadRequest);

    engine
        .execute_analysis_run(
            &ctx,
            &run.id,
            &ExecuteOptions {
                force_sync: true,
                period_days: Some(20),
            },
            base_now(),
        )
        .unwrap();
    let delivered = engine
        .deliver_analysis_run(&ctx, &run.id, Some(vec![Channel::Email]), base_now())
        .unwrap();
    assert_eq!(delivered.artifacts.channel_event_ids.len(), 2);
}
