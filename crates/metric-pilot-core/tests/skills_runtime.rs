// crates/metric-pilot-core/tests/skills_runtime.rs
// ============================================================================
// Module: Skill Runtime Tests
// Description: Tests for manifest validation, signatures, guardrails, dispatch.
// Purpose: Validate fail-closed skill execution and trigger routing.
// ============================================================================
//! ## Overview
//! Covers manifest validation, the signature-before-execution property
//! (tampered manifests are rejected before any tool runs), the ordered
//! guardrail list, trigger-scored routing, deterministic tool packs, and the
//! single-active-install invariant.

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
use metric_pilot_core::CheckStatus;
use metric_pilot_core::CoreAdapters;
use metric_pilot_core::ErrorKind;
use metric_pilot_core::PlatformState;
use metric_pilot_core::SkillManifest;
use metric_pilot_core::SkillPrecedence;
use metric_pilot_core::SkillRunRequest;
use metric_pilot_core::SkillRunStatus;
use metric_pilot_core::Tenant;
use metric_pilot_core::core::skill::SkillGuardrails;
use metric_pilot_core::core::skill::SkillPrompts;
use metric_pilot_core::core::skill::SkillRiskLevel;
use metric_pilot_core::core::skill::SkillTool;
use metric_pilot_core::core::skill::SkillTriggers;
use metric_pilot_core::core::skill::ensure_valid_manifest;
use metric_pilot_core::core::skill::validate_manifest;
use metric_pilot_core::runtime::skills::install_skill;
use metric_pilot_core::runtime::skills::run_skill_pack;
use metric_pilot_core::runtime::skills::set_skill_active;
use metric_pilot_core::runtime::sources::create_connection;
use metric_pilot_core::runtime::sources::run_source_sync;
use metric_pilot_core::runtime::tenants::create_tenant;
use metric_pilot_core::CreateConnectionRequest;
use metric_pilot_core::CreateTenantRequest;
use metric_pilot_core::SourceSyncOptions;
use serde_json::json;

fn manifest(id: &str, version: &str) -> SkillManifest {
    SkillManifest {
        id: id.to_string(),
        version: version.to_string(),
        name: "Test Skill".to_string(),
        description: "A test skill.".to_string(),
        triggers: SkillTriggers {
            intents: vec!["finance".to_string(), "cash".to_string()],
            channels: vec!["slack".to_string()],
        },
        tools: vec![
            SkillTool {
                id: "compute.finance_snapshot".to_string(),
                allow: true,
            },
            SkillTool {
                id: "model.run".to_string(),
                allow: true,
            },
        ],
        guardrails: SkillGuardrails::default(),
        prompts: SkillPrompts {
            system: "Summarize cash health.".to_string(),
        },
        schedules: Vec::new(),
        risk_level: SkillRiskLevel::Low,
    }
}

fn seeded_state() -> (PlatformState, Tenant) {
    let mut state = PlatformState::default();
    let tenant = create_tenant(
        &mut state,
        CreateTenantRequest {
            name: "acme".to_string(),
            ..CreateTenantRequest::default()
        },
        base_now(),
    )
    .unwrap();
    let connection = create_connection(
        &mut state,
        &tenant.id,
        CreateConnectionRequest {
            source_type: "quickbooks".to_string(),
            auth: Some(json!({"token": "t"})),
            ..CreateConnectionRequest::default()
        },
        base_now(),
    )
    .unwrap();
    run_source_sync(
        &mut state,
        &tenant.id,
        &connection.id,
        SourceSyncOptions {
            period_days: Some(30),
            ..SourceSyncOptions::default()
        },
        base_now(),
    )
    .unwrap();
    (state, tenant)
}

/// Verifies manifest validation rejects malformed ids and versions.
#[test]
fn manifest_validation_rejects_bad_shapes() {
    assert!(ensure_valid_manifest(&manifest("finance-health", "1.0.0")).is_ok());
    assert!(ensure_valid_manifest(&manifest("X", "1.0.0")).is_err());
    assert!(ensure_valid_manifest(&manifest("ok-id", "1.0")).is_err());
    assert!(ensure_valid_manifest(&manifest("ok-id", "1.0.0.0")).is_err());
    assert!(ensure_valid_manifest(&manifest("ok-id", "1.0.0-beta.1")).is_ok());

    let mut no_intents = manifest("ok-id", "1.0.0");
    no_intents.triggers.intents.clear();
    let checks = validate_manifest(&no_intents);
    assert!(checks
        .iter()
        .any(|check| check.name == "trigger_intents" && check.status == CheckStatus::Fail));

    let mut unknown_tool = manifest("ok-id", "1.0.0");
    unknown_tool.tools.push(SkillTool {
        id: "shell.exec".to_string(),
        allow: true,
    });
    assert!(ensure_valid_manifest(&unknown_tool).is_err());

    let mut custom_tool = manifest("ok-id", "1.0.0");
    custom_tool.tools.push(SkillTool {
        id: "custom.internal".to_string(),
        allow: true,
    });
    assert!(ensure_valid_manifest(&custom_tool).is_ok());
}

/// Verifies a tampered stored manifest fails before any tool executes.
#[test]
fn tampered_manifest_is_rejected_before_execution() {
    let (mut state, tenant) = seeded_state();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.0.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();

    // Out-of-band mutation: the stored manifest drifts from its signature.
    state.skills[0].manifest.guardrails.budget_cap_usd = 999_999.0;

    let model_runs_before = state.model_runs.len();
    let error = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            skill_id: Some("finance-health".to_string()),
            intent: "finance check".to_string(),
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::Forbidden);
    assert!(error.message.contains("signature"));
    assert_eq!(state.model_runs.len(), model_runs_before);
    assert!(state.skill_runs.is_empty());
}

/// Verifies the tenant kill switch blocks execution via guardrails.
#[test]
fn tenant_kill_switch_blocks_run() {
    let (mut state, tenant) = seeded_state();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.0.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();
    state
        .tenant_mut(&tenant.id)
        .unwrap()
        .autonomy_policy
        .kill_switch = true;

    let error = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            skill_id: Some("finance-health".to_string()),
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::Forbidden);
    assert!(!error.checks.is_empty());
}

/// Verifies requesting a tool outside the allowlist is forbidden.
#[test]
fn disallowed_tool_request_is_forbidden() {
    let (mut state, tenant) = seeded_state();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.0.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();

    let error = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            skill_id: Some("finance-health".to_string()),
            requested_tools: vec!["reports.generate".to_string()],
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::Forbidden);
}

/// Verifies a token budget overrun is a bad request with the check trace.
#[test]
fn token_budget_overrun_is_rejected() {
    let (mut state, tenant) = seeded_state();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.0.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();

    let error = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            skill_id: Some("finance-health".to_string()),
            estimated_tokens: Some(1_000_000),
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::BadRequest);
    assert!(error
        .checks
        .iter()
        .any(|check| check.name == "token_budget" && check.status == CheckStatus::Fail));
}

/// Verifies intent scoring routes to the best-matching skill.
#[test]
fn routing_scores_intents_and_channels() {
    let (mut state, tenant) = seeded_state();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.0.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();
    let mut other = manifest("deal-desk", "1.0.0");
    other.triggers.intents = vec!["pipeline".to_string()];
    install_skill(&mut state, &tenant.id, other, SkillPrecedence::Local, base_now()).unwrap();

    let run = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            intent: "how is our cash doing".to_string(),
            channel: Some("slack".to_string()),
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap();
    assert_eq!(run.base_id, "finance-health");
    assert!(run.trace.routing.starts_with("scored:"));
}

/// Verifies an unmatched request is not found.
#[test]
fn unmatched_request_is_not_found() {
    let (mut state, tenant) = seeded_state();
    let error = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            intent: "nothing matches this".to_string(),
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::NotFound);
}

/// Verifies deterministic tools run and land in artifacts.
#[test]
fn deterministic_tools_produce_kpi_packs() {
    let (mut state, tenant) = seeded_state();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.0.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();

    let run = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            skill_id: Some("finance-health".to_string()),
            intent: "finance".to_string(),
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap();
    let pack = run
        .artifacts
        .deterministic_outputs
        .get("compute.finance_snapshot")
        .unwrap();
    assert!(pack.get("cash_in_30d").and_then(serde_json::Value::as_f64).unwrap() > 0.0);
    assert!(pack.get("runway_days").is_some());
    assert_eq!(run.trace.tools.deterministic_executed, vec!["compute.finance_snapshot"]);
    assert!(run.artifacts.model.is_some());
}

/// Verifies a confidence shortfall downgrades the run with a warning.
#[test]
fn low_confidence_downgrades_run() {
    let (mut state, tenant) = seeded_state();
    let mut strict = manifest("finance-health", "1.0.0");
    strict.guardrails.confidence_min = 0.99;
    install_skill(&mut state, &tenant.id, strict, SkillPrecedence::Local, base_now()).unwrap();

    let run = run_skill_pack(
        &mut state,
        &tenant.id,
        &SkillRunRequest {
            skill_id: Some("finance-health".to_string()),
            intent: "finance".to_string(),
            ..SkillRunRequest::default()
        },
        &CoreAdapters,
        base_now(),
    )
    .unwrap();
    assert_eq!(run.status, SkillRunStatus::CompletedWithWarning);
    assert!(run
        .reasoning_hints
        .iter()
        .any(|hint| hint == "confidence_below_skill_threshold"));
}

/// Verifies installing a newer version deactivates the older install.
#[test]
fn newer_install_deactivates_older() {
    let (mut state, tenant) = seeded_state();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.0.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();
    install_skill(
        &mut state,
        &tenant.id,
        manifest("finance-health", "1.1.0"),
        SkillPrecedence::Local,
        base_now(),
    )
    .unwrap();

    let active: Vec<&str> = state
        .skills
        .iter()
        .filter(|skill| skill.active)
        .map(|skill| skill.id.as_str())
        .collect();
    assert_eq!(active, vec!["finance-health@1.1.0"]);

    // Reactivating the old version flips the active install back.
    set_skill_active(&mut state, &tenant.id, "finance-health@1.0.0", true).unwrap();
    let active: Vec<&str> = state
        .skills
        .iter()
        .filter(|skill| skill.active)
        .map(|skill| skill.id.as_str())
        .collect();
    assert_eq!(active, vec!["finance-health@1.0.0"]);
}
