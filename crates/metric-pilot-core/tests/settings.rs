// crates/metric-pilot-core/tests/settings.rs
// ============================================================================
// Module: Settings Tests
// Description: Tests for settings patches, mirrors, profiles, report types.
// Purpose: Validate deep merges, policy write-through, and preset seeding.
// ============================================================================
//! ## Overview
//! Settings patches deep-merge; the `policies` section writes through to the
//! tenant's autonomy policy and is projected back on read; model profiles
//! seed from presets with single-active activation; report types seed with
//! default delivery templates.

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
use metric_pilot_core::Channel;
use metric_pilot_core::ErrorKind;
use metric_pilot_core::ModelProfileRequest;
use metric_pilot_core::SettingsSection;
use serde_json::json;

/// Verifies the settings view projects the tenant's autonomy policy.
#[test]
fn settings_project_autonomy_policy() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let view = engine.get_settings(&ctx, base_now()).unwrap();
    assert_eq!(view.policies, tenant.autonomy_policy);
    assert!(!view.checklist.connections_configured);
}

/// Verifies policy patches write through to the tenant.
#[test]
fn policy_patch_writes_through_to_tenant() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let view = engine
        .patch_settings(
            &ctx,
            SettingsSection::Policies,
            &json!({"confidence_threshold": 0.9, "kill_switch": true}),
            base_now(),
        )
        .unwrap();
    assert!((view.policies.confidence_threshold - 0.9).abs() < 1e-9);
    assert!(view.policies.kill_switch);
    // Untouched fields survive the merge.
    assert_eq!(view.policies.action_allowlist, tenant.autonomy_policy.action_allowlist);

    let stored = engine
        .with_state(|state| state.tenant(&ctx.tenant_id).cloned())
        .unwrap()
        .unwrap();
    assert!(stored.autonomy_policy.kill_switch);
}

/// Verifies out-of-range confidence thresholds are rejected.
#[test]
fn invalid_confidence_threshold_is_rejected() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let error = engine
        .patch_settings(
            &ctx,
            SettingsSection::Policies,
            &json!({"confidence_threshold": 1.5}),
            base_now(),
        )
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::BadRequest);
}

/// Verifies training patches mirror to the tenant flag.
#[test]
fn training_patch_mirrors_tenant_flag() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let view = engine
        .patch_settings(&ctx, SettingsSection::Training, &json!({"opt_in": true}), base_now())
        .unwrap();
    assert!(view.settings.training.opt_in);
    let stored = engine
        .with_state(|state| state.tenant(&ctx.tenant_id).cloned())
        .unwrap()
        .unwrap();
    assert!(stored.training_opt_in);
}

/// Verifies channel patches merge without clobbering siblings.
#[test]
fn channel_patch_merges_deeply() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    engine
        .patch_settings(
            &ctx,
            SettingsSection::Channels,
            &json!({"slack": {"enabled": true, "webhook_ref": "secret_hook"}}),
            base_now(),
        )
        .unwrap();
    let view = engine
        .patch_settings(
            &ctx,
            SettingsSection::Channels,
            &json!({"telegram": {"enabled": true, "bot_token_ref": "tg", "chat_id": "c"}}),
            base_now(),
        )
        .unwrap();
    assert!(view.settings.channels.slack.enabled);
    assert!(view.settings.channels.telegram.enabled);
    assert!(view.checklist.channels_configured);
}

/// Verifies model profile presets seed once and activation is single-active.
#[test]
fn profile_presets_seed_and_activate_singly() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let profiles = engine.list_model_profiles(&ctx, base_now()).unwrap();
    assert_eq!(profiles.len(), 4);
    assert_eq!(profiles.iter().filter(|profile| profile.active).count(), 1);

    // Listing again never re-seeds.
    let again = engine.list_model_profiles(&ctx, base_now()).unwrap();
    assert_eq!(again.len(), 4);

    let target = profiles[2].id.clone();
    engine.activate_model_profile(&ctx, &target, base_now()).unwrap();
    let after = engine.list_model_profiles(&ctx, base_now()).unwrap();
    let active: Vec<_> = after.iter().filter(|profile| profile.active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, target);

    let view = engine.get_settings(&ctx, base_now()).unwrap();
    assert_eq!(view.settings.model_preferences.default_profile_id, Some(target));
}

/// Verifies profile creation requires a name and patching updates fields.
#[test]
fn profile_create_and_patch() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let error = engine
        .create_model_profile(&ctx, ModelProfileRequest::default(), base_now())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::BadRequest);

    let profile = engine
        .create_model_profile(
            &ctx,
            ModelProfileRequest {
                name: Some("Cash Forecast".to_string()),
                target_metric_id: Some("cash_in".to_string()),
                ..ModelProfileRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let patched = engine
        .patch_model_profile(
            &ctx,
            &profile.id,
            ModelProfileRequest {
                horizon_days: Some(30),
                ..ModelProfileRequest::default()
            },
            base_now(),
        )
        .unwrap();
    assert_eq!(patched.horizon_days, 30);
    assert_eq!(patched.target_metric_id, "cash_in");
}

/// Verifies report type presets carry the default delivery templates.
#[test]
fn report_type_presets_carry_templates() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    let report_types = engine.list_report_types(&ctx, base_now()).unwrap();
    assert_eq!(report_types.len(), 2);
    for rtype in &report_types {
        let slack = rtype.delivery_templates.get(&Channel::Slack).unwrap();
        assert!(slack.contains("{{reportTitle}}"));
        assert!(slack.contains("confidence={{confidence}}"));
    }
}
