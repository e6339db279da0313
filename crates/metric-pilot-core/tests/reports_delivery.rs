// crates/metric-pilot-core/tests/reports_delivery.rs
// ============================================================================
// Module: Report Delivery Tests
// Description: Tests for report bodies, readiness, templates, and retries.
// Purpose: Validate bounded-retry semantics and channel readiness rules.
// ============================================================================
//! ## Overview
//! Covers the deterministic body, per-channel readiness (email always ready,
//! Slack and Telegram wired through settings), template rendering, and the
//! retry monotonicity property: attempt counts never pass the ceiling and a
//! permanently failed event stays failed.

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
use common::synced_connection;
use metric_pilot_core::Channel;
use metric_pilot_core::ChannelEventStatus;
use metric_pilot_core::ReportRequest;
use metric_pilot_core::SettingsSection;
use serde_json::json;

/// Verifies the default report covers the standard metric set.
#[test]
fn default_report_covers_standard_metrics() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);

    let outcome = engine
        .generate_report(&ctx, ReportRequest::default(), base_now())
        .unwrap();
    assert_eq!(outcome.report.metric_ids, vec!["revenue", "profit", "spend"]);
    assert!(outcome.report.body.contains("## KPI snapshot"));
    assert!(outcome.report.body.contains("- revenue: total="));
    assert!(outcome.report.body.contains("## Latest insight"));
    assert!(outcome.delivery_events.is_empty());
}

/// Verifies email delivers while unwired channels fail with reasons.
#[test]
fn readiness_drives_delivery_status() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);

    let outcome = engine
        .generate_report(
            &ctx,
            ReportRequest {
                channels: vec![Channel::Email, Channel::Slack, Channel::Telegram],
                ..ReportRequest::default()
            },
            base_now(),
        )
        .unwrap();
    assert_eq!(outcome.delivery_events.len(), 3);
    let by_channel = |channel: Channel| {
        outcome
            .delivery_events
            .iter()
            .find(|event| event.channel == channel)
            .unwrap()
    };
    assert_eq!(by_channel(Channel::Email).status, ChannelEventStatus::Delivered);
    assert_eq!(by_channel(Channel::Slack).status, ChannelEventStatus::Failed);
    assert_eq!(by_channel(Channel::Slack).last_error.as_deref(), Some("slack_disabled"));
    assert_eq!(by_channel(Channel::Telegram).status, ChannelEventStatus::Failed);
    assert_eq!(
        by_channel(Channel::Telegram).last_error.as_deref(),
        Some("telegram_disabled")
    );
}

/// Verifies the default channel templates render the context variables.
#[test]
fn templates_render_context() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);

    let outcome = engine
        .generate_report(
            &ctx,
            ReportRequest {
                title: Some("Weekly digest".to_string()),
                channels: vec![Channel::Slack],
                ..ReportRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let message = &outcome.delivery_events[0].payload.message;
    assert!(message.starts_with("[slack] Weekly digest |"));
    assert!(!message.contains("{{"));
}

/// Verifies enabling a channel lets a failed event retry to delivered.
#[test]
fn retry_after_wiring_delivers() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);

    let outcome = engine
        .generate_report(
            &ctx,
            ReportRequest {
                channels: vec![Channel::Telegram],
                ..ReportRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let event = &outcome.delivery_events[0];
    assert_eq!(event.status, ChannelEventStatus::Failed);

    engine
        .patch_settings(
            &ctx,
            SettingsSection::Channels,
            &json!({
                "telegram": {"enabled": true, "bot_token_ref": "secret_tg", "chat_id": "chat-1"}
            }),
            base_now(),
        )
        .unwrap();

    let retried = engine
        .retry_channel_event(&ctx, &event.id, false, base_now().plus_minutes(1))
        .unwrap();
    assert_eq!(retried.status, ChannelEventStatus::Delivered);
    assert!(retried.attempt_count >= 2);
    assert!(retried.last_error.is_none());
}

/// Verifies retry monotonicity: counts never pass the ceiling and a
/// permanent failure is terminal.
#[test]
fn retries_are_bounded_and_terminal() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);

    let outcome = engine
        .generate_report(
            &ctx,
            ReportRequest {
                channels: vec![Channel::Slack],
                ..ReportRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let event_id = outcome.delivery_events[0].id.clone();

    let second = engine
        .retry_channel_event(&ctx, &event_id, false, base_now())
        .unwrap();
    assert_eq!(second.status, ChannelEventStatus::Failed);
    assert_eq!(second.attempt_count, 2);

    let third = engine
        .retry_channel_event(&ctx, &event_id, false, base_now())
        .unwrap();
    assert_eq!(third.status, ChannelEventStatus::FailedPermanent);
    assert_eq!(third.attempt_count, 3);

    // Even after wiring the channel, a permanent failure never revives.
    engine
        .patch_settings(
            &ctx,
            SettingsSection::Channels,
            &json!({"slack": {"enabled": true, "webhook_ref": "secret_hook"}}),
            base_now(),
        )
        .unwrap();
    let fourth = engine
        .retry_channel_event(&ctx, &event_id, false, base_now())
        .unwrap();
    assert_eq!(fourth.status, ChannelEventStatus::FailedPermanent);
    assert_eq!(fourth.attempt_count, 3);
}

/// Verifies forced failures record the generic delivery error.
#[test]
fn forced_failure_records_generic_error() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);

    let outcome = engine
        .generate_report(
            &ctx,
            ReportRequest {
                channels: vec![Channel::Email],
                force_fail_channels: vec![Channel::Email],
                ..ReportRequest::default()
            },
            base_now(),
        )
        .unwrap();
    let event = &outcome.delivery_events[0];
    assert_eq!(event.status, ChannelEventStatus::Failed);
    assert_eq!(event.last_error.as_deref(), Some("delivery_failed"));
}
