// crates/metric-pilot-core/tests/scheduler.rs
// ============================================================================
// Module: Scheduler Tests
// Description: Tests for exactly-once periodic schedule dispatch.
// Purpose: Validate tick consumption, interval clamping, and drift behavior.
// ============================================================================
//! ## Overview
//! The consumed-tick set is the authoritative gate: a `(schedule,
//! next_run_at)` pair fires once even under overlapping tickers, intervals
//! clamp to `[5, 1440]` minutes, and `next_run_at` advances from the current
//! time so drift accumulates by design.

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
use metric_pilot_core::CoreAdapters;
use metric_pilot_core::CreateScheduleRequest;
use metric_pilot_core::CreateTenantRequest;
use metric_pilot_core::PlatformState;
use metric_pilot_core::runtime::scheduler::run_scheduler_tick;
use metric_pilot_core::runtime::tenants::create_tenant as create_tenant_in_state;

fn schedule_request(interval_minutes: i64) -> CreateScheduleRequest {
    CreateScheduleRequest {
        name: "hourly digest".to_string(),
        metric_ids: vec!["revenue".to_string()],
        channels: vec![Channel::Email],
        format: None,
        interval_minutes,
    }
}

/// Verifies intervals clamp to the supported range.
#[test]
fn intervals_are_clamped() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let low = engine
        .create_report_schedule(&ctx, schedule_request(1), base_now())
        .unwrap();
    assert_eq!(low.interval_minutes, 5);
    let high = engine
        .create_report_schedule(&ctx, schedule_request(10_000), base_now())
        .unwrap();
    assert_eq!(high.interval_minutes, 1_440);
    assert_eq!(low.next_run_at, base_now().plus_minutes(5));
}

/// Verifies a due schedule fires exactly once per tick key.
#[test]
fn due_schedule_fires_exactly_once() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);
    engine
        .create_report_schedule(&ctx, schedule_request(5), base_now())
        .unwrap();

    // Not yet due.
    let early = engine.scheduler_tick(base_now().plus_minutes(1)).unwrap();
    assert!(early.fired.is_empty());

    let due_at = base_now().plus_minutes(6);
    let first = engine.scheduler_tick(due_at).unwrap();
    assert_eq!(first.fired.len(), 1);
    assert!(first.failed.is_empty());

    // The schedule advanced, so the same instant no longer fires.
    let again = engine.scheduler_tick(due_at).unwrap();
    assert!(again.fired.is_empty());
    assert!(again.skipped.is_empty());

    let reports = engine.list_reports(&ctx).unwrap();
    assert_eq!(reports.len(), 1);
}

/// Verifies overlapping tickers on one due instant consume a single fire.
#[test]
fn overlapping_ticks_consume_one_fire() {
    let mut state = PlatformState::default();
    let tenant = create_tenant_in_state(
        &mut state,
        CreateTenantRequest {
            name: "acme".to_string(),
            ..CreateTenantRequest::default()
        },
        base_now(),
    )
    .unwrap();
    let schedule = metric_pilot_core::runtime::scheduler::create_schedule(
        &mut state,
        &tenant.id,
        schedule_request(5),
        base_now(),
    )
    .unwrap();

    // Simulate a restarted ticker replaying the same due instant: pre-consume
    // the tick key, then run the tick.
    let key = format!("{}|{}", schedule.id, schedule.next_run_at.as_unix_millis());
    state.consumed_ticks.insert(key);
    let outcome = run_scheduler_tick(&mut state, &CoreAdapters, base_now().plus_minutes(6));
    assert_eq!(outcome.skipped, vec![schedule.id]);
    assert!(outcome.fired.is_empty());
    assert!(state.reports.is_empty());
}

/// Verifies the schedule advances even when the callback fails.
#[test]
fn failing_callback_still_advances() {
    let mut state = PlatformState::default();
    let tenant = create_tenant_in_state(
        &mut state,
        CreateTenantRequest {
            name: "acme".to_string(),
            ..CreateTenantRequest::default()
        },
        base_now(),
    )
    .unwrap();
    let schedule = metric_pilot_core::runtime::scheduler::create_schedule(
        &mut state,
        &tenant.id,
        schedule_request(5),
        base_now(),
    )
    .unwrap();
    // Remove the tenant so report generation fails inside the callback.
    state.tenants.remove(&tenant.id);

    let now = base_now().plus_minutes(6);
    let outcome = run_scheduler_tick(&mut state, &CoreAdapters, now);
    assert_eq!(outcome.failed, vec![schedule.id.clone()]);
    let stored = state
        .report_schedules
        .iter()
        .find(|stored| stored.id == schedule.id)
        .unwrap();
    assert_eq!(stored.last_run_at, Some(schedule.next_run_at));
    assert_eq!(stored.next_run_at, now.plus_minutes(5));
}

/// Verifies drift accumulates: the next fire anchors on the tick time.
#[test]
fn next_fire_anchors_on_tick_time() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);
    synced_connection(&engine, &ctx, "google_ads", 14);
    let schedule = engine
        .create_report_schedule(&ctx, schedule_request(5), base_now())
        .unwrap();

    // The ticker runs three minutes late.
    let late_tick = schedule.next_run_at.plus_minutes(3);
    engine.scheduler_tick(late_tick).unwrap();
    let stored = engine
        .with_state(|state| {
            state
                .report_schedules
                .iter()
                .find(|stored| stored.id == schedule.id)
                .cloned()
        })
        .unwrap()
        .unwrap();
    assert_eq!(stored.next_run_at, late_tick.plus_minutes(5));
}
