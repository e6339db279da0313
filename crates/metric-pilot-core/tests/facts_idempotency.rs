// crates/metric-pilot-core/tests/facts_idempotency.rs
// ============================================================================
// Module: Fact Idempotency Tests
// Description: Tests for the canonical fact idempotency tuple.
// Purpose: Validate repeated syncs insert once and no-op thereafter.
// ============================================================================
//! ## Overview
//! The tuple `(tenant, date, domain, metric, source)` is unique: the first
//! sync over a period inserts facts, and any repeat over the same period
//! inserts zero.

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
use metric_pilot_core::SourceSyncOptions;

/// Verifies the first sync inserts and the repeat is a no-op.
#[test]
fn repeat_sync_inserts_nothing() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let (connection, first) = synced_connection(&engine, &ctx, "google_ads", 10);
    assert!(first.diagnostics.inserted_records > 0);
    assert_eq!(first.diagnostics.inserted_records, first.diagnostics.generated_records);

    let second = engine
        .sync_connection(
            &ctx,
            &connection.id,
            SourceSyncOptions {
                period_days: Some(10),
                ..SourceSyncOptions::default()
            },
            base_now(),
        )
        .unwrap();
    assert_eq!(second.diagnostics.inserted_records, 0);
    assert_eq!(second.diagnostics.generated_records, first.diagnostics.generated_records);
}

/// Verifies a longer repeat period only inserts the new days.
#[test]
fn extended_period_inserts_only_new_days() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let (connection, first) = synced_connection(&engine, &ctx, "google_ads", 5);
    let per_day = first.diagnostics.generated_records / 5;

    let extended = engine
        .sync_connection(
            &ctx,
            &connection.id,
            SourceSyncOptions {
                period_days: Some(8),
                ..SourceSyncOptions::default()
            },
            base_now(),
        )
        .unwrap();
    assert_eq!(extended.diagnostics.inserted_records, 3 * per_day);
}

/// Verifies distinct sources never collide on the tuple.
#[test]
fn distinct_sources_do_not_collide() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let (_, ads) = synced_connection(&engine, &ctx, "google_ads", 5);
    let (_, social) = synced_connection(&engine, &ctx, "facebook_ads", 5);
    assert!(ads.diagnostics.inserted_records > 0);
    assert!(social.diagnostics.inserted_records > 0);
}

/// Verifies the sync checkpoint lands on the latest generated date.
#[test]
fn checkpoint_tracks_latest_date() {
    let engine = engine();
    let tenant = create_tenant(&engine, "acme");
    let ctx = owner_ctx(&tenant);

    let (_, run) = synced_connection(&engine, &ctx, "google_ads", 10);
    assert_eq!(run.checkpoint.unwrap(), base_now().to_date());
}
