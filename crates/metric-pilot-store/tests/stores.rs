// crates/metric-pilot-store/tests/stores.rs
// ============================================================================
// Module: Snapshot Store Tests
// Description: Round-trip tests for the file and SQLite snapshot stores.
// Purpose: Validate durable save/load equality and first-boot behavior.
// ============================================================================
//! ## Overview
//! Both durable backends must return `None` on first boot, round-trip a
//! mutated snapshot observationally intact, and overwrite rather than
//! accumulate on repeated saves.

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

use std::sync::Arc;

use metric_pilot_core::CreateConnectionRequest;
use metric_pilot_core::CreateTenantRequest;
use metric_pilot_core::Engine;
use metric_pilot_core::NoopObservabilitySink;
use metric_pilot_core::PlatformState;
use metric_pilot_core::Role;
use metric_pilot_core::SnapshotStore;
use metric_pilot_core::SourceSyncOptions;
use metric_pilot_core::StateSnapshot;
use metric_pilot_core::Timestamp;
use metric_pilot_store::FileSnapshotStore;
use metric_pilot_store::SqliteSnapshotStore;
use serde_json::json;

fn now() -> Timestamp {
    Timestamp::from_unix_millis(1_753_920_000_000)
}

/// Populates an engine over the given store and returns the tenant count.
fn populate(store: Arc<dyn SnapshotStore>) -> usize {
    let engine = Engine::boot(store, Arc::new(NoopObservabilitySink)).unwrap();
    let tenant = engine
        .create_tenant(
            CreateTenantRequest {
                name: "acme".to_string(),
                ..CreateTenantRequest::default()
            },
            now(),
        )
        .unwrap();
    let ctx = metric_pilot_core::AuthContext {
        tenant_id: tenant.id,
        user_id: "user-1".to_string(),
        role: Role::Owner,
        channel: "api".to_string(),
    };
    let connection = engine
        .create_connection(
            &ctx,
            CreateConnectionRequest {
                source_type: "google_ads".to_string(),
                auth: Some(json!({"token": "t"})),
                ..CreateConnectionRequest::default()
            },
            now(),
        )
        .unwrap();
    engine
        .sync_connection(
            &ctx,
            &connection.id,
            SourceSyncOptions {
                period_days: Some(7),
                ..SourceSyncOptions::default()
            },
            now(),
        )
        .unwrap();
    engine.list_tenants().unwrap().len()
}

/// Verifies the file store round-trips engine state across boots.
#[test]
fn file_store_round_trips_across_boots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let store = Arc::new(FileSnapshotStore::new(&path));
    store.init().unwrap();
    assert!(store.load().unwrap().is_none());

    let created = populate(store.clone());
    assert_eq!(created, 1);
    assert!(path.exists());

    let rebooted = Engine::boot(store, Arc::new(NoopObservabilitySink)).unwrap();
    let tenants = rebooted.list_tenants().unwrap();
    assert_eq!(tenants.len(), 1);
    let facts = rebooted.with_state(|state| state.facts.len()).unwrap();
    assert!(facts > 0);
}

/// Verifies file saves land atomically: no temp file survives a save.
#[test]
fn file_store_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let store = FileSnapshotStore::new(&path);
    store.init().unwrap();
    store.save(&StateSnapshot::capture(&PlatformState::default())).unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("snapshot.json.tmp").exists());
}

/// Verifies a corrupted snapshot file fails closed on load.
#[test]
fn file_store_fails_closed_on_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, b"{ not json").unwrap();
    let store = FileSnapshotStore::new(&path);
    assert!(store.load().is_err());
}

/// Verifies the SQLite store round-trips engine state across boots.
#[test]
fn sqlite_store_round_trips_across_boots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pilot.db");
    let store = Arc::new(SqliteSnapshotStore::open(&path).unwrap());
    store.init().unwrap();
    assert!(store.load().unwrap().is_none());

    populate(store.clone());

    let rebooted = Engine::boot(store, Arc::new(NoopObservabilitySink)).unwrap();
    assert_eq!(rebooted.list_tenants().unwrap().len(), 1);
}

/// Verifies repeated saves keep a single row.
#[test]
fn sqlite_store_upserts_single_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteSnapshotStore::open(dir.path().join("pilot.db")).unwrap();
    store.init().unwrap();
    let empty = StateSnapshot::capture(&PlatformState::default());
    store.save(&empty).unwrap();
    store.save(&empty).unwrap();
    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.version, empty.version);
}
