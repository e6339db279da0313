// crates/metric-pilot-rest/src/server.rs
// ============================================================================
// Module: REST Server
// Description: Engine bootstrap, router assembly, scheduler driver, serving.
// Purpose: Wire configuration, stores, and the scheduler into one process.
// Dependencies: axum, tokio, metric-pilot-{core, config, store}
// ============================================================================

//! ## Overview
//! Boot order: build the snapshot store from configuration, hydrate the
//! engine, optionally seed the demo tenant, spawn the scheduler ticker
//! (roughly every four seconds; the consumed-tick set makes overlap safe),
//! then serve the router. The scheduler is a driver only; all firing logic
//! lives in the core.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use metric_pilot_config::ServerConfig;
use metric_pilot_config::SnapshotStoreKind;
use metric_pilot_core::CoreError;
use metric_pilot_core::Engine;
use metric_pilot_core::MemorySnapshotStore;
use metric_pilot_core::SnapshotStore;
use metric_pilot_store::FileSnapshotStore;
use metric_pilot_store::SqliteSnapshotStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::api::now;
use crate::routes;
use crate::seed::seed_demo_tenant;
use crate::sink::StderrObservabilitySink;

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared state handed to every route handler.
pub struct AppState {
    /// The control plane engine.
    pub engine: Engine,
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Builds the snapshot store selected by configuration.
///
/// # Errors
///
/// Returns [`CoreError`] when the store cannot be opened.
fn build_store(config: &ServerConfig) -> Result<Arc<dyn SnapshotStore>, CoreError> {
    Ok(match &config.snapshot_store {
        SnapshotStoreKind::Memory => Arc::new(MemorySnapshotStore::new()),
        SnapshotStoreKind::File {
            path,
        } => Arc::new(FileSnapshotStore::new(path)),
        SnapshotStoreKind::Sqlite {
            path,
        } => Arc::new(
            SqliteSnapshotStore::open(path).map_err(|err| CoreError::internal(err.to_string()))?,
        ),
    })
}

/// Boots the engine from configuration, seeding when requested.
///
/// # Errors
///
/// Returns [`CoreError`] when the store or engine fails to initialize.
pub fn build_engine(config: &ServerConfig) -> Result<Engine, CoreError> {
    let store = build_store(config)?;
    let engine = Engine::boot(store, Arc::new(StderrObservabilitySink))?;
    if config.seed_demo_tenant {
        seed_demo_tenant(&engine)?;
    }
    Ok(engine)
}

/// Builds the router over an engine.
#[must_use]
pub fn build_router(engine: Engine) -> Router {
    routes::router(Arc::new(AppState {
        engine,
    }))
}

// ============================================================================
// SECTION: Scheduler Driver
// ============================================================================

/// Scheduler tick cadence.
const SCHEDULER_TICK: Duration = Duration::from_secs(4);

/// Spawns the scheduler ticker over the shared state.
///
/// Tick failures are swallowed; the core records outcomes and the
/// consumed-tick set guarantees exactly-once firing even when this task
/// restarts.
pub fn spawn_scheduler(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SCHEDULER_TICK);
        loop {
            interval.tick().await;
            let _ = state.engine.scheduler_tick(now());
        }
    })
}

// ============================================================================
// SECTION: Serving
// ============================================================================

/// Boots everything and serves until the process is stopped.
///
/// # Errors
///
/// Returns [`CoreError`] when boot or binding fails.
pub async fn serve(config: ServerConfig) -> Result<(), CoreError> {
    let engine = build_engine(&config)?;
    let state = Arc::new(AppState {
        engine,
    });
    let scheduler = spawn_scheduler(Arc::clone(&state));
    let router = routes::router(state);
    let listener = TcpListener::bind(config.bind_address())
        .await
        .map_err(|err| CoreError::internal(format!("bind failure: {err}")))?;
    let result = axum::serve(listener, router)
        .await
        .map_err(|err| CoreError::internal(format!("server failure: {err}")));
    scheduler.abort();
    result
}
