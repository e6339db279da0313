// crates/metric-pilot-core/src/interfaces/mod.rs
// ============================================================================
// Module: Metric Pilot Interfaces
// Description: Backend-agnostic ports for persistence, observability, adapters.
// Purpose: Define the contract surfaces used by the runtime engine.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the control plane integrates with the outside world
//! without embedding backend specifics: the snapshot persistence port, the
//! process observability sink, and the adapter capability surface the skill
//! runtime and analysis orchestrator use to call back into core operations.
//! Implementations must fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::ConnectionId;
use crate::core::CoreError;
use crate::core::ModelTaskOutcome;
use crate::core::ModelTaskRequest;
use crate::core::PlatformState;
use crate::core::ReportOutcome;
use crate::core::ReportRequest;
use crate::core::SourceRun;
use crate::core::SourceSyncOptions;
use crate::core::StateSnapshot;
use crate::core::TenantId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Snapshot Store
// ============================================================================

/// Snapshot store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store initialization failed.
    #[error("store init failure: {0}")]
    Init(String),
    /// Snapshot load failed.
    #[error("store load failure: {0}")]
    Load(String),
    /// Snapshot save failed.
    #[error("store save failure: {0}")]
    Save(String),
}

/// Whole-snapshot persistence port.
///
/// The port is transaction-free: `save` overwrites the previous snapshot
/// atomically from the caller's perspective, and `load` returns the latest
/// complete snapshot or `None` on first boot.
pub trait SnapshotStore: Send + Sync {
    /// Prepares the backing medium (directories, schema).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Init`] when the medium cannot be prepared.
    fn init(&self) -> Result<(), StoreError>;

    /// Loads the latest snapshot, when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Load`] when a snapshot exists but cannot be read.
    fn load(&self) -> Result<Option<StateSnapshot>, StoreError>;

    /// Persists a snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Save`] when the snapshot cannot be written.
    fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError>;
}

/// In-memory snapshot store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    /// Latest saved snapshot.
    snapshot: std::sync::Mutex<Option<StateSnapshot>>,
}

impl MemorySnapshotStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn load(&self) -> Result<Option<StateSnapshot>, StoreError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Load("snapshot mutex poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| StoreError::Save("snapshot mutex poisoned".to_string()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Observability Sink
// ============================================================================

/// A structured observability event emitted for every mutating operation.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedMutation {
    /// Stable action label.
    pub action: String,
    /// Tenant the mutation touched, when tenant-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    /// Acting user label.
    pub actor_id: String,
    /// Mutation timestamp.
    pub at: Timestamp,
    /// Outcome label (`ok` or the error kind).
    pub outcome: String,
}

/// Process-level observability sink for mutation events.
pub trait ObservabilitySink: Send + Sync {
    /// Records a mutation event.
    fn record(&self, event: &ObservedMutation);
}

/// No-op sink for tests.
#[derive(Debug, Default)]
pub struct NoopObservabilitySink;

impl ObservabilitySink for NoopObservabilitySink {
    fn record(&self, _event: &ObservedMutation) {}
}

// ============================================================================
// SECTION: Run Adapters
// ============================================================================

/// Capability surface the skill runtime and analysis orchestrator use to
/// invoke core operations without circular module references.
///
/// Implementations receive the already-locked state; they must not attempt
/// further locking or persistence, which the engine owns.
pub trait RunAdapters {
    /// Runs a model task for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] when the task is invalid or the tenant is gone.
    fn run_model(
        &self,
        state: &mut PlatformState,
        tenant_id: &TenantId,
        request: ModelTaskRequest,
        now: Timestamp,
    ) -> Result<ModelTaskOutcome, CoreError>;

    /// Syncs a source connection for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] when the connection is unknown or ingest is
    /// unsupported.
    fn sync_source(
        &self,
        state: &mut PlatformState,
        tenant_id: &TenantId,
        connection_id: &ConnectionId,
        options: SourceSyncOptions,
        now: Timestamp,
    ) -> Result<SourceRun, CoreError>;

    /// Generates (and optionally delivers) a report for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] when the tenant is unknown or the request is
    /// invalid.
    fn generate_report(
        &self,
        state: &mut PlatformState,
        tenant_id: &TenantId,
        request: ReportRequest,
        now: Timestamp,
    ) -> Result<ReportOutcome, CoreError>;
}
