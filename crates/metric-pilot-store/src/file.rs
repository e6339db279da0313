// crates/metric-pilot-store/src/file.rs
// ============================================================================
// Module: File Snapshot Store
// Description: JSON snapshot persistence with atomic rename writes.
// Purpose: Durable single-file snapshots for single-node deployments.
// Dependencies: metric-pilot-core, serde_json
// ============================================================================

//! ## Overview
//! Snapshots serialize to JSON and land via write-to-temp-then-rename so a
//! crash mid-save never leaves a truncated snapshot. Loads treat a missing
//! file as first boot and fail closed on unreadable or unparsable content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use metric_pilot_core::SnapshotStore;
use metric_pilot_core::StateSnapshot;
use metric_pilot_core::StoreError;

// ============================================================================
// SECTION: File Store
// ============================================================================

/// JSON file snapshot store.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    /// Snapshot file path.
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Creates a store writing to the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the temp path used for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let mut path = self.path.clone();
        let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        path.set_file_name(name);
        path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn init(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| StoreError::Init(err.to_string()))?;
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<StateSnapshot>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Load(err.to_string())),
        };
        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|err| StoreError::Load(format!("snapshot parse failure: {err}")))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|err| StoreError::Save(format!("snapshot serialize failure: {err}")))?;
        let temp = self.temp_path();
        fs::write(&temp, &bytes).map_err(|err| StoreError::Save(err.to_string()))?;
        fs::rename(&temp, &self.path).map_err(|err| StoreError::Save(err.to_string()))?;
        Ok(())
    }
}
