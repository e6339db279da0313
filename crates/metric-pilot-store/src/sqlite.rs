// crates/metric-pilot-store/src/sqlite.rs
// ============================================================================
// Module: SQLite Snapshot Store
// Description: Snapshot persistence in a SQLite single-row table.
// Purpose: Durable snapshots for deployments with an external database path.
// Dependencies: metric-pilot-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! The store keeps exactly one row: the latest snapshot JSON plus its format
//! version, upserted on every save. WAL journaling and a busy timeout keep
//! concurrent single-node access safe. Loads fail closed on unparsable rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;

use metric_pilot_core::SnapshotStore;
use metric_pilot_core::StateSnapshot;
use metric_pilot_core::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Fixed key for the single snapshot row.
const SNAPSHOT_KEY: &str = "platform_state";

// ============================================================================
// SECTION: SQLite Store
// ============================================================================

/// SQLite single-row snapshot store.
pub struct SqliteSnapshotStore {
    /// Open connection behind a mutex; saves are serialized anyway.
    connection: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Opens (or creates) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Init`] when the database cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let connection =
            Connection::open(path.into()).map_err(|err| StoreError::Init(err.to_string()))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|err| StoreError::Init(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", "wal")
            .map_err(|err| StoreError::Init(err.to_string()))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn init(&self) -> Result<(), StoreError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::Init("connection mutex poisoned".to_string()))?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS snapshots (
                    key TEXT PRIMARY KEY,
                    version INTEGER NOT NULL,
                    payload TEXT NOT NULL,
                    saved_at INTEGER NOT NULL DEFAULT (unixepoch())
                )",
                [],
            )
            .map_err(|err| StoreError::Init(err.to_string()))?;
        Ok(())
    }

    fn load(&self) -> Result<Option<StateSnapshot>, StoreError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::Load("connection mutex poisoned".to_string()))?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM snapshots WHERE key = ?1",
                params![SNAPSHOT_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Load(err.to_string()))?;
        match payload {
            Some(payload) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|err| StoreError::Load(format!("snapshot parse failure: {err}"))),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|err| StoreError::Save(format!("snapshot serialize failure: {err}")))?;
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::Save("connection mutex poisoned".to_string()))?;
        connection
            .execute(
                "INSERT INTO snapshots (key, version, payload, saved_at)
                 VALUES (?1, ?2, ?3, unixepoch())
                 ON CONFLICT(key) DO UPDATE SET
                     version = excluded.version,
                     payload = excluded.payload,
                     saved_at = excluded.saved_at",
                params![SNAPSHOT_KEY, snapshot.version, payload],
            )
            .map_err(|err| StoreError::Save(err.to_string()))?;
        Ok(())
    }
}
