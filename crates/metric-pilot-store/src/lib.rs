// crates/metric-pilot-store/src/lib.rs
// ============================================================================
// Module: Metric Pilot Store Library
// Description: Snapshot persistence backends for the control plane.
// Purpose: Provide file and SQLite implementations of the snapshot port.
// Dependencies: metric-pilot-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Two durable implementations of the core snapshot port: a JSON file store
//! with atomic rename writes and a SQLite single-row store. Both are
//! whole-snapshot overwrite backends; neither requires transactions beyond a
//! single statement.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod file;
pub mod sqlite;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use file::FileSnapshotStore;
pub use sqlite::SqliteSnapshotStore;
