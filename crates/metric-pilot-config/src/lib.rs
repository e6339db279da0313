// crates/metric-pilot-config/src/lib.rs
// ============================================================================
// Module: Metric Pilot Config Library
// Description: Server configuration model and environment loading.
// Purpose: Provide a validated configuration for the REST adapter and stores.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Configuration for the Metric Pilot server: bind address, snapshot store
//! selection, and demo seeding. Values come from environment variables with
//! documented defaults; validation fails closed on malformed input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::ServerConfig;
pub use config::SnapshotStoreKind;
