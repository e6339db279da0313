// crates/metric-pilot-config/src/config.rs
// ============================================================================
// Module: Metric Pilot Server Configuration
// Description: Environment-driven configuration with validation.
// Purpose: Resolve bind address, snapshot store, and seeding behavior.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The server reads its configuration from the environment:
//!
//! - `HOST` (default `127.0.0.1`) and `PORT` (default `8787`)
//! - `DATABASE_URL`: when set, snapshots persist to SQLite at that path
//! - `STATE_SNAPSHOT_PATH` (default `./.runtime/state-snapshot.json`): JSON
//!   file snapshots when no database is configured
//! - `SEED_DEMO_TENANT` (`true`/`1`): seed a demo tenant on an empty boot
//!
//! Validation fails closed: a malformed port or an empty host is an error,
//! never a silent fallback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a malformed value.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
    },
}

// ============================================================================
// SECTION: Snapshot Store Selection
// ============================================================================

/// Snapshot store backends the server can run on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStoreKind {
    /// Volatile in-memory snapshots.
    Memory,
    /// JSON snapshot file on disk.
    File {
        /// Snapshot file path.
        path: String,
    },
    /// SQLite single-row store.
    Sqlite {
        /// Database file path.
        path: String,
    },
}

// ============================================================================
// SECTION: Server Configuration
// ============================================================================

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8787;

/// Default snapshot file path.
pub const DEFAULT_SNAPSHOT_PATH: &str = "./.runtime/state-snapshot.json";

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Snapshot store backend.
    pub snapshot_store: SnapshotStoreKind,
    /// Whether to seed a demo tenant on an empty boot.
    pub seed_demo_tenant: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot_store: SnapshotStoreKind::File {
                path: DEFAULT_SNAPSHOT_PATH.to_string(),
            },
            seed_demo_tenant: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] on malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Loads configuration from an explicit variable map; test seam.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] on malformed values.
    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let host = match vars.get("HOST") {
            Some(host) if host.is_empty() => {
                return Err(ConfigError::InvalidValue {
                    name: "HOST".to_string(),
                    value: String::new(),
                });
            }
            Some(host) => host.clone(),
            None => DEFAULT_HOST.to_string(),
        };
        let port = match vars.get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT".to_string(),
                value: raw.clone(),
            })?,
            None => DEFAULT_PORT,
        };
        let snapshot_store = match vars.get("DATABASE_URL") {
            Some(url) if !url.is_empty() => SnapshotStoreKind::Sqlite {
                path: url.trim_start_matches("sqlite://").to_string(),
            },
            _ => SnapshotStoreKind::File {
                path: vars
                    .get("STATE_SNAPSHOT_PATH")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string()),
            },
        };
        let seed_demo_tenant = match vars.get("SEED_DEMO_TENANT").map(String::as_str) {
            Some("1" | "true" | "TRUE" | "yes") => true,
            Some("0" | "false" | "FALSE" | "no") | None => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "SEED_DEMO_TENANT".to_string(),
                    value: other.to_string(),
                });
            }
        };
        Ok(Self {
            host,
            port,
            snapshot_store,
            seed_demo_tenant,
        })
    }

    /// Returns the bind address string.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test assertions may panic")]

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    /// Defaults apply when the environment is empty.
    #[test]
    fn empty_environment_uses_defaults() {
        let config = ServerConfig::from_vars(&BTreeMap::new()).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_address(), "127.0.0.1:8787");
    }

    /// A database URL selects the SQLite store.
    #[test]
    fn database_url_selects_sqlite() {
        let config =
            ServerConfig::from_vars(&vars(&[("DATABASE_URL", "sqlite:///tmp/pilot.db")])).unwrap();
        assert_eq!(
            config.snapshot_store,
            SnapshotStoreKind::Sqlite {
                path: "/tmp/pilot.db".to_string()
            }
        );
    }

    /// A snapshot path selects the file store.
    #[test]
    fn snapshot_path_selects_file_store() {
        let config =
            ServerConfig::from_vars(&vars(&[("STATE_SNAPSHOT_PATH", "/tmp/snap.json")])).unwrap();
        assert_eq!(
            config.snapshot_store,
            SnapshotStoreKind::File {
                path: "/tmp/snap.json".to_string()
            }
        );
    }

    /// Malformed ports fail closed.
    #[test]
    fn malformed_port_is_rejected() {
        let error = ServerConfig::from_vars(&vars(&[("PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { .. }));
    }

    /// Seed flag parsing accepts booleans and rejects junk.
    #[test]
    fn seed_flag_parses_strictly() {
        assert!(ServerConfig::from_vars(&vars(&[("SEED_DEMO_TENANT", "true")]))
            .unwrap()
            .seed_demo_tenant);
        assert!(!ServerConfig::from_vars(&vars(&[("SEED_DEMO_TENANT", "false")]))
            .unwrap()
            .seed_demo_tenant);
        assert!(ServerConfig::from_vars(&vars(&[("SEED_DEMO_TENANT", "maybe")])).is_err());
    }
}
