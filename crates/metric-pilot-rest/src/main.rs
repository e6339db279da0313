// crates/metric-pilot-rest/src/main.rs
// ============================================================================
// Module: Metric Pilot Server Binary
// Description: Process entrypoint for the REST server.
// Purpose: Load configuration from the environment and serve.
// Dependencies: metric-pilot-config, metric-pilot-rest, tokio
// ============================================================================

//! ## Overview
//! The binary loads [`metric_pilot_config::ServerConfig`] from the
//! environment and runs the server until terminated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;

use metric_pilot_config::ServerConfig;
use metric_pilot_rest::serve;

// ============================================================================
// SECTION: Entrypoint
// ============================================================================

/// Loads configuration and serves.
#[tokio::main]
#[allow(clippy::print_stderr, reason = "startup failures report to stderr")]
async fn main() -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::FAILURE;
        }
    };
    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("server error: {error}");
            ExitCode::FAILURE
        }
    }
}
