// crates/metric-pilot-rest/src/sink.rs
// ============================================================================
// Module: Process Observability Sink
// Description: JSON-lines stderr sink for mutation events.
// Purpose: Give operators a structured trail without an external logger.
// Dependencies: metric-pilot-core, serde_json
// ============================================================================

//! ## Overview
//! The server records every engine mutation as one JSON line on stderr. The
//! shape is stable and grep-friendly; log shippers can consume it directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use metric_pilot_core::ObservabilitySink;
use metric_pilot_core::ObservedMutation;

// ============================================================================
// SECTION: Stderr Sink
// ============================================================================

/// Sink writing one JSON line per mutation to stderr.
#[derive(Debug, Default)]
pub struct StderrObservabilitySink;

impl ObservabilitySink for StderrObservabilitySink {
    #[allow(clippy::print_stderr, reason = "stderr is the configured log stream")]
    fn record(&self, event: &ObservedMutation) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{line}");
        }
    }
}
