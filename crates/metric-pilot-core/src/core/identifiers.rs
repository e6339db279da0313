// crates/metric-pilot-core/src/core/identifiers.rs
// ============================================================================
// Module: Metric Pilot Identifiers
// Description: Canonical opaque identifiers for tenants, entities, and runs.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, rand
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! Metric Pilot. Identifiers are opaque and serialize as strings. Fresh
//! identifiers are collision-resistant: a typed prefix followed by 128 random
//! bits rendered as 32 lowercase hex characters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Generation
// ============================================================================

/// Generates a fresh prefixed identifier with 128 random bits.
#[must_use]
pub fn fresh_id(prefix: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(prefix.len() + 1 + 32);
    out.push_str(prefix);
    out.push('_');
    for byte in bytes {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Declares a typed, opaque string identifier with a fresh-id constructor.
macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from an existing string form.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random identifier with the typed prefix.
            #[must_use]
            pub fn generate() -> Self {
                Self(fresh_id($prefix))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_id!(
    /// Tenant identifier; the top-level isolation unit.
    TenantId,
    "ten"
);

string_id!(
    /// Source connection identifier.
    ConnectionId,
    "conn"
);

string_id!(
    /// Source sync run identifier.
    SourceRunId,
    "srun"
);

string_id!(
    /// Canonical fact identifier.
    FactId,
    "fact"
);

string_id!(
    /// Live query result identifier.
    QueryResultId,
    "qres"
);

string_id!(
    /// Materialization run identifier.
    MaterializationId,
    "mat"
);

string_id!(
    /// Model run identifier.
    ModelRunId,
    "mrun"
);

string_id!(
    /// Insight identifier.
    InsightId,
    "ins"
);

string_id!(
    /// Recommended action identifier.
    ActionId,
    "act"
);

string_id!(
    /// Action approval identifier.
    ApprovalId,
    "appr"
);

string_id!(
    /// Skill installation identifier.
    SkillInstallId,
    "skin"
);

string_id!(
    /// Skill draft identifier.
    SkillDraftId,
    "skdr"
);

string_id!(
    /// Skill run identifier.
    SkillRunId,
    "skrun"
);

string_id!(
    /// Report identifier.
    ReportId,
    "rep"
);

string_id!(
    /// Report schedule identifier.
    ScheduleId,
    "sched"
);

string_id!(
    /// Channel delivery event identifier.
    ChannelEventId,
    "chev"
);

string_id!(
    /// Analysis run identifier.
    AnalysisRunId,
    "arun"
);

string_id!(
    /// Model profile identifier.
    ModelProfileId,
    "prof"
);

string_id!(
    /// Report type identifier.
    ReportTypeId,
    "rtype"
);

string_id!(
    /// Audit event identifier.
    AuditEventId,
    "aud"
);
