// crates/metric-pilot-core/src/core/error.rs
// ============================================================================
// Module: Metric Pilot Error Model
// Description: Single surfaced error type with a stable kind taxonomy.
// Purpose: Carry kind, message, guardrail checks, and details across boundaries.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every surfaced failure in Metric Pilot is a [`CoreError`]: an [`ErrorKind`]
//! tag mapping to an HTTP status, a human-readable message, and optional
//! structured context (`checks` for guardrail traces, `details` for anything
//! else). Transports render the error without interpreting it; callers branch
//! on the kind, never on message text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Stable error taxonomy shared by all core operations.
///
/// # Invariants
/// - Variants are stable for serialization and transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Validation failure or malformed input.
    BadRequest,
    /// Reserved for the authentication adapter.
    Unauthorized,
    /// Role, tenant isolation, kill switch, or policy violation.
    Forbidden,
    /// Entity does not exist within the caller's tenant.
    NotFound,
    /// Reserved for uniqueness conflicts.
    Conflict,
    /// Request body exceeded the transport limit.
    PayloadTooLarge,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status code for this kind.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PayloadTooLarge => 413,
            Self::Internal => 500,
        }
    }
}

// ============================================================================
// SECTION: Guardrail Checks
// ============================================================================

/// Outcome of a single guardrail or quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Check passed with a warning.
    Warn,
    /// Check failed.
    Fail,
}

/// A named guardrail or quality check with its outcome.
///
/// # Invariants
/// - `name` is a stable label suitable for audit trails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailCheck {
    /// Stable check label.
    pub name: String,
    /// Check outcome.
    pub status: CheckStatus,
    /// Optional human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl GuardrailCheck {
    /// Builds a passing check.
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pass,
            detail: None,
        }
    }

    /// Builds a warning check with a detail message.
    #[must_use]
    pub fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: Some(detail.into()),
        }
    }

    /// Builds a failing check with a detail message.
    #[must_use]
    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Fail,
            detail: Some(detail.into()),
        }
    }
}

// ============================================================================
// SECTION: Core Error
// ============================================================================

/// Surfaced error carrying kind, message, and optional structured context.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct CoreError {
    /// Stable error kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Guardrail trace when the failure came from an ordered check list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<GuardrailCheck>,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CoreError {
    /// Builds an error with the given kind and message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            checks: Vec::new(),
            details: None,
        }
    }

    /// Builds a [`ErrorKind::BadRequest`] error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Builds a [`ErrorKind::Forbidden`] error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Builds a [`ErrorKind::NotFound`] error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Builds an [`ErrorKind::Internal`] error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attaches a guardrail trace to the error.
    #[must_use]
    pub fn with_checks(mut self, checks: Vec<GuardrailCheck>) -> Self {
        self.checks = checks;
        self
    }

    /// Attaches structured details to the error.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}
