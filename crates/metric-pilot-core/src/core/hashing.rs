// crates/metric-pilot-core/src/core/hashing.rs
// ============================================================================
// Module: Metric Pilot Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic digests for manifests and secret fingerprints.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Metric Pilot hashes canonical JSON using RFC 8785 (JCS) so that digests are
//! stable across key ordering. Two consumers depend on this: skill manifest
//! signatures (tamper detection of installed skills) and secret-reference
//! fingerprints (credentials are fingerprinted, never stored).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes the canonical JSON form of a value, returning lowercase hex.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn sha256_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// Hashes raw bytes with SHA-256, returning lowercase hex.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
