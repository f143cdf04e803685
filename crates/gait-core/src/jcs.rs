// crates/gait-core/src/jcs.rs
// ============================================================================
// Module: Canonical JSON and Digests
// Description: RFC 8785 JSON canonicalization and SHA-256 content digests.
// Purpose: Guarantee one byte stream, and therefore one digest, per value.
// Dependencies: serde, serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Every GAIT digest is SHA-256 over RFC 8785 (JCS) canonical bytes,
//! hex-lower. Canonicalization sorts object members in UTF-16 code-unit
//! order, strips insignificant whitespace, and emits numbers in shortest
//! round-tripping form. Non-finite floats are rejected during encoding.

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

/// Errors raised while canonicalizing or digesting JSON.
#[derive(Debug, Error)]
pub enum JcsError {
    /// Input bytes are not syntactically valid JSON.
    #[error("parse json: {0}")]
    Parse(#[from] serde_json::Error),
    /// Canonical encoding failed (for example, a non-finite float).
    #[error("canonicalize json: {0}")]
    Canonicalize(String),
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Returns the RFC 8785 canonical byte stream for raw JSON input.
///
/// # Errors
///
/// Returns [`JcsError::Parse`] when the input is not valid JSON and
/// [`JcsError::Canonicalize`] when canonical encoding fails.
pub fn canonicalize_json(input: &[u8]) -> Result<Vec<u8>, JcsError> {
    let value: serde_json::Value = serde_json::from_slice(input)?;
    canonical_json_bytes(&value)
}

/// Returns canonical JSON bytes for a serializable value.
///
/// # Errors
///
/// Returns [`JcsError::Canonicalize`] when canonical encoding fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, JcsError> {
    serde_jcs::to_vec(value).map_err(|err| JcsError::Canonicalize(err.to_string()))
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Hashes raw bytes with SHA-256 and returns the lowercase hex digest.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Digests raw JSON input over its canonical form.
///
/// # Errors
///
/// Returns [`JcsError`] when the input cannot be canonicalized.
pub fn digest_json(input: &[u8]) -> Result<String, JcsError> {
    Ok(digest_bytes(&canonicalize_json(input)?))
}

/// Digests a serializable value over its canonical form.
///
/// # Errors
///
/// Returns [`JcsError::Canonicalize`] when canonical encoding fails.
pub fn digest_value<T: Serialize + ?Sized>(value: &T) -> Result<String, JcsError> {
    Ok(digest_bytes(&canonical_json_bytes(value)?))
}

/// Returns true when the input is a lowercase 64-hex digest string.
#[must_use]
pub fn is_hex_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_sorts_keys_and_strips_whitespace() {
        let out = canonicalize_json(br#"{ "b":2, "a":1 }"#).expect("canonicalize");
        assert_eq!(out, br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn digest_is_order_independent() {
        let da = digest_json(br#"{"a":1,"b":2}"#).expect("digest a");
        let db = digest_json(br#"{ "b":2, "a":1 }"#).expect("digest b");
        assert_eq!(da, db);
    }

    #[test]
    fn canonicalize_rejects_invalid_json() {
        assert!(canonicalize_json(b"{").is_err());
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_json(br#"{"z": [1, 2.0, "x"], "a": null}"#).expect("once");
        let twice = canonicalize_json(&once).expect("twice");
        assert_eq!(once, twice);
    }

    #[test]
    fn digest_shape_is_64_hex() {
        let digest = digest_bytes(b"hello");
        assert!(is_hex_digest(&digest));
        assert!(!is_hex_digest("ABCDEF"));
        assert!(!is_hex_digest(&digest[..63]));
    }
}
