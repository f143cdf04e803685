// crates/gait-core/src/lib.rs
// ============================================================================
// Module: GAIT Core
// Description: Canonical hashing, deterministic archives, signing, and gating.
// Purpose: Provide the deterministic primitives every GAIT artifact builds on.
// Dependencies: serde, serde_jcs, serde_json, sha2, ed25519-dalek, zip, fs2
// ============================================================================

//! ## Overview
//! `gait-core` holds the leaf subsystems of the GAIT engine: RFC 8785
//! canonical JSON with SHA-256 digests, the byte-stable zip writer, Ed25519
//! manifest signing, the shared wire records, and the gate pipeline (intent
//! normalization, policy evaluation, rate limiting, credential brokering).
//! Everything here is offline and deterministic: no wall-clock reads feed a
//! digest, and one canonical byte stream exists for any logical value.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod gate;
pub mod jcs;
pub mod schema;
pub mod sign;
pub mod zipx;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use gate::credential;
pub use gate::intent;
pub use gate::policy;
pub use gate::policytest;
pub use gate::ratelimit;
pub use jcs::canonical_json_bytes;
pub use jcs::canonicalize_json;
pub use jcs::digest_bytes;
pub use jcs::digest_json;
pub use jcs::digest_value;
pub use jcs::is_hex_digest;
pub use schema::gate::GateResult;
pub use schema::gate::IntentRequest;
pub use schema::gate::Verdict;

/// Frozen timestamp used wherever a digest-participating time value is
/// absent: 1980-01-01T00:00:00Z.
#[must_use]
pub fn frozen_epoch() -> time::OffsetDateTime {
    time::macros::datetime!(1980-01-01 00:00:00 UTC)
}

/// Producer version fallback for records created without an explicit one.
pub const DEFAULT_PRODUCER_VERSION: &str = "0.0.0-dev";
