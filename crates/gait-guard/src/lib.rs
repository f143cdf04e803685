// crates/gait-guard/src/lib.rs
// ============================================================================
// Module: GAIT Guard
// Description: Evidence packs, incident selection, retention, and encryption.
// Purpose: Turn runpacks and sidecars into compliance-ready artifacts.
// Dependencies: gait-core, gait-runpack, aes-gcm
// ============================================================================

//! ## Overview
//! Guard assembles evidence packs under fixed compliance templates, builds
//! incident packs by windowed sidecar discovery, sweeps aged artifacts by
//! filename convention, and wraps archives in AES-256-GCM envelopes. Every
//! archive it writes goes through the deterministic zip writer.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod build;
pub mod crypto;
pub mod incident;
pub mod pdf;
pub mod retention;
pub mod template;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use build::BuildOptions;
pub use build::BuildResult;
pub use build::build_pack;
pub use build::verify_pack;
pub use crypto::DecryptOptions;
pub use crypto::DecryptResult;
pub use crypto::EncryptOptions;
pub use crypto::EncryptResult;
pub use crypto::decrypt_artifact;
pub use crypto::encrypt_artifact;
pub use incident::IncidentPackOptions;
pub use incident::IncidentPackResult;
pub use incident::build_incident_pack;
pub use retention::RetentionOptions;
pub use retention::apply_retention;
pub use template::normalize_template_id;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pack manifest schema identifier.
pub const PACK_MANIFEST_SCHEMA_ID: &str = "gait.guard.pack_manifest";
/// Pack manifest schema version.
pub const PACK_MANIFEST_SCHEMA_VERSION: &str = "1.0.0";
/// Encrypted artifact schema identifier.
pub const ENCRYPTED_ARTIFACT_SCHEMA_ID: &str = "gait.guard.encrypted_artifact";
/// Encrypted artifact schema version.
pub const ENCRYPTED_ARTIFACT_SCHEMA_VERSION: &str = "1.0.0";
/// Retention report schema identifier.
pub const RETENTION_REPORT_SCHEMA_ID: &str = "gait.guard.retention_report";
/// Retention report schema version.
pub const RETENTION_REPORT_SCHEMA_VERSION: &str = "1.0.0";
/// File suffix for encrypted envelopes.
pub const ENCRYPTED_SUFFIX: &str = ".gaitenc";
/// Default environment variable holding the base64 AES-256 key.
pub const ENCRYPTION_KEY_ENV: &str = "GAIT_ENCRYPTION_KEY";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised across guard operations.
#[derive(Debug, Error)]
pub enum GuardError {
    /// A required input was missing or empty.
    #[error("{0} is required")]
    MissingInput(&'static str),
    /// Guard I/O failed.
    #[error("guard io: {0}")]
    Io(#[from] std::io::Error),
    /// A runpack operation failed.
    #[error(transparent)]
    Runpack(#[from] gait_runpack::RunpackError),
    /// Archive writing failed.
    #[error("guard archive: {0}")]
    Archive(#[from] gait_core::zipx::ZipxError),
    /// Canonical encoding failed.
    #[error("canonical encode: {0}")]
    Canonical(#[from] gait_core::jcs::JcsError),
    /// A pack entry path escaped the pack root.
    #[error("path must be relative and stay within pack root: {0}")]
    UnsafePath(String),
    /// Two evidence files collided on the same pack path.
    #[error("duplicate pack entry: {0}")]
    DuplicateEntry(String),
    /// Key material could not be resolved.
    #[error("missing key source: provide --key-env or --key-command")]
    MissingKeySource,
    /// Key material was malformed.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
    /// The key command could not be run.
    #[error("run encryption key command: {0}")]
    KeyCommand(String),
    /// Encryption or decryption failed.
    #[error("cipher: {0}")]
    Cipher(String),
    /// The encrypted envelope was malformed.
    #[error("parse encrypted artifact: {0}")]
    InvalidEnvelope(String),
    /// The decrypted payload digest disagreed with the envelope.
    #[error("decrypted payload digest mismatch")]
    PlaintextDigestMismatch,
    /// The pack manifest was missing or malformed.
    #[error("parse pack manifest: {0}")]
    InvalidManifest(String),
}
