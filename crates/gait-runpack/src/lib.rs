// crates/gait-runpack/src/lib.rs
// ============================================================================
// Module: GAIT Runpack
// Description: Deterministic runpack archives with signed manifests.
// Purpose: Write, read, verify, diff, and replay one run's artifact bundle.
// Dependencies: gait-core, serde, tempfile
// ============================================================================

//! ## Overview
//! A runpack is a deterministic zip bundling one run: `manifest.json`,
//! `run.json`, `intents.jsonl`, `results.jsonl`, and `refs.json`. The
//! manifest digest covers the manifest with `manifest_digest` and
//! `signatures` removed; signatures cover those same canonical bytes.
//! Archives are written atomically and are immutable afterwards.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod diff;
pub mod read;
pub mod replay;
pub mod verify;
pub mod write;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use diff::DiffPrivacy;
pub use diff::DiffResult;
pub use diff::DiffSummary;
pub use diff::diff_runpacks;
pub use read::Runpack;
pub use read::read_runpack;
pub use replay::ReplayOptions;
pub use replay::ReplayResult;
pub use replay::ReplayStep;
pub use replay::replay_exit_code;
pub use replay::replay_stub;
pub use verify::SignatureStatus;
pub use verify::VerifyOptions;
pub use verify::VerifyResult;
pub use verify::verify_zip;
pub use write::RecordOptions;
pub use write::WriteResult;
pub use write::write_runpack;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Manifest schema identifier.
pub const MANIFEST_SCHEMA_ID: &str = "gait.runpack.manifest";
/// Manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0.0";
/// Archive path of the manifest.
pub const MANIFEST_PATH: &str = "manifest.json";
/// Archive path of the run record.
pub const RUN_PATH: &str = "run.json";
/// Archive path of the intents file.
pub const INTENTS_PATH: &str = "intents.jsonl";
/// Archive path of the results file.
pub const RESULTS_PATH: &str = "results.jsonl";
/// Archive path of the refs file.
pub const REFS_PATH: &str = "refs.json";
/// Default capture mode stamped into manifests.
pub const DEFAULT_CAPTURE_MODE: &str = "reference";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised across runpack operations.
#[derive(Debug, Error)]
pub enum RunpackError {
    /// The run record was missing its run id.
    #[error("run_id is required")]
    MissingRunId,
    /// Archive I/O failed.
    #[error("runpack io: {0}")]
    Io(#[from] std::io::Error),
    /// The archive container was malformed.
    #[error("runpack archive: {0}")]
    Archive(#[from] gait_core::zipx::ZipxError),
    /// Canonical encoding failed.
    #[error("canonical encode: {0}")]
    Canonical(#[from] gait_core::jcs::JcsError),
    /// The archive had no manifest.
    #[error("missing manifest.json")]
    MissingManifest,
    /// The manifest could not be decoded.
    #[error("parse manifest: {0}")]
    InvalidManifest(String),
    /// A manifest-listed file was absent from the archive.
    #[error("missing archive file: {0}")]
    MissingFile(String),
    /// A file's bytes disagreed with the manifest hash.
    #[error("hash mismatch for {0}")]
    HashMismatch(String),
    /// A record file could not be decoded.
    #[error("parse {path}: {message}")]
    InvalidRecord {
        /// Archive path that failed to decode.
        path: String,
        /// Decode failure detail.
        message: String,
    },
    /// An intent id appeared more than once.
    #[error("duplicate intent_id: {0}")]
    DuplicateIntent(String),
    /// A result referenced the same intent more than once.
    #[error("duplicate result for intent_id: {0}")]
    DuplicateResult(String),
    /// Diff privacy mode was unknown.
    #[error("invalid diff privacy: {0}")]
    InvalidPrivacy(String),
}
