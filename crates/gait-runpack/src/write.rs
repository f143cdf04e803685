// crates/gait-runpack/src/write.rs
// ============================================================================
// Module: Runpack Writer
// Description: Assemble and atomically write a signed runpack archive.
// Purpose: Produce byte-stable archives from one run's logical bundle.
// Dependencies: gait-core, tempfile
// ============================================================================

//! ## Overview
//! The writer canonicalizes each record file, hashes it, builds the
//! manifest, computes the manifest digest over the manifest with
//! `manifest_digest` and `signatures` removed, optionally signs that same
//! canonical form, and writes the deterministic archive through a temp file
//! renamed into place only on success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use gait_core::jcs;
use gait_core::schema::runpack::IntentRecord;
use gait_core::schema::runpack::Manifest;
use gait_core::schema::runpack::ManifestFile;
use gait_core::schema::runpack::Refs;
use gait_core::schema::runpack::ResultRecord;
use gait_core::schema::runpack::Run;
use gait_core::sign::KeyPair;
use gait_core::sign::sign_manifest_bytes;
use gait_core::zipx::ZipEntry;
use gait_core::zipx::write_deterministic_zip;
use serde::Serialize;

use crate::DEFAULT_CAPTURE_MODE;
use crate::INTENTS_PATH;
use crate::MANIFEST_PATH;
use crate::MANIFEST_SCHEMA_ID;
use crate::MANIFEST_SCHEMA_VERSION;
use crate::REFS_PATH;
use crate::RESULTS_PATH;
use crate::RUN_PATH;
use crate::RunpackError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for writing one runpack.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    /// The run record.
    pub run: Run,
    /// Intents in recorded order.
    pub intents: Vec<IntentRecord>,
    /// Results in recorded order.
    pub results: Vec<ResultRecord>,
    /// Reference receipts.
    pub refs: Refs,
    /// Capture mode label; defaults to `reference`.
    pub capture_mode: String,
}

/// Output of a successful write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Final archive path.
    pub path: PathBuf,
    /// The manifest as written, digest and signatures included.
    pub manifest: Manifest,
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Writes a runpack archive, unsigned.
///
/// # Errors
///
/// Returns [`RunpackError`] on validation, encoding, or I/O failure.
pub fn write_runpack(path: &Path, options: RecordOptions) -> Result<WriteResult, RunpackError> {
    write_runpack_signed(path, options, None)
}

/// Writes a runpack archive, signing the manifest when a keypair is given.
///
/// # Errors
///
/// Returns [`RunpackError`] on validation, encoding, or I/O failure.
pub fn write_runpack_signed(
    path: &Path,
    options: RecordOptions,
    keypair: Option<&KeyPair>,
) -> Result<WriteResult, RunpackError> {
    let run_id = options.run.run_id.trim().to_string();
    if run_id.is_empty() {
        return Err(RunpackError::MissingRunId);
    }

    let run_bytes = jcs::canonical_json_bytes(&options.run)?;
    let intents_bytes = canonical_jsonl(&options.intents)?;
    let results_bytes = canonical_jsonl(&options.results)?;
    let refs_bytes = jcs::canonical_json_bytes(&options.refs)?;

    let capture_mode = if options.capture_mode.trim().is_empty() {
        DEFAULT_CAPTURE_MODE.to_string()
    } else {
        options.capture_mode.trim().to_string()
    };

    let mut manifest = Manifest {
        schema_id: MANIFEST_SCHEMA_ID.to_string(),
        schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
        created_at: options.run.created_at,
        producer_version: if options.run.producer_version.is_empty() {
            gait_core::DEFAULT_PRODUCER_VERSION.to_string()
        } else {
            options.run.producer_version.clone()
        },
        run_id,
        capture_mode,
        files: vec![
            manifest_file(RUN_PATH, &run_bytes),
            manifest_file(INTENTS_PATH, &intents_bytes),
            manifest_file(RESULTS_PATH, &results_bytes),
            manifest_file(REFS_PATH, &refs_bytes),
        ],
        manifest_digest: String::new(),
        signatures: Vec::new(),
    };

    let signable = signable_manifest_bytes(&manifest)?;
    manifest.manifest_digest = jcs::digest_bytes(&signable);
    if let Some(keypair) = keypair {
        manifest.signatures = vec![sign_manifest_bytes(keypair, &signable)];
    }
    let manifest_bytes = jcs::canonical_json_bytes(&manifest)?;

    let entries = vec![
        zip_entry(MANIFEST_PATH, manifest_bytes),
        zip_entry(RUN_PATH, run_bytes),
        zip_entry(INTENTS_PATH, intents_bytes),
        zip_entry(RESULTS_PATH, results_bytes),
        zip_entry(REFS_PATH, refs_bytes),
    ];
    write_archive_atomically(path, &entries)?;
    tracing::debug!(run_id = %manifest.run_id, path = %path.display(), "wrote runpack");

    Ok(WriteResult {
        path: path.to_path_buf(),
        manifest,
    })
}

/// Returns the canonical bytes the manifest digest and signatures cover:
/// the manifest with `manifest_digest` and `signatures` cleared.
pub(crate) fn signable_manifest_bytes(manifest: &Manifest) -> Result<Vec<u8>, RunpackError> {
    let mut unsigned = manifest.clone();
    unsigned.manifest_digest = String::new();
    unsigned.signatures = Vec::new();
    Ok(jcs::canonical_json_bytes(&unsigned)?)
}

/// Encodes records as one canonical JSON object per line.
pub(crate) fn canonical_jsonl<T: Serialize>(records: &[T]) -> Result<Vec<u8>, RunpackError> {
    let mut out = Vec::new();
    for record in records {
        out.extend_from_slice(&jcs::canonical_json_bytes(record)?);
        out.push(b'\n');
    }
    Ok(out)
}

fn manifest_file(path: &str, bytes: &[u8]) -> ManifestFile {
    ManifestFile {
        path: path.to_string(),
        sha256: jcs::digest_bytes(bytes),
    }
}

fn zip_entry(path: &str, data: Vec<u8>) -> ZipEntry {
    ZipEntry {
        path: path.to_string(),
        data,
        mode: 0o644,
    }
}

/// Writes the archive to a sibling temp file and renames it into place.
fn write_archive_atomically(path: &Path, entries: &[ZipEntry]) -> Result<(), RunpackError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
    }
    let dir = parent.unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    write_deterministic_zip(temp.as_file(), entries)?;
    temp.persist(path).map_err(|err| RunpackError::Io(err.error))?;
    Ok(())
}
