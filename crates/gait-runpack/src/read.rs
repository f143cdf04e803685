// crates/gait-runpack/src/read.rs
// ============================================================================
// Module: Runpack Reader
// Description: Hash-checked decoding of runpack archives.
// Purpose: Load a runpack into typed records, rejecting tampered files.
// Dependencies: gait-core, serde_json
// ============================================================================

//! ## Overview
//! The reader loads the manifest, then every manifest-listed record file:
//! a listed file absent from the archive or whose bytes disagree with the
//! manifest hash fails the read. Record files decode into typed structures
//! afterwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use gait_core::jcs::digest_bytes;
use gait_core::schema::runpack::IntentRecord;
use gait_core::schema::runpack::Manifest;
use gait_core::schema::runpack::Refs;
use gait_core::schema::runpack::ResultRecord;
use gait_core::schema::runpack::Run;
use gait_core::zipx::read_zip_entries;
use serde::de::DeserializeOwned;

use crate::INTENTS_PATH;
use crate::MANIFEST_PATH;
use crate::REFS_PATH;
use crate::RESULTS_PATH;
use crate::RUN_PATH;
use crate::RunpackError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A loaded runpack bundle.
#[derive(Debug, Clone)]
pub struct Runpack {
    /// The manifest as stored.
    pub manifest: Manifest,
    /// The run record.
    pub run: Run,
    /// Intents in recorded order.
    pub intents: Vec<IntentRecord>,
    /// Results in recorded order.
    pub results: Vec<ResultRecord>,
    /// Reference receipts.
    pub refs: Refs,
}

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Reads and hash-checks a runpack archive.
///
/// # Errors
///
/// Returns [`RunpackError`] when the manifest is missing, a listed file is
/// absent or tampered, or a record fails to decode.
pub fn read_runpack(path: &Path) -> Result<Runpack, RunpackError> {
    let entries = read_zip_entries(path)?;
    let manifest = read_manifest(&entries)?;

    let run: Run = decode_checked(&entries, &manifest, RUN_PATH)?;
    let intents: Vec<IntentRecord> = decode_jsonl_checked(&entries, &manifest, INTENTS_PATH)?;
    let results: Vec<ResultRecord> = decode_jsonl_checked(&entries, &manifest, RESULTS_PATH)?;
    let refs: Refs = decode_checked(&entries, &manifest, REFS_PATH)?;

    Ok(Runpack {
        manifest,
        run,
        intents,
        results,
        refs,
    })
}

/// Parses the manifest entry of an already-read archive.
pub(crate) fn read_manifest(
    entries: &BTreeMap<String, Vec<u8>>,
) -> Result<Manifest, RunpackError> {
    let bytes = entries.get(MANIFEST_PATH).ok_or(RunpackError::MissingManifest)?;
    serde_json::from_slice(bytes).map_err(|err| RunpackError::InvalidManifest(err.to_string()))
}

fn checked_bytes<'a>(
    entries: &'a BTreeMap<String, Vec<u8>>,
    manifest: &Manifest,
    path: &str,
) -> Result<&'a [u8], RunpackError> {
    let bytes = entries.get(path).ok_or_else(|| RunpackError::MissingFile(path.to_string()))?;
    if let Some(listed) = manifest.files.iter().find(|file| file.path == path) {
        if digest_bytes(bytes) != listed.sha256 {
            return Err(RunpackError::HashMismatch(path.to_string()));
        }
    }
    Ok(bytes)
}

fn decode_checked<T: DeserializeOwned>(
    entries: &BTreeMap<String, Vec<u8>>,
    manifest: &Manifest,
    path: &str,
) -> Result<T, RunpackError> {
    let bytes = checked_bytes(entries, manifest, path)?;
    serde_json::from_slice(bytes).map_err(|err| RunpackError::InvalidRecord {
        path: path.to_string(),
        message: err.to_string(),
    })
}

fn decode_jsonl_checked<T: DeserializeOwned>(
    entries: &BTreeMap<String, Vec<u8>>,
    manifest: &Manifest,
    path: &str,
) -> Result<Vec<T>, RunpackError> {
    let bytes = checked_bytes(entries, manifest, path)?;
    let text = std::str::from_utf8(bytes).map_err(|err| RunpackError::InvalidRecord {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(line).map_err(|err| RunpackError::InvalidRecord {
            path: path.to_string(),
            message: err.to_string(),
        })?);
    }
    Ok(out)
}
