// crates/gait-runpack/src/diff.rs
// ============================================================================
// Module: Runpack Diff
// Description: Privacy-aware comparison of two runpack archives.
// Purpose: Report changed files, records, and intent-id drift between packs.
// Dependencies: gait-core
// ============================================================================

//! ## Overview
//! `metadata` privacy compares only stable record metadata — intent id,
//! tool name, and digests — while `full` privacy compares canonical record
//! bytes. File changes are the symmetric difference of manifest entries
//! plus any path whose hashes disagree. The diff is symmetric up to
//! swapping the left-only and right-only sets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use gait_core::jcs;
use gait_core::schema::runpack::IntentRecord;
use gait_core::schema::runpack::ResultRecord;
use serde::Deserialize;
use serde::Serialize;

use crate::RunpackError;
use crate::read::Runpack;
use crate::read::read_runpack;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Privacy mode for record comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffPrivacy {
    /// Compare only record metadata.
    Metadata,
    /// Compare canonical record bytes.
    Full,
}

impl FromStr for DiffPrivacy {
    type Err = RunpackError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "metadata" => Ok(Self::Metadata),
            "full" => Ok(Self::Full),
            other => Err(RunpackError::InvalidPrivacy(other.to_string())),
        }
    }
}

/// Change summary between two runpacks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Whether the manifest digests differ.
    pub manifest_changed: bool,
    /// Paths with disagreeing hashes, including one-sided paths.
    pub files_changed: Vec<String>,
    /// Whether any shared intent changed under the privacy mode.
    pub intents_changed: bool,
    /// Whether any shared result changed under the privacy mode.
    pub results_changed: bool,
    /// Whether the canonical refs bytes differ.
    pub refs_changed: bool,
    /// Intent ids present only on the left.
    pub left_only_intents: Vec<String>,
    /// Intent ids present only on the right.
    pub right_only_intents: Vec<String>,
}

/// Diff report for two archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Left archive path.
    pub left: String,
    /// Right archive path.
    pub right: String,
    /// Privacy mode used.
    pub privacy: DiffPrivacy,
    /// Change summary.
    pub summary: DiffSummary,
}

// ============================================================================
// SECTION: Diff
// ============================================================================

/// Diffs two runpack archives under the given privacy mode.
///
/// # Errors
///
/// Returns [`RunpackError`] when either archive fails to read.
pub fn diff_runpacks(
    left_path: &Path,
    right_path: &Path,
    privacy: DiffPrivacy,
) -> Result<DiffResult, RunpackError> {
    let left = read_runpack(left_path)?;
    let right = read_runpack(right_path)?;

    let summary = DiffSummary {
        manifest_changed: manifest_digest(&left)? != manifest_digest(&right)?,
        files_changed: changed_files(&left, &right),
        intents_changed: intents_changed(&left.intents, &right.intents, privacy)?,
        results_changed: results_changed(&left.results, &right.results, privacy)?,
        refs_changed: jcs::canonical_json_bytes(&left.refs)?
            != jcs::canonical_json_bytes(&right.refs)?,
        left_only_intents: only_intents(&left.intents, &right.intents),
        right_only_intents: only_intents(&right.intents, &left.intents),
    };

    Ok(DiffResult {
        left: left_path.display().to_string(),
        right: right_path.display().to_string(),
        privacy,
        summary,
    })
}

fn manifest_digest(pack: &Runpack) -> Result<String, RunpackError> {
    Ok(jcs::digest_bytes(&crate::write::signable_manifest_bytes(&pack.manifest)?))
}

fn changed_files(left: &Runpack, right: &Runpack) -> Vec<String> {
    let left_files: BTreeMap<&str, &str> = left
        .manifest
        .files
        .iter()
        .map(|file| (file.path.as_str(), file.sha256.as_str()))
        .collect();
    let right_files: BTreeMap<&str, &str> = right
        .manifest
        .files
        .iter()
        .map(|file| (file.path.as_str(), file.sha256.as_str()))
        .collect();

    let mut changed = BTreeSet::new();
    for (path, left_hash) in &left_files {
        match right_files.get(path) {
            Some(right_hash) if right_hash == left_hash => {}
            _ => {
                changed.insert((*path).to_string());
            }
        }
    }
    for path in right_files.keys() {
        if !left_files.contains_key(path) {
            changed.insert((*path).to_string());
        }
    }
    changed.into_iter().collect()
}

fn intents_changed(
    left: &[IntentRecord],
    right: &[IntentRecord],
    privacy: DiffPrivacy,
) -> Result<bool, RunpackError> {
    let right_by_id: BTreeMap<&str, &IntentRecord> =
        right.iter().map(|intent| (intent.intent_id.as_str(), intent)).collect();
    for intent in left {
        let Some(other) = right_by_id.get(intent.intent_id.as_str()) else {
            continue;
        };
        let changed = match privacy {
            DiffPrivacy::Metadata => {
                intent.tool_name != other.tool_name || intent.args_digest != other.args_digest
            }
            DiffPrivacy::Full => {
                jcs::canonical_json_bytes(intent)? != jcs::canonical_json_bytes(*other)?
            }
        };
        if changed {
            return Ok(true);
        }
    }
    Ok(false)
}

fn results_changed(
    left: &[ResultRecord],
    right: &[ResultRecord],
    privacy: DiffPrivacy,
) -> Result<bool, RunpackError> {
    let right_by_id: BTreeMap<&str, &ResultRecord> =
        right.iter().map(|result| (result.intent_id.as_str(), result)).collect();
    for result in left {
        let Some(other) = right_by_id.get(result.intent_id.as_str()) else {
            continue;
        };
        let changed = match privacy {
            DiffPrivacy::Metadata => {
                result.status != other.status || result.result_digest != other.result_digest
            }
            DiffPrivacy::Full => {
                jcs::canonical_json_bytes(result)? != jcs::canonical_json_bytes(*other)?
            }
        };
        if changed {
            return Ok(true);
        }
    }
    Ok(false)
}

fn only_intents(from: &[IntentRecord], other: &[IntentRecord]) -> Vec<String> {
    let other_ids: BTreeSet<&str> = other.iter().map(|intent| intent.intent_id.as_str()).collect();
    let mut out: Vec<String> = from
        .iter()
        .filter(|intent| !other_ids.contains(intent.intent_id.as_str()))
        .map(|intent| intent.intent_id.clone())
        .collect();
    out.sort();
    out.dedup();
    out
}
