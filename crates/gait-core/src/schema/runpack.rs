// crates/gait-core/src/schema/runpack.rs
// ============================================================================
// Module: Runpack Records
// Description: Run, intent, result, refs, and manifest shapes for runpacks.
// Purpose: Define the logical bundle a runpack archive serializes.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! A runpack bundles one run: the run record, its intents and results (one
//! canonical JSON object per line), retrieval receipts, and a signed
//! manifest whose digest covers the manifest with `manifest_digest` and
//! `signatures` removed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Run Records
// ============================================================================

/// Execution environment captured with a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunEnv {
    /// Operating system label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    /// Architecture label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arch: String,
    /// Runtime label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime: String,
}

/// Timeline event within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Event label.
    pub event: String,
    /// Event timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
}

/// One recorded run.
///
/// # Invariants
/// - `run_id` matches the manifest and refs `run_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Schema identifier (`gait.runpack.run`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Run creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub producer_version: String,
    /// Run identifier.
    pub run_id: String,
    /// Execution environment.
    #[serde(default)]
    pub env: RunEnv,
    /// Run timeline events, ordered as recorded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<TimelineEvent>,
}

// ============================================================================
// SECTION: Intent and Result Records
// ============================================================================

/// One recorded intent within a run.
///
/// # Invariants
/// - `intent_id` is unique within the run's intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    /// Schema identifier (`gait.runpack.intent`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Record timestamp.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    /// Version of the producing engine.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub producer_version: String,
    /// Run this intent belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    /// Intent identifier.
    pub intent_id: String,
    /// Tool name invoked.
    pub tool_name: String,
    /// Digest of the normalized args.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args_digest: String,
    /// Tool arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// One recorded result within a run.
///
/// # Invariants
/// - `intent_id` references a recorded intent and is unique within results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Schema identifier (`gait.runpack.result`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Record timestamp.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    /// Version of the producing engine.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub producer_version: String,
    /// Run this result belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    /// Intent this result answers.
    pub intent_id: String,
    /// Result status label.
    pub status: String,
    /// Digest of the result payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_digest: String,
    /// Result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
}

// ============================================================================
// SECTION: Reference Receipts
// ============================================================================

/// Retrieval receipt for referenced external content.
///
/// # Invariants
/// - `query_digest` and `content_digest` are lowercase 64-hex digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefReceipt {
    /// Receipt identifier.
    pub ref_id: String,
    /// Source system type.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_type: String,
    /// Source locator within the system.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_locator: String,
    /// Digest of the retrieval query.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query_digest: String,
    /// Digest of the retrieved content.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_digest: String,
    /// Retrieval timestamp.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<OffsetDateTime>,
    /// Redaction mode applied to the stored content.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub redaction_mode: String,
}

/// References file for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refs {
    /// Schema identifier (`gait.runpack.refs`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Record timestamp.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    /// Version of the producing engine.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub producer_version: String,
    /// Run these references belong to.
    pub run_id: String,
    /// Retrieval receipts, ordered as recorded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receipts: Vec<RefReceipt>,
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// File entry within a runpack manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Archive path of the file.
    pub path: String,
    /// SHA-256 of the file bytes, hex-lower.
    pub sha256: String,
}

/// Signature over a manifest digest.
///
/// # Invariants
/// - `signed_digest` equals the manifest digest the signature covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSignature {
    /// Signature algorithm (`ed25519`).
    pub alg: String,
    /// Signing key identifier (base64 verifying key).
    pub key_id: String,
    /// Base64-encoded signature bytes.
    pub sig: String,
    /// Hex digest of the signed canonical bytes.
    pub signed_digest: String,
}

/// Signed runpack manifest.
///
/// # Invariants
/// - `manifest_digest` is the digest of this manifest with
///   `manifest_digest` and `signatures` removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema identifier (`gait.runpack.manifest`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Manifest timestamp (taken from the run).
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Run identifier.
    pub run_id: String,
    /// Capture mode label (for example, `reference`).
    pub capture_mode: String,
    /// Files covered by the manifest.
    pub files: Vec<ManifestFile>,
    /// Digest of the manifest without digest and signatures.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manifest_digest: String,
    /// Signatures over `manifest_digest`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<ManifestSignature>,
}
