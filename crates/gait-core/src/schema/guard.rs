// crates/gait-core/src/schema/guard.rs
// ============================================================================
// Module: Guard Records
// Description: Evidence pack manifests, encryption envelopes, retention reports.
// Purpose: Define the wire shapes for compliance and at-rest artifacts.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Evidence packs are deterministic archives assembled under a compliance
//! template. Their manifests carry a control index, evidence pointers, and
//! an optional incident window. Encrypted artifacts wrap an archive in an
//! AES-256-GCM envelope; retention reports record sweep decisions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::schema::runpack::ManifestSignature;

// ============================================================================
// SECTION: Pack Manifest
// ============================================================================

/// Entry types carried in evidence packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackEntryType {
    /// A runpack archive.
    Runpack,
    /// An execution trace sidecar.
    Trace,
    /// A generated report.
    Report,
    /// Any other evidence file.
    Evidence,
}

impl PackEntryType {
    /// Returns the stable wire label for the entry type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Runpack => "runpack",
            Self::Trace => "trace",
            Self::Report => "report",
            Self::Evidence => "evidence",
        }
    }
}

/// One file carried in an evidence pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackEntry {
    /// Archive path of the entry.
    pub path: String,
    /// Entry type.
    #[serde(rename = "type")]
    pub entry_type: PackEntryType,
    /// SHA-256 of the entry bytes, hex-lower.
    pub sha256: String,
}

/// Control-index row mapping a control to its evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    /// Control identifier within the template.
    pub control_id: String,
    /// Human-readable control title.
    pub title: String,
    /// Paths of matching evidence entries, sorted and unique.
    pub evidence_paths: Vec<String>,
}

/// Stable pointer to one evidence entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Pointer identifier (`ev_001` style, path-ordered).
    pub pointer_id: String,
    /// Archive path of the entry.
    pub path: String,
    /// Entry type.
    #[serde(rename = "type")]
    pub entry_type: PackEntryType,
    /// SHA-256 of the entry bytes, hex-lower.
    pub sha256: String,
}

/// Rendered document carried in a pack (for example, `summary.pdf`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDoc {
    /// Archive path of the rendered document.
    pub path: String,
    /// SHA-256 of the document bytes, hex-lower.
    pub sha256: String,
}

/// Incident selection window.
///
/// # Invariants
/// - `from <= to`; both are UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Window start.
    #[serde(with = "time::serde::rfc3339")]
    pub from: OffsetDateTime,
    /// Window end.
    #[serde(with = "time::serde::rfc3339")]
    pub to: OffsetDateTime,
    /// Half-window size in seconds.
    pub window_seconds: i64,
    /// Anchor the window was centered on (typically the run id).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selection_anchor: String,
}

/// Evidence pack manifest.
///
/// # Invariants
/// - `contents` paths are relative and stay within the pack root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackManifest {
    /// Schema identifier (`gait.guard.pack_manifest`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Pack creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Case identifier supplied by the operator.
    pub case_id: String,
    /// Compliance template identifier.
    pub template_id: String,
    /// Run the pack was anchored on.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    /// Files carried in the pack.
    pub contents: Vec<PackEntry>,
    /// Control index built from the template.
    pub control_index: Vec<Control>,
    /// Evidence pointers, path-ordered.
    pub evidence_ptrs: Vec<Evidence>,
    /// Rendered documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rendered: Vec<RenderedDoc>,
    /// Incident window, when the pack was incident-selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_window: Option<Window>,
    /// Signatures over the manifest digest.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<ManifestSignature>,
    /// Digest of the manifest without digest and signatures.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manifest_digest: String,
}

// ============================================================================
// SECTION: Encryption Envelope
// ============================================================================

/// Key source recorded with an encrypted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncryptedArtifactKey {
    /// Key source mode (`env` or `command`).
    pub mode: String,
    /// Environment variable name, for `env` mode.
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub ref_name: String,
    /// Command name, for `command` mode.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
}

/// AES-256-GCM envelope stored as canonical JSON (`.gaitenc`).
///
/// # Invariants
/// - `plain_sha256` is the digest of the decrypted payload and is checked
///   on every decrypt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedArtifact {
    /// Schema identifier (`gait.guard.encrypted_artifact`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Envelope creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Cipher algorithm (`aes-256-gcm`).
    pub algorithm: String,
    /// Key source used for encryption.
    pub key_source: EncryptedArtifactKey,
    /// Base64-encoded nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext.
    pub ciphertext: String,
    /// SHA-256 of the plaintext, hex-lower.
    pub plain_sha256: String,
    /// Plaintext size in bytes.
    pub plain_size: u64,
}

// ============================================================================
// SECTION: Retention Report
// ============================================================================

/// Sweep decision for one retained file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionFileEvent {
    /// File path.
    pub path: String,
    /// Classified kind (`trace` or `pack`).
    pub kind: String,
    /// File modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
    /// Age relative to the sweep time, in seconds.
    pub age_seconds: i64,
    /// Action taken (`kept` or `deleted`).
    pub action: String,
}

/// Retention sweep report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionReport {
    /// Schema identifier (`gait.guard.retention_report`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Sweep timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Root path that was swept.
    pub root_path: String,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Trace TTL in seconds.
    pub trace_ttl_seconds: i64,
    /// Pack TTL in seconds.
    pub pack_ttl_seconds: i64,
    /// Total classified files scanned.
    pub scanned_files: usize,
    /// Files deleted (or that would be, under dry run).
    pub deleted_files: Vec<RetentionFileEvent>,
    /// Files kept.
    pub kept_files: Vec<RetentionFileEvent>,
}
