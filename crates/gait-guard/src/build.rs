// crates/gait-guard/src/build.rs
// ============================================================================
// Module: Evidence Pack Builder
// Description: Assemble, index, optionally render, and verify evidence packs.
// Purpose: Bundle a runpack with its sidecars under a compliance template.
// Dependencies: gait-core, gait-runpack
// ============================================================================

//! ## Overview
//! The builder collects the runpack, operator-selected sidecars, and
//! generated summaries into a deterministic archive with a signed manifest.
//! Summary sidecars (`runpack_summary.json`, `trace_summary.json`,
//! `regress_summary.json`) are generated so control templates can anchor on
//! them even when the operator supplies nothing beyond the runpack.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use gait_core::jcs;
use gait_core::schema::guard::PackEntry;
use gait_core::schema::guard::PackEntryType;
use gait_core::schema::guard::PackManifest;
use gait_core::schema::guard::RenderedDoc;
use gait_core::schema::guard::Window;
use gait_core::sign::KeyPair;
use gait_core::sign::sign_manifest_bytes;
use gait_core::sign::verify_manifest_signature;
use gait_core::zipx::ZipEntry;
use gait_core::zipx::read_zip_entries;
use gait_core::zipx::write_deterministic_zip;
use gait_runpack::SignatureStatus;
use gait_runpack::read_runpack;
use serde_json::json;
use time::OffsetDateTime;

use crate::GuardError;
use crate::PACK_MANIFEST_SCHEMA_ID;
use crate::PACK_MANIFEST_SCHEMA_VERSION;
use crate::pdf::SummaryPdfOptions;
use crate::pdf::render_summary_pdf;
use crate::template::build_control_index;
use crate::template::build_evidence_pointers;
use crate::template::normalize_pack_path;
use crate::template::normalize_template_id;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for building one evidence pack.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Source runpack archive.
    pub runpack_path: PathBuf,
    /// Output pack path; defaults to `evidence_pack_<run_id>.zip` beside
    /// the runpack.
    pub output_path: Option<PathBuf>,
    /// Operator case identifier.
    pub case_id: String,
    /// Compliance template identifier.
    pub template_id: String,
    /// Trace sidecar paths to include.
    pub trace_paths: Vec<PathBuf>,
    /// Regression result paths to include.
    pub regress_paths: Vec<PathBuf>,
    /// Approval audit paths to include.
    pub approval_audit_paths: Vec<PathBuf>,
    /// Credential evidence paths to include.
    pub credential_evidence_paths: Vec<PathBuf>,
    /// Extra inline evidence files, keyed by pack path.
    pub extra_evidence_files: BTreeMap<String, Vec<u8>>,
    /// Whether to render `summary.pdf`.
    pub render_pdf: bool,
    /// Incident window, for incident-selected packs.
    pub incident_window: Option<Window>,
    /// Producer version stamped into the manifest.
    pub producer_version: String,
    /// Pack timestamp; the runpack's `created_at` when absent.
    pub now: Option<OffsetDateTime>,
}

/// Output of a successful pack build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Final pack path.
    pub path: PathBuf,
    /// The pack manifest as written.
    pub manifest: PackManifest,
}

/// Verification report for an evidence pack.
#[derive(Debug, Clone)]
pub struct PackVerifyResult {
    /// Case identifier from the manifest.
    pub case_id: String,
    /// Run identifier from the manifest.
    pub run_id: String,
    /// Recomputed manifest digest.
    pub manifest_digest: String,
    /// Manifest-listed entries absent from the archive.
    pub missing_files: Vec<String>,
    /// Entries whose bytes disagree with the manifest.
    pub hash_mismatches: Vec<String>,
    /// Signature verification status.
    pub signature_status: SignatureStatus,
    /// Signature errors, when any.
    pub signature_errors: Vec<String>,
}

impl PackVerifyResult {
    /// Returns true when no integrity or signature problem was found.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.missing_files.is_empty()
            && self.hash_mismatches.is_empty()
            && self.signature_status != SignatureStatus::Failed
            && self.signature_errors.is_empty()
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds an evidence pack, optionally signing its manifest.
///
/// # Errors
///
/// Returns [`GuardError`] on read, encoding, or write failure.
pub fn build_pack(
    options: &BuildOptions,
    keypair: Option<&KeyPair>,
) -> Result<BuildResult, GuardError> {
    if options.runpack_path.as_os_str().is_empty() {
        return Err(GuardError::MissingInput("runpack path"));
    }
    let pack = read_runpack(&options.runpack_path)?;
    let run_id = pack.run.run_id.clone();
    let created_at = options.now.unwrap_or(pack.run.created_at);
    let template_id = normalize_template_id(&options.template_id);

    let mut files: BTreeMap<String, (Vec<u8>, PackEntryType)> = BTreeMap::new();
    let runpack_name = file_name(&options.runpack_path);
    insert_file(
        &mut files,
        &runpack_name,
        fs::read(&options.runpack_path)?,
        PackEntryType::Runpack,
    )?;

    for path in &options.trace_paths {
        insert_file(&mut files, &file_name(path), fs::read(path)?, PackEntryType::Trace)?;
    }
    for path in &options.regress_paths {
        insert_file(&mut files, &file_name(path), fs::read(path)?, PackEntryType::Report)?;
    }
    for path in
        options.approval_audit_paths.iter().chain(options.credential_evidence_paths.iter())
    {
        insert_file(&mut files, &file_name(path), fs::read(path)?, PackEntryType::Evidence)?;
    }
    for (path, data) in &options.extra_evidence_files {
        insert_file(&mut files, path, data.clone(), PackEntryType::Evidence)?;
    }

    add_summaries(&mut files, &pack, options)?;

    let mut rendered = Vec::new();
    if options.render_pdf {
        let pdf = render_summary_pdf(&SummaryPdfOptions {
            run_id: run_id.clone(),
            case_id: options.case_id.clone(),
            template_id: template_id.clone(),
            generated_at: Some(created_at),
            evidence_paths: files.keys().cloned().collect(),
        });
        rendered.push(RenderedDoc {
            path: "summary.pdf".to_string(),
            sha256: jcs::digest_bytes(&pdf),
        });
        insert_file(&mut files, "summary.pdf", pdf, PackEntryType::Report)?;
    }

    // Index files are computed over the evidence set, then carried in the
    // pack alongside it.
    let evidence_contents = contents_of(&files);
    let control_index = build_control_index(&template_id, &evidence_contents);
    let evidence_ptrs = build_evidence_pointers(&evidence_contents);
    insert_file(
        &mut files,
        "control_index.json",
        jcs::canonical_json_bytes(&control_index)?,
        PackEntryType::Report,
    )?;
    insert_file(
        &mut files,
        "evidence_pointers.json",
        jcs::canonical_json_bytes(&evidence_ptrs)?,
        PackEntryType::Report,
    )?;

    let mut manifest = PackManifest {
        schema_id: PACK_MANIFEST_SCHEMA_ID.to_string(),
        schema_version: PACK_MANIFEST_SCHEMA_VERSION.to_string(),
        created_at,
        producer_version: if options.producer_version.is_empty() {
            gait_core::DEFAULT_PRODUCER_VERSION.to_string()
        } else {
            options.producer_version.clone()
        },
        case_id: options.case_id.clone(),
        template_id,
        run_id: run_id.clone(),
        contents: contents_of(&files),
        control_index,
        evidence_ptrs,
        rendered,
        incident_window: options.incident_window.clone(),
        signatures: Vec::new(),
        manifest_digest: String::new(),
    };

    let signable = signable_pack_manifest_bytes(&manifest)?;
    manifest.manifest_digest = jcs::digest_bytes(&signable);
    if let Some(keypair) = keypair {
        manifest.signatures = vec![sign_manifest_bytes(keypair, &signable)];
    }
    let manifest_bytes = jcs::canonical_json_bytes(&manifest)?;

    let mut entries: Vec<ZipEntry> = files
        .into_iter()
        .map(|(path, (data, _))| ZipEntry {
            path,
            data,
            mode: 0o644,
        })
        .collect();
    entries.push(ZipEntry {
        path: "manifest.json".to_string(),
        data: manifest_bytes,
        mode: 0o644,
    });

    let output_path = options.output_path.clone().unwrap_or_else(|| {
        options
            .runpack_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("evidence_pack_{run_id}.zip"))
    });
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let dir = output_path.parent().filter(|p| !p.as_os_str().is_empty());
    let temp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    write_deterministic_zip(temp.as_file(), &entries)?;
    temp.persist(&output_path).map_err(|err| GuardError::Io(err.error))?;
    tracing::debug!(
        run_id = %manifest.run_id,
        template = %manifest.template_id,
        entries = manifest.contents.len(),
        path = %output_path.display(),
        "built evidence pack"
    );

    Ok(BuildResult {
        path: output_path,
        manifest,
    })
}

/// Returns the canonical bytes the pack digest and signatures cover.
fn signable_pack_manifest_bytes(manifest: &PackManifest) -> Result<Vec<u8>, GuardError> {
    let mut unsigned = manifest.clone();
    unsigned.manifest_digest = String::new();
    unsigned.signatures = Vec::new();
    Ok(jcs::canonical_json_bytes(&unsigned)?)
}

fn add_summaries(
    files: &mut BTreeMap<String, (Vec<u8>, PackEntryType)>,
    pack: &gait_runpack::Runpack,
    options: &BuildOptions,
) -> Result<(), GuardError> {
    let runpack_summary = jcs::canonical_json_bytes(&json!({
        "run_id": pack.run.run_id,
        "manifest_digest": pack.manifest.manifest_digest,
        "intent_count": pack.intents.len(),
        "result_count": pack.results.len(),
        "receipt_count": pack.refs.receipts.len(),
    }))?;
    insert_file(files, "runpack_summary.json", runpack_summary, PackEntryType::Report)?;

    if !options.trace_paths.is_empty() {
        let mut trace_names: Vec<String> =
            options.trace_paths.iter().map(|path| file_name(path)).collect();
        trace_names.sort();
        let trace_summary = jcs::canonical_json_bytes(&json!({
            "trace_count": trace_names.len(),
            "traces": trace_names,
        }))?;
        insert_file(files, "trace_summary.json", trace_summary, PackEntryType::Report)?;
    }
    if !options.regress_paths.is_empty() {
        let mut regress_names: Vec<String> =
            options.regress_paths.iter().map(|path| file_name(path)).collect();
        regress_names.sort();
        let regress_summary = jcs::canonical_json_bytes(&json!({
            "regress_count": regress_names.len(),
            "results": regress_names,
        }))?;
        insert_file(files, "regress_summary.json", regress_summary, PackEntryType::Report)?;
    }
    Ok(())
}

fn insert_file(
    files: &mut BTreeMap<String, (Vec<u8>, PackEntryType)>,
    path: &str,
    data: Vec<u8>,
    entry_type: PackEntryType,
) -> Result<(), GuardError> {
    let normalized = normalize_pack_path(path)?;
    if files.contains_key(&normalized) {
        return Err(GuardError::DuplicateEntry(normalized));
    }
    files.insert(normalized, (data, entry_type));
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().to_string()).unwrap_or_default()
}

fn contents_of(files: &BTreeMap<String, (Vec<u8>, PackEntryType)>) -> Vec<PackEntry> {
    files
        .iter()
        .map(|(path, (data, entry_type))| PackEntry {
            path: path.clone(),
            entry_type: *entry_type,
            sha256: jcs::digest_bytes(data),
        })
        .collect()
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Verifies an evidence pack's entries, manifest digest, and signatures.
///
/// # Errors
///
/// Returns [`GuardError`] when the archive or manifest cannot be read.
pub fn verify_pack(
    path: &Path,
    public_key: Option<&ed25519_dalek::VerifyingKey>,
    require_signature: bool,
) -> Result<PackVerifyResult, GuardError> {
    let entries = read_zip_entries(path)?;
    let manifest_bytes = entries
        .get("manifest.json")
        .ok_or_else(|| GuardError::InvalidManifest("missing manifest.json".to_string()))?;
    let manifest: PackManifest = serde_json::from_slice(manifest_bytes)
        .map_err(|err| GuardError::InvalidManifest(err.to_string()))?;

    let mut missing_files = Vec::new();
    let mut hash_mismatches = Vec::new();
    for listed in &manifest.contents {
        match entries.get(&listed.path) {
            None => missing_files.push(listed.path.clone()),
            Some(bytes) => {
                if jcs::digest_bytes(bytes) != listed.sha256 {
                    hash_mismatches.push(listed.path.clone());
                }
            }
        }
    }

    let signable = signable_pack_manifest_bytes(&manifest)?;
    let manifest_digest = jcs::digest_bytes(&signable);
    let mut signature_errors = Vec::new();
    let signature_status = if manifest.signatures.is_empty() {
        if require_signature {
            signature_errors.push("signature required but none present".to_string());
        }
        SignatureStatus::Missing
    } else if let Some(public_key) = public_key {
        let mut status = SignatureStatus::Verified;
        for signature in &manifest.signatures {
            if let Err(err) = verify_manifest_signature(public_key, &signable, signature) {
                signature_errors.push(format!("key {}: {err}", signature.key_id));
                status = SignatureStatus::Failed;
            }
        }
        status
    } else {
        if require_signature {
            signature_errors.push("signature required but no public key provided".to_string());
        }
        SignatureStatus::Skipped
    };

    Ok(PackVerifyResult {
        case_id: manifest.case_id,
        run_id: manifest.run_id,
        manifest_digest,
        missing_files,
        hash_mismatches,
        signature_status,
        signature_errors,
    })
}
