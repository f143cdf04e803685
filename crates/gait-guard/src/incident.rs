// crates/gait-guard/src/incident.rs
// ============================================================================
// Module: Incident Pack Builder
// Description: Windowed sidecar discovery around a runpack's creation time.
// Purpose: Assemble incident evidence without the operator naming files.
// Dependencies: gait-core, gait-runpack
// ============================================================================

//! ## Overview
//! An incident pack is an evidence pack whose sidecars are discovered by
//! filename convention in the runpack's directory and filtered to a time
//! window (default plus/minus 24 hours around the runpack `created_at`).
//! Approval audits and credential evidence are additionally filtered to the
//! trace ids observed in the window. The distinct policy digests seen in
//! the window land in a `policy_digests.json` sidecar.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use gait_core::jcs;
use gait_core::schema::gate::ApprovalAuditRecord;
use gait_core::schema::gate::BrokerCredentialRecord;
use gait_core::schema::gate::TraceRecord;
use gait_core::schema::guard::Window;
use gait_core::schema::regress::RegressResult;
use gait_core::sign::KeyPair;
use gait_runpack::read_runpack;
use serde_json::json;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::BuildOptions;
use crate::BuildResult;
use crate::GuardError;
use crate::build_pack;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for building one incident pack.
#[derive(Debug, Clone, Default)]
pub struct IncidentPackOptions {
    /// Anchor runpack archive.
    pub runpack_path: PathBuf,
    /// Output pack path; defaults to `incident_pack_<run_id>.zip` beside
    /// the runpack.
    pub output_path: Option<PathBuf>,
    /// Operator case identifier.
    pub case_id: String,
    /// Half-window size; 24 hours when absent or non-positive.
    pub window: Option<Duration>,
    /// Compliance template identifier.
    pub template_id: String,
    /// Whether to render `summary.pdf`.
    pub render_pdf: bool,
    /// Producer version stamped into the manifest.
    pub producer_version: String,
    /// Anchor override when the runpack carries no usable timestamp.
    pub now: Option<OffsetDateTime>,
}

/// Output of a successful incident pack build.
#[derive(Debug, Clone)]
pub struct IncidentPackResult {
    /// The underlying pack build result.
    pub build: BuildResult,
    /// Window start.
    pub window_from: OffsetDateTime,
    /// Window end.
    pub window_to: OffsetDateTime,
    /// Count of selected traces.
    pub trace_count: usize,
    /// Count of selected regression results.
    pub regress_count: usize,
    /// Count of selected approval audits.
    pub approval_audit_count: usize,
    /// Count of selected credential evidence records.
    pub credential_evidence_count: usize,
    /// Distinct policy digests observed in the window, sorted.
    pub policy_digests: Vec<String>,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds an incident pack around a runpack.
///
/// # Errors
///
/// Returns [`GuardError`] on read, discovery, or build failure.
pub fn build_incident_pack(
    options: &IncidentPackOptions,
    keypair: Option<&KeyPair>,
) -> Result<IncidentPackResult, GuardError> {
    if options.runpack_path.as_os_str().is_empty() {
        return Err(GuardError::MissingInput("runpack path"));
    }
    let pack = read_runpack(&options.runpack_path)?;
    let window = match options.window {
        Some(window) if window > Duration::ZERO => window,
        _ => Duration::hours(24),
    };
    let anchor = options.now.unwrap_or(pack.run.created_at);
    let window_from = anchor - window;
    let window_to = anchor + window;
    let root_dir =
        options.runpack_path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let traces = collect_traces(&root_dir, window_from, window_to)?;
    let regress_paths = collect_regress(&root_dir, window_from, window_to)?;
    let approval_paths =
        collect_records::<ApprovalAuditRecord>(&root_dir, "approval_audit_", window_from, window_to, &traces.trace_ids, |record| {
            (record.created_at, record.trace_id.clone())
        })?;
    let credential_paths =
        collect_records::<BrokerCredentialRecord>(&root_dir, "credential_evidence_", window_from, window_to, &traces.trace_ids, |record| {
            (record.created_at, record.trace_id.clone())
        })?;

    let policy_digest_payload = jcs::canonical_json_bytes(&json!({
        "run_id": &pack.run.run_id,
        "window_from": format_ts(window_from),
        "window_to": format_ts(window_to),
        "policy_digests": &traces.policy_digests,
    }))?;

    let trace_count = traces.paths.len();
    let regress_count = regress_paths.len();
    let approval_audit_count = approval_paths.len();
    let credential_evidence_count = credential_paths.len();

    let output_path = options.output_path.clone().unwrap_or_else(|| {
        root_dir.join(format!("incident_pack_{}.zip", pack.run.run_id))
    });
    let build = build_pack(
        &BuildOptions {
            runpack_path: options.runpack_path.clone(),
            output_path: Some(output_path),
            case_id: options.case_id.clone(),
            template_id: options.template_id.clone(),
            trace_paths: traces.paths,
            regress_paths,
            approval_audit_paths: approval_paths,
            credential_evidence_paths: credential_paths,
            extra_evidence_files: BTreeMap::from([(
                "policy_digests.json".to_string(),
                policy_digest_payload,
            )]),
            render_pdf: options.render_pdf,
            incident_window: Some(Window {
                from: window_from,
                to: window_to,
                window_seconds: window.whole_seconds(),
                selection_anchor: pack.run.run_id.clone(),
            }),
            producer_version: options.producer_version.clone(),
            now: Some(anchor),
        },
        keypair,
    )?;

    Ok(IncidentPackResult {
        build,
        window_from,
        window_to,
        trace_count,
        regress_count,
        approval_audit_count,
        credential_evidence_count,
        policy_digests: traces.policy_digests,
    })
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

struct TraceSelection {
    paths: Vec<PathBuf>,
    trace_ids: BTreeSet<String>,
    policy_digests: Vec<String>,
}

fn collect_traces(
    root_dir: &Path,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<TraceSelection, GuardError> {
    let mut paths = Vec::new();
    let mut trace_ids = BTreeSet::new();
    let mut policy_digest_set = BTreeSet::new();
    for path in discover(root_dir, "trace_", ".json")? {
        let Ok(raw) = fs::read(&path) else {
            continue;
        };
        let Ok(record) = serde_json::from_slice::<TraceRecord>(&raw) else {
            continue;
        };
        let Some(created_at) = record.created_at else {
            continue;
        };
        if created_at < from || created_at > to {
            continue;
        }
        paths.push(path);
        trace_ids.insert(record.trace_id);
        if !record.policy_digest.trim().is_empty() {
            policy_digest_set.insert(record.policy_digest);
        }
    }
    Ok(TraceSelection {
        paths,
        trace_ids,
        policy_digests: policy_digest_set.into_iter().collect(),
    })
}

fn collect_regress(
    root_dir: &Path,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<Vec<PathBuf>, GuardError> {
    let mut selected = Vec::new();
    for path in discover(root_dir, "regress", ".json")? {
        let Ok(raw) = fs::read(&path) else {
            continue;
        };
        let Ok(record) = serde_json::from_slice::<RegressResult>(&raw) else {
            continue;
        };
        if record.created_at < from || record.created_at > to {
            continue;
        }
        selected.push(path);
    }
    Ok(selected)
}

fn collect_records<T: serde::de::DeserializeOwned>(
    root_dir: &Path,
    prefix: &str,
    from: OffsetDateTime,
    to: OffsetDateTime,
    trace_ids: &BTreeSet<String>,
    extract: impl Fn(&T) -> (Option<OffsetDateTime>, String),
) -> Result<Vec<PathBuf>, GuardError> {
    let mut selected = Vec::new();
    for path in discover(root_dir, prefix, ".json")? {
        let Ok(raw) = fs::read(&path) else {
            continue;
        };
        let Ok(record) = serde_json::from_slice::<T>(&raw) else {
            continue;
        };
        let (created_at, trace_id) = extract(&record);
        let Some(created_at) = created_at else {
            continue;
        };
        if created_at < from || created_at > to {
            continue;
        }
        if !trace_ids.is_empty() && !trace_ids.contains(&trace_id) {
            continue;
        }
        selected.push(path);
    }
    Ok(selected)
}

fn discover(root_dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>, GuardError> {
    let mut out: Vec<PathBuf> = fs::read_dir(root_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.file_name().is_some_and(|name| {
                    let name = name.to_string_lossy();
                    name.starts_with(prefix) && name.ends_with(suffix)
                })
        })
        .collect();
    out.sort();
    Ok(out)
}

fn format_ts(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| "1980-01-01T00:00:00Z".to_string())
}
