// crates/gait-guard/src/retention.rs
// ============================================================================
// Module: Retention Sweeper
// Description: Scope-limited TTL sweep over trace and pack artifacts.
// Purpose: Delete aged artifacts by filename convention, with dry-run.
// Dependencies: gait-core
// ============================================================================

//! ## Overview
//! The sweeper walks a root, classifies files by name prefix and suffix
//! (`trace_*.json` as traces; `evidence_pack_*`/`incident_pack_*` with
//! `.zip` or `.gaitenc` as packs), and deletes files older than their
//! kind's TTL. A TTL of zero or less keeps everything; dry-run reports the
//! same decisions without deleting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use gait_core::jcs;
use gait_core::schema::guard::RetentionFileEvent;
use gait_core::schema::guard::RetentionReport;
use time::Duration;
use time::OffsetDateTime;

use crate::GuardError;
use crate::RETENTION_REPORT_SCHEMA_ID;
use crate::RETENTION_REPORT_SCHEMA_VERSION;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for one retention sweep.
#[derive(Debug, Clone)]
pub struct RetentionOptions {
    /// Root directory to walk.
    pub root_path: PathBuf,
    /// TTL for trace files; zero or less keeps all traces.
    pub trace_ttl: Duration,
    /// TTL for pack files; zero or less keeps all packs.
    pub pack_ttl: Duration,
    /// Report decisions without deleting.
    pub dry_run: bool,
    /// Optional report output path.
    pub report_output: Option<PathBuf>,
    /// Sweep timestamp; wall clock when absent.
    pub now: Option<OffsetDateTime>,
    /// Producer version stamped into the report.
    pub producer_version: String,
}

// ============================================================================
// SECTION: Sweep
// ============================================================================

/// Applies retention under the root and returns the sweep report.
///
/// # Errors
///
/// Returns [`GuardError`] on walk, delete, or report-write failure.
pub fn apply_retention(options: &RetentionOptions) -> Result<RetentionReport, GuardError> {
    let root = if options.root_path.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        options.root_path.clone()
    };
    let now = options.now.unwrap_or_else(OffsetDateTime::now_utc);

    let mut candidates = collect_candidates(&root)?;
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut report = RetentionReport {
        schema_id: RETENTION_REPORT_SCHEMA_ID.to_string(),
        schema_version: RETENTION_REPORT_SCHEMA_VERSION.to_string(),
        created_at: now,
        producer_version: if options.producer_version.is_empty() {
            gait_core::DEFAULT_PRODUCER_VERSION.to_string()
        } else {
            options.producer_version.clone()
        },
        root_path: root.display().to_string(),
        dry_run: options.dry_run,
        trace_ttl_seconds: options.trace_ttl.whole_seconds(),
        pack_ttl_seconds: options.pack_ttl.whole_seconds(),
        scanned_files: candidates.len(),
        deleted_files: Vec::new(),
        kept_files: Vec::new(),
    };

    for (path, kind, modified_at) in candidates {
        let ttl = if kind == "trace" { options.trace_ttl } else { options.pack_ttl };
        let age = (now - modified_at).max(Duration::ZERO);
        let mut event = RetentionFileEvent {
            path: path.display().to_string(),
            kind,
            modified_at,
            age_seconds: age.whole_seconds(),
            action: "kept".to_string(),
        };
        if ttl > Duration::ZERO && age > ttl {
            event.action = "deleted".to_string();
            if !options.dry_run {
                fs::remove_file(&path)?;
                tracing::debug!(path = %path.display(), "deleted aged artifact");
            }
            report.deleted_files.push(event);
        } else {
            report.kept_files.push(event);
        }
    }

    if let Some(report_path) = &options.report_output {
        if let Some(parent) = report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(report_path, jcs::canonical_json_bytes(&report)?)?;
    }
    Ok(report)
}

// ============================================================================
// SECTION: Classification
// ============================================================================

fn collect_candidates(
    root: &Path,
) -> Result<Vec<(PathBuf, String, OffsetDateTime)>, GuardError> {
    let mut out = Vec::new();
    walk(root, &mut out)?;
    Ok(out)
}

fn walk(
    dir: &Path,
    out: &mut Vec<(PathBuf, String, OffsetDateTime)>,
) -> Result<(), GuardError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out)?;
            continue;
        }
        let Some(kind) = classify_retention_file(&path) else {
            continue;
        };
        let modified = entry.metadata()?.modified()?;
        out.push((path, kind.to_string(), OffsetDateTime::from(modified)));
    }
    Ok(())
}

fn classify_retention_file(path: &Path) -> Option<&'static str> {
    let base = path.file_name()?.to_string_lossy().to_lowercase();
    if base.starts_with("trace_") && base.ends_with(".json") {
        return Some("trace");
    }
    let is_pack_prefix = base.starts_with("evidence_pack_") || base.starts_with("incident_pack_");
    if is_pack_prefix && (base.ends_with(".zip") || base.ends_with(".gaitenc")) {
        return Some("pack");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_naming_convention() {
        assert_eq!(classify_retention_file(Path::new("trace_run_1.json")), Some("trace"));
        assert_eq!(classify_retention_file(Path::new("evidence_pack_run_1.zip")), Some("pack"));
        assert_eq!(
            classify_retention_file(Path::new("incident_pack_run_1.gaitenc")),
            Some("pack")
        );
        assert_eq!(classify_retention_file(Path::new("runpack_run_1.zip")), None);
        assert_eq!(classify_retention_file(Path::new("trace_run_1.txt")), None);
    }
}
