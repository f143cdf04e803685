// crates/gait-guard/src/template.rs
// ============================================================================
// Module: Control Templates
// Description: Fixed compliance templates and control-index construction.
// Purpose: Map pack entries to the controls they evidence.
// Dependencies: gait-core
// ============================================================================

//! ## Overview
//! Three fixed templates exist: `soc2`, `pci`, and `incident_response`. An
//! entry matches a control when its type is in the control's entry-type set
//! or its path contains one of the control's substrings. Empty template ids
//! default to `soc2`; unknown ids fall back to `incident_response`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use gait_core::schema::guard::Control;
use gait_core::schema::guard::Evidence;
use gait_core::schema::guard::PackEntry;
use gait_core::schema::guard::PackEntryType;

use crate::GuardError;

// ============================================================================
// SECTION: Template Table
// ============================================================================

/// Default template applied for empty template ids.
pub const DEFAULT_TEMPLATE_ID: &str = "soc2";
/// Template for incident reconstruction.
pub const INCIDENT_TEMPLATE_ID: &str = "incident_response";

struct ControlTemplate {
    id: &'static str,
    title: &'static str,
    entry_types: &'static [PackEntryType],
    path_matches: &'static [&'static str],
}

const SOC2_CONTROLS: &[ControlTemplate] = &[
    ControlTemplate {
        id: "CC6.6",
        title: "Change Management Evidence",
        entry_types: &[PackEntryType::Trace, PackEntryType::Evidence],
        path_matches: &["approval_audit_", "credential_evidence_"],
    },
    ControlTemplate {
        id: "CC7.2",
        title: "Operational Monitoring",
        entry_types: &[PackEntryType::Report],
        path_matches: &["regress_summary.json", "trace_summary.json"],
    },
    ControlTemplate {
        id: "CC8.1",
        title: "Incident Evidence Integrity",
        entry_types: &[PackEntryType::Runpack, PackEntryType::Evidence],
        path_matches: &["runpack_summary.json", "referenced_runpacks.json"],
    },
];

const PCI_CONTROLS: &[ControlTemplate] = &[
    ControlTemplate {
        id: "PCI-10",
        title: "Audit Trail and Monitoring",
        entry_types: &[PackEntryType::Trace, PackEntryType::Report],
        path_matches: &["trace_summary.json"],
    },
    ControlTemplate {
        id: "PCI-7",
        title: "Access and Approval Controls",
        entry_types: &[PackEntryType::Evidence],
        path_matches: &["approval_audit_", "credential_evidence_"],
    },
    ControlTemplate {
        id: "PCI-12",
        title: "Incident Handling Evidence",
        entry_types: &[PackEntryType::Runpack, PackEntryType::Report],
        path_matches: &["runpack_summary.json", "regress_summary.json"],
    },
];

const INCIDENT_CONTROLS: &[ControlTemplate] = &[
    ControlTemplate {
        id: "IR-CHAIN",
        title: "Reconstruction Chain",
        entry_types: &[PackEntryType::Runpack, PackEntryType::Trace, PackEntryType::Evidence],
        path_matches: &[
            "runpack_summary.json",
            "trace_summary.json",
            "approval_audit_",
            "credential_evidence_",
        ],
    },
    ControlTemplate {
        id: "IR-ROOTCAUSE",
        title: "Root Cause and Regression",
        entry_types: &[PackEntryType::Report],
        path_matches: &["regress_summary.json", "policy_digests.json"],
    },
];

fn controls_for(template_id: &str) -> &'static [ControlTemplate] {
    match template_id {
        "soc2" => SOC2_CONTROLS,
        "pci" => PCI_CONTROLS,
        _ => INCIDENT_CONTROLS,
    }
}

// ============================================================================
// SECTION: Template Resolution
// ============================================================================

/// Resolves a template id: empty defaults to `soc2`, unknown ids fall back
/// to `incident_response`.
#[must_use]
pub fn normalize_template_id(template_id: &str) -> String {
    let trimmed = template_id.trim().to_lowercase();
    if trimmed.is_empty() {
        return DEFAULT_TEMPLATE_ID.to_string();
    }
    match trimmed.as_str() {
        "soc2" | "pci" | "incident_response" => trimmed,
        _ => INCIDENT_TEMPLATE_ID.to_string(),
    }
}

// ============================================================================
// SECTION: Control Index
// ============================================================================

/// Builds the control index for a template over pack contents.
#[must_use]
pub fn build_control_index(template_id: &str, contents: &[PackEntry]) -> Vec<Control> {
    controls_for(template_id)
        .iter()
        .map(|template| {
            let mut paths: Vec<String> = contents
                .iter()
                .filter(|entry| matches_control(entry, template))
                .map(|entry| entry.path.clone())
                .collect();
            paths.sort();
            paths.dedup();
            Control {
                control_id: template.id.to_string(),
                title: template.title.to_string(),
                evidence_paths: paths,
            }
        })
        .collect()
}

fn matches_control(entry: &PackEntry, template: &ControlTemplate) -> bool {
    let path = entry.path.trim();
    if path.is_empty() {
        return false;
    }
    template.entry_types.contains(&entry.entry_type)
        || template.path_matches.iter().any(|candidate| path.contains(candidate))
}

// ============================================================================
// SECTION: Evidence Pointers
// ============================================================================

/// Builds stable, path-ordered evidence pointers over pack contents.
#[must_use]
pub fn build_evidence_pointers(contents: &[PackEntry]) -> Vec<Evidence> {
    let mut sorted: Vec<&PackEntry> = contents.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    sorted
        .iter()
        .enumerate()
        .map(|(index, entry)| Evidence {
            pointer_id: format!("ev_{:03}", index + 1),
            path: entry.path.clone(),
            entry_type: entry.entry_type,
            sha256: entry.sha256.clone(),
        })
        .collect()
}

// ============================================================================
// SECTION: Path Safety
// ============================================================================

/// Normalizes a pack-relative path, rejecting absolute and escaping paths.
///
/// # Errors
///
/// Returns [`GuardError::UnsafePath`] when the path leaves the pack root.
pub fn normalize_pack_path(path: &str) -> Result<String, GuardError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(GuardError::UnsafePath(path.to_string()));
    }
    let slashed = trimmed.replace('\\', "/");
    if slashed.starts_with('/')
        || slashed == "."
        || slashed.split('/').any(|segment| segment == "..")
    {
        return Err(GuardError::UnsafePath(path.to_string()));
    }
    Ok(slashed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, entry_type: PackEntryType) -> PackEntry {
        PackEntry {
            path: path.to_string(),
            entry_type,
            sha256: "0".repeat(64),
        }
    }

    #[test]
    fn template_resolution_defaults_and_falls_back() {
        assert_eq!(normalize_template_id(""), "soc2");
        assert_eq!(normalize_template_id("PCI"), "pci");
        assert_eq!(normalize_template_id("hipaa"), "incident_response");
    }

    #[test]
    fn control_index_matches_by_type_or_path() {
        let contents = vec![
            entry("runpack_run_1.zip", PackEntryType::Runpack),
            entry("approval_audit_001.json", PackEntryType::Evidence),
            entry("regress_summary.json", PackEntryType::Report),
        ];
        let controls = build_control_index("incident_response", &contents);
        assert_eq!(controls.len(), 2);
        assert!(controls[0].evidence_paths.contains(&"runpack_run_1.zip".to_string()));
        assert!(controls[1].evidence_paths.contains(&"regress_summary.json".to_string()));
    }

    #[test]
    fn evidence_pointers_are_path_ordered() {
        let contents = vec![
            entry("zz.json", PackEntryType::Evidence),
            entry("aa.json", PackEntryType::Trace),
        ];
        let pointers = build_evidence_pointers(&contents);
        assert_eq!(pointers[0].pointer_id, "ev_001");
        assert_eq!(pointers[0].path, "aa.json");
        assert_eq!(pointers[1].pointer_id, "ev_002");
    }

    #[test]
    fn unsafe_paths_are_rejected() {
        assert!(normalize_pack_path("../escape.json").is_err());
        assert!(normalize_pack_path("/abs.json").is_err());
        assert!(normalize_pack_path("  ").is_err());
        assert_eq!(normalize_pack_path("sub\\inner.json").expect("ok"), "sub/inner.json");
    }
}
