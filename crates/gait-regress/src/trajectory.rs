// crates/gait-regress/src/trajectory.rs
// ============================================================================
// Module: Trajectory Derivation
// Description: Tool and verdict sequences derived from runpack records.
// Purpose: Give the trajectory grader stable sequences to compare.
// Dependencies: gait-runpack
// ============================================================================

//! ## Overview
//! The tool sequence is the recorded intent order; the verdict sequence
//! prefers an explicit `verdict` field in each result payload and falls
//! back to status mappings (ok/pass map to allow, block/deny to block,
//! approval to require_approval, simulate to dry_run, anything else to
//! error).

// ============================================================================
// SECTION: Imports
// ============================================================================

use gait_core::schema::runpack::ResultRecord;
use gait_runpack::Runpack;

use crate::RegressError;

// ============================================================================
// SECTION: Sequences
// ============================================================================

/// Returns the tool sequence of a runpack in recorded order.
#[must_use]
pub fn tool_sequence_from_runpack(pack: &Runpack) -> Vec<String> {
    pack.intents
        .iter()
        .map(|intent| intent.tool_name.trim())
        .filter(|tool_name| !tool_name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Returns the verdict sequence of a runpack in recorded result order.
#[must_use]
pub fn verdict_sequence_from_runpack(pack: &Runpack) -> Vec<String> {
    pack.results.iter().map(derive_trajectory_verdict).collect()
}

fn derive_trajectory_verdict(result: &ResultRecord) -> String {
    if let Some(payload) = &result.result {
        if let Some(raw) = payload.get("verdict") {
            let rendered = match raw {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            if let Some(normalized) = normalize_trajectory_verdict(&rendered) {
                return normalized;
            }
        }
    }
    match result.status.trim().to_lowercase().as_str() {
        "ok" | "pass" | "passed" | "success" => "allow".to_string(),
        "block" | "blocked" | "deny" | "denied" => "block".to_string(),
        "require_approval" | "approval_required" | "needs_approval" => {
            "require_approval".to_string()
        }
        "dry_run" | "dry-run" | "dryrun" | "simulate" | "simulated" => "dry_run".to_string(),
        _ => "error".to_string(),
    }
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes an expected tool sequence: trims entries, drops empties.
#[must_use]
pub fn normalize_tool_sequence(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Normalizes an expected verdict sequence.
///
/// # Errors
///
/// Returns [`RegressError::InvalidVerdict`] for unrecognized labels.
pub fn normalize_verdict_sequence(values: &[String]) -> Result<Vec<String>, RegressError> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized = normalize_trajectory_verdict(trimmed)
            .ok_or_else(|| RegressError::InvalidVerdict(trimmed.to_string()))?;
        out.push(normalized);
    }
    Ok(out)
}

fn normalize_trajectory_verdict(value: &str) -> Option<String> {
    let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
    let canonical = match normalized.as_str() {
        "allow" | "ok" | "pass" | "passed" | "success" => "allow",
        "block" | "blocked" | "deny" | "denied" => "block",
        "require_approval" | "approval_required" | "needs_approval" | "needsapproval" => {
            "require_approval"
        }
        "dry_run" | "dryrun" | "simulate" | "simulated" => "dry_run",
        "error" | "failed" | "failure" => "error",
        _ => return None,
    };
    Some(canonical.to_string())
}
