// crates/gait-scout/src/top_actions.rs
// ============================================================================
// Module: Top Actions Scorer
// Description: Deterministic scoring and ranking of recorded actions.
// Purpose: Rank intents and traces by tool class, blast radius, and verdict.
// Dependencies: gait-core, gait-runpack
// ============================================================================

//! ## Overview
//! Score = tool class * 100 + blast radius * 10, plus verdict increments
//! (block +15, require_approval +12, error +8) and per-reason-code
//! increments (+2 for violation/blocked/approval/destructive/credential/
//! prompt_injection mentions, +1 otherwise). Candidates sort descending by
//! score, tool class, and blast radius, then ascending through the full
//! identity chain, so the report is a total order over its inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use gait_core::schema::gate::TraceRecord;
use gait_core::schema::runpack::RefReceipt;
use gait_runpack::read_runpack;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::DEFAULT_TOP_ACTIONS_LIMIT;
use crate::MAX_TOP_ACTIONS_LIMIT;
use crate::ScoutError;
use crate::TOP_ACTIONS_SCHEMA_ID;
use crate::TOP_ACTIONS_SCHEMA_VERSION;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for one report.
#[derive(Debug, Clone, Default)]
pub struct TopActionsInput {
    /// Runpack archives to score.
    pub runpack_paths: Vec<PathBuf>,
    /// Trace sidecars to score.
    pub trace_paths: Vec<PathBuf>,
    /// Rank limit; clamped to [1, 20], default 5.
    pub limit: usize,
}

/// Options for one report.
#[derive(Debug, Clone, Default)]
pub struct TopActionsOptions {
    /// Producer version stamped into the report.
    pub producer_version: String,
    /// Report timestamp; the frozen epoch when absent.
    pub now: Option<OffsetDateTime>,
}

/// One ranked action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopAction {
    /// Rank, 1-based.
    pub rank: usize,
    /// Composite score.
    pub score: i64,
    /// Tool class label.
    pub tool_class: String,
    /// Blast radius in [1, 3].
    pub blast_radius: i64,
    /// Run the action belongs to.
    pub run_id: String,
    /// Intent identifier, for runpack-sourced actions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent_id: String,
    /// Intent digest, for trace-sourced actions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent_digest: String,
    /// Trace identifier, for trace-sourced actions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Verdict label, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verdict: String,
    /// Reason codes feeding the score.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason_codes: Vec<String>,
    /// Source type (`runpack` or `trace`).
    pub source_type: String,
    /// Source artifact path.
    pub source_artifact: String,
}

/// Ranked report over the provided sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopActionsReport {
    /// Schema identifier (`gait.report.top_actions`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Report timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Count of distinct runs observed.
    pub run_count: usize,
    /// Count of trace sources.
    pub trace_count: usize,
    /// Count of scored candidates before ranking.
    pub action_count: usize,
    /// Ranked actions.
    pub top_actions: Vec<TopAction>,
}

struct Candidate {
    action: TopAction,
    tool_class_score: i64,
}

// ============================================================================
// SECTION: Report Builder
// ============================================================================

/// Builds a deterministic top-actions report.
///
/// # Errors
///
/// Returns [`ScoutError`] when inputs are empty or unreadable.
pub fn build_top_actions_report(
    input: &TopActionsInput,
    options: &TopActionsOptions,
) -> Result<TopActionsReport, ScoutError> {
    let runpack_paths = unique_sorted_paths(&input.runpack_paths);
    let trace_paths = unique_sorted_paths(&input.trace_paths);
    if runpack_paths.is_empty() && trace_paths.is_empty() {
        return Err(ScoutError::NoSources);
    }
    let limit = if input.limit == 0 {
        DEFAULT_TOP_ACTIONS_LIMIT
    } else {
        input.limit.min(MAX_TOP_ACTIONS_LIMIT)
    };

    let mut candidates = Vec::new();
    let mut run_ids = BTreeSet::new();
    for path in &runpack_paths {
        score_runpack(path, &mut candidates, &mut run_ids)?;
    }
    for path in &trace_paths {
        score_trace(path, &mut candidates, &mut run_ids)?;
    }
    if candidates.is_empty() {
        return Err(ScoutError::NoActions);
    }

    candidates.sort_by(compare_candidates);
    let limit = limit.min(candidates.len());
    let top_actions: Vec<TopAction> = candidates
        .iter()
        .take(limit)
        .enumerate()
        .map(|(index, candidate)| {
            let mut action = candidate.action.clone();
            action.rank = index + 1;
            action
        })
        .collect();

    Ok(TopActionsReport {
        schema_id: TOP_ACTIONS_SCHEMA_ID.to_string(),
        schema_version: TOP_ACTIONS_SCHEMA_VERSION.to_string(),
        created_at: options.now.unwrap_or_else(gait_core::frozen_epoch),
        producer_version: if options.producer_version.is_empty() {
            gait_core::DEFAULT_PRODUCER_VERSION.to_string()
        } else {
            options.producer_version.clone()
        },
        run_count: run_ids.len(),
        trace_count: trace_paths.len(),
        action_count: candidates.len(),
        top_actions,
    })
}

fn score_runpack(
    path: &Path,
    candidates: &mut Vec<Candidate>,
    run_ids: &mut BTreeSet<String>,
) -> Result<(), ScoutError> {
    let pack = read_runpack(path).map_err(|source| ScoutError::Runpack {
        path: path.display().to_string(),
        source,
    })?;
    let run_id = pack.run.run_id.trim().to_string();
    if run_id.is_empty() {
        return Err(ScoutError::MissingRunId(path.display().to_string()));
    }
    run_ids.insert(run_id.clone());

    let blast_radius = blast_radius_from_receipts(&pack.refs.receipts);
    let results_by_intent: BTreeMap<&str, String> = pack
        .results
        .iter()
        .filter(|result| !result.intent_id.trim().is_empty())
        .map(|result| {
            (
                result.intent_id.trim(),
                normalize_identifier(&result.status.trim().to_lowercase()),
            )
        })
        .collect();

    for intent in &pack.intents {
        let tool_name = intent.tool_name.trim();
        if tool_name.is_empty() {
            continue;
        }
        let intent_id = intent.intent_id.trim();
        let reason_codes = reason_codes_from_result_status(
            results_by_intent.get(intent_id).map_or("", String::as_str),
        );
        let tool_class = classify_tool_class(tool_name);
        let class_score = tool_class_score(tool_class);
        candidates.push(Candidate {
            action: TopAction {
                rank: 0,
                score: score(class_score, blast_radius, "", &reason_codes),
                tool_class: tool_class.to_string(),
                blast_radius,
                run_id: run_id.clone(),
                intent_id: intent_id.to_string(),
                intent_digest: String::new(),
                trace_id: String::new(),
                tool_name: tool_name.to_string(),
                verdict: String::new(),
                reason_codes,
                source_type: "runpack".to_string(),
                source_artifact: path.display().to_string(),
            },
            tool_class_score: class_score,
        });
    }
    Ok(())
}

fn score_trace(
    path: &Path,
    candidates: &mut Vec<Candidate>,
    run_ids: &mut BTreeSet<String>,
) -> Result<(), ScoutError> {
    let raw = std::fs::read(path).map_err(|source| ScoutError::TraceIo {
        path: path.display().to_string(),
        source,
    })?;
    let trace: TraceRecord =
        serde_json::from_slice(&raw).map_err(|err| ScoutError::TraceParse {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

    let mut run_id = trace.correlation_id.trim().to_string();
    if run_id.is_empty() {
        run_id = "unknown".to_string();
    }
    run_ids.insert(run_id.clone());

    let tool_name = trace.tool_name.trim();
    if tool_name.is_empty() {
        return Ok(());
    }
    let tool_class = classify_tool_class(tool_name);
    let class_score = tool_class_score(tool_class);
    let verdict = normalize_identifier(&trace.verdict.trim().to_lowercase());
    let reason_codes = reason_codes_from_trace(&trace, &verdict);
    let blast_radius = blast_radius_from_trace(&trace);
    candidates.push(Candidate {
        action: TopAction {
            rank: 0,
            score: score(class_score, blast_radius, &verdict, &reason_codes),
            tool_class: tool_class.to_string(),
            blast_radius,
            run_id,
            intent_id: String::new(),
            intent_digest: trace.intent_digest.trim().to_lowercase(),
            trace_id: trace.trace_id.trim().to_string(),
            tool_name: tool_name.to_string(),
            verdict,
            reason_codes,
            source_type: "trace".to_string(),
            source_artifact: path.display().to_string(),
        },
        tool_class_score: class_score,
    });
    Ok(())
}

// ============================================================================
// SECTION: Classification
// ============================================================================

fn classify_tool_class(tool_name: &str) -> &'static str {
    let name = tool_name.trim().to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| name.contains(needle));
    if contains_any(&["delete", "drop", "destroy", "remove", "truncate", "wipe", "purge"]) {
        "destructive"
    } else if contains_any(&[
        "payment", "customer", "finance", "pii", "ssn", "secret", "credential",
    ]) {
        "sensitive"
    } else if contains_any(&["http", "fetch", "url", "web", "external", "email", "send"]) {
        "external"
    } else if contains_any(&["write", "update", "insert", "publish", "queue", "db", "sql"]) {
        "internal"
    } else {
        "read_only"
    }
}

fn tool_class_score(tool_class: &str) -> i64 {
    match tool_class {
        "destructive" => 5,
        "sensitive" => 4,
        "external" => 3,
        "internal" => 2,
        _ => 1,
    }
}

fn blast_radius_from_receipts(receipts: &[RefReceipt]) -> i64 {
    if receipts.is_empty() {
        return 1;
    }
    let systems: BTreeSet<String> = receipts
        .iter()
        .map(|receipt| {
            format!("{} {}", receipt.source_type, receipt.source_locator).to_lowercase()
        })
        .collect();
    systems.iter().map(|system| keyword_radius(system)).max().unwrap_or(1)
}

fn blast_radius_from_trace(trace: &TraceRecord) -> i64 {
    let mut payload = trace.tool_name.clone();
    for violation in &trace.violations {
        payload.push(' ');
        payload.push_str(violation);
    }
    keyword_radius(&payload.to_lowercase())
}

fn keyword_radius(payload: &str) -> i64 {
    const WIDE: [&str; 9] = [
        "prod", "payment", "finance", "customer", "pii", "ssn", "delete", "drop", "destroy",
    ];
    const MEDIUM: [&str; 3] = ["internal", "staging", "queue"];
    if WIDE.iter().any(|needle| payload.contains(needle)) {
        3
    } else if MEDIUM.iter().any(|needle| payload.contains(needle)) {
        2
    } else {
        1
    }
}

// ============================================================================
// SECTION: Scoring
// ============================================================================

fn reason_codes_from_result_status(status: &str) -> Vec<String> {
    if status.is_empty() || status == "ok" || status == "success" {
        return Vec::new();
    }
    vec![format!("result_status_{status}")]
}

fn reason_codes_from_trace(trace: &TraceRecord, verdict: &str) -> Vec<String> {
    let mut codes = BTreeSet::new();
    if !verdict.is_empty() && verdict != "allow" {
        codes.insert(format!("trace_verdict_{verdict}"));
    }
    for violation in &trace.violations {
        let normalized = normalize_identifier(&violation.trim().to_lowercase());
        if !normalized.is_empty() {
            codes.insert(format!("violation_{normalized}"));
        }
    }
    codes.into_iter().collect()
}

fn score(tool_class: i64, blast_radius: i64, verdict: &str, reason_codes: &[String]) -> i64 {
    let mut score = tool_class * 100 + blast_radius * 10;
    score += match verdict {
        "block" => 15,
        "require_approval" => 12,
        "error" => 8,
        _ => 0,
    };
    for reason_code in reason_codes {
        let lower = reason_code.to_lowercase();
        let weighted = ["violation_", "blocked", "approval", "destructive", "credential", "prompt_injection"]
            .iter()
            .any(|needle| lower.contains(needle));
        score += if weighted { 2 } else { 1 };
    }
    score
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.action
        .score
        .cmp(&a.action.score)
        .then_with(|| b.tool_class_score.cmp(&a.tool_class_score))
        .then_with(|| b.action.blast_radius.cmp(&a.action.blast_radius))
        .then_with(|| a.action.run_id.cmp(&b.action.run_id))
        .then_with(|| a.action.intent_id.cmp(&b.action.intent_id))
        .then_with(|| a.action.intent_digest.cmp(&b.action.intent_digest))
        .then_with(|| a.action.trace_id.cmp(&b.action.trace_id))
        .then_with(|| a.action.tool_name.cmp(&b.action.tool_name))
        .then_with(|| a.action.source_type.cmp(&b.action.source_type))
        .then_with(|| a.action.source_artifact.cmp(&b.action.source_artifact))
}

fn normalize_identifier(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

fn unique_sorted_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let set: BTreeSet<PathBuf> = paths.iter().cloned().collect();
    set.into_iter().collect()
}
