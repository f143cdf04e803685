// crates/gait-runpack/src/replay.rs
// ============================================================================
// Module: Replay Stub
// Description: Offline replay over recorded intents without tool execution.
// Purpose: Report recorded results in order and surface missing ones.
// Dependencies: gait-core, sha2
// ============================================================================

//! ## Overview
//! The replay stub never executes a tool. It walks intents in recorded
//! order and reports each recorded result; an intent without a result is
//! marked `missing_result`. When stub synthesis is enabled, intents whose
//! tool names classify into a known family (http, file, db, queue) receive
//! a `stubbed` step with a deterministic digest instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use gait_core::jcs::digest_bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::RunpackError;
use crate::read::read_runpack;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Replay mode label carried in replay results.
pub const REPLAY_MODE_STUB: &str = "stub";
/// Process exit code for a clean replay.
pub const REPLAY_EXIT_OK: i32 = 0;
/// Process exit code when the replay found missing results.
pub const REPLAY_EXIT_MISSING: i32 = 2;

/// Options for replay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// Synthesize deterministic stub results for classifiable tools
    /// instead of reporting them missing.
    pub synthesize_stubs: bool,
}

/// One replayed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStep {
    /// Intent identifier.
    pub intent_id: String,
    /// Tool name from the intent.
    pub tool_name: String,
    /// Step status: the recorded status, `stubbed`, or `missing_result`.
    pub status: String,
    /// Stub family for synthesized steps.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stub_type: String,
    /// Result digest, recorded or synthesized.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_digest: String,
}

/// Replay report for one runpack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Run identifier.
    pub run_id: String,
    /// Replay mode (`stub`).
    pub mode: String,
    /// Steps in intent order.
    pub steps: Vec<ReplayStep>,
    /// Intent ids with no recorded or synthesized result, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_results: Vec<String>,
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Replays a runpack without executing any tool.
///
/// # Errors
///
/// Returns [`RunpackError`] when the archive fails to read or carries
/// duplicate intent or result ids.
pub fn replay_stub(path: &Path, options: ReplayOptions) -> Result<ReplayResult, RunpackError> {
    let pack = read_runpack(path)?;

    let mut seen_intents = BTreeSet::new();
    for intent in &pack.intents {
        if !seen_intents.insert(intent.intent_id.as_str()) {
            return Err(RunpackError::DuplicateIntent(intent.intent_id.clone()));
        }
    }
    let mut results_by_intent: BTreeMap<&str, (&str, &str)> = BTreeMap::new();
    for result in &pack.results {
        if results_by_intent
            .insert(result.intent_id.as_str(), (result.status.as_str(), result.result_digest.as_str()))
            .is_some()
        {
            return Err(RunpackError::DuplicateResult(result.intent_id.clone()));
        }
    }

    let mut steps = Vec::with_capacity(pack.intents.len());
    let mut missing = Vec::new();
    for intent in &pack.intents {
        let mut step = ReplayStep {
            intent_id: intent.intent_id.clone(),
            tool_name: intent.tool_name.clone(),
            status: String::new(),
            stub_type: String::new(),
            result_digest: String::new(),
        };
        if let Some((status, digest)) = results_by_intent.get(intent.intent_id.as_str()) {
            step.status = (*status).to_string();
            step.result_digest = (*digest).to_string();
        } else {
            let stub_type =
                if options.synthesize_stubs { classify_stub_type(&intent.tool_name) } else { None };
            match stub_type {
                Some(family) => {
                    step.status = "stubbed".to_string();
                    step.stub_type = family.to_string();
                    step.result_digest = stub_digest(
                        &pack.run.run_id,
                        &intent.intent_id,
                        &intent.tool_name,
                        &intent.args_digest,
                        family,
                    );
                }
                None => {
                    step.status = "missing_result".to_string();
                    missing.push(intent.intent_id.clone());
                }
            }
        }
        steps.push(step);
    }
    missing.sort();

    Ok(ReplayResult {
        run_id: pack.run.run_id,
        mode: REPLAY_MODE_STUB.to_string(),
        steps,
        missing_results: missing,
    })
}

/// Maps a replay result to its process exit code.
#[must_use]
pub fn replay_exit_code(result: &ReplayResult) -> i32 {
    if result.missing_results.is_empty() { REPLAY_EXIT_OK } else { REPLAY_EXIT_MISSING }
}

// ============================================================================
// SECTION: Stub Synthesis
// ============================================================================

fn classify_stub_type(tool_name: &str) -> Option<&'static str> {
    let name = tool_name.trim().to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| name.contains(needle));
    if contains_any(&["http", "fetch", "url"]) {
        Some("http")
    } else if contains_any(&["file", "path", "fs", "write"]) {
        Some("file")
    } else if contains_any(&["db", "sql", "query", "table"]) {
        Some("db")
    } else if contains_any(&["queue", "topic", "publish", "kafka"]) {
        Some("queue")
    } else {
        None
    }
}

fn stub_digest(
    run_id: &str,
    intent_id: &str,
    tool_name: &str,
    args_digest: &str,
    stub_type: &str,
) -> String {
    let payload = format!(
        "{run_id}:{intent_id}:{}:{}:{stub_type}",
        tool_name.trim().to_lowercase(),
        args_digest.trim().to_lowercase(),
    );
    digest_bytes(payload.as_bytes())
}
