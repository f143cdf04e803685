// crates/gait-core/src/gate/policytest.rs
// ============================================================================
// Module: Policy Test Runner
// Description: One-shot policy/intent evaluation with digests and a summary.
// Purpose: Back the `policy test` workflow with a deterministic report.
// Dependencies: crate::gate::{intent, policy}
// ============================================================================

//! ## Overview
//! Runs a single intent fixture against a single policy and enriches the
//! gate result with the policy and intent digests so callers can correlate
//! the verdict with the exact inputs that produced it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::gate::intent;
use crate::gate::policy;
use crate::gate::policy::EvalOptions;
use crate::gate::policy::EvalOutcome;
use crate::gate::policy::Policy;
use crate::gate::policy::PolicyError;
use crate::schema::gate::IntentRequest;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Options for a policy test run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Producer version stamped into the result.
    pub producer_version: String,
}

/// Result of a policy test run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Detailed evaluation outcome; the gate result carries the policy and
    /// intent digests.
    pub outcome: EvalOutcome,
    /// Human-readable one-line summary.
    pub summary: String,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Evaluates one intent against one policy.
///
/// # Errors
///
/// Returns [`PolicyError`] on policy or intent failure outside the
/// fail-closed path.
pub fn run(
    policy: &Policy,
    intent_request: &IntentRequest,
    opts: &RunOptions,
) -> Result<RunResult, PolicyError> {
    let mut outcome = policy::evaluate_policy_detailed(
        policy,
        intent_request,
        &EvalOptions {
            producer_version: opts.producer_version.clone(),
        },
    )?;
    outcome.result.policy_digest = policy::policy_digest(policy)?;
    // Intent digests are best-effort here: a fail-closed block for an
    // unevaluable intent has no normalized form to digest.
    if let Ok(digest) = intent::intent_digest(intent_request) {
        outcome.result.intent_digest = digest;
    }

    let summary = format!(
        "verdict={} reasons={} violations={}",
        outcome.result.verdict,
        join_or_dash(&outcome.result.reason_codes),
        join_or_dash(&outcome.result.violations),
    );
    Ok(RunResult {
        outcome,
        summary,
    })
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() { "-".to_string() } else { values.join(",") }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::jcs::is_hex_digest;
    use crate::schema::gate::IntentContext;
    use crate::schema::gate::Verdict;

    fn intent_fixture() -> IntentRequest {
        IntentRequest {
            tool_name: "tool.read".to_string(),
            args: Map::new(),
            context: IntentContext {
                identity: "agent@example".to_string(),
                workspace: "/repo".to_string(),
                risk_class: "low".to_string(),
                ..IntentContext::default()
            },
            ..IntentRequest::default()
        }
    }

    #[test]
    fn run_populates_digests_and_summary() {
        let result =
            run(&Policy::default(), &intent_fixture(), &RunOptions::default()).expect("run");
        assert_eq!(result.outcome.result.verdict, Verdict::RequireApproval);
        assert!(is_hex_digest(&result.outcome.result.policy_digest));
        assert!(is_hex_digest(&result.outcome.result.intent_digest));
        assert!(result.summary.starts_with("verdict=require_approval"));
    }
}
