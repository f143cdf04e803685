// crates/gait-core/src/gate/policy.rs
// ============================================================================
// Module: Policy Normalization and Evaluation
// Description: YAML policy loading, rule matching, and verdict rendering.
// Purpose: Produce deterministic gate results with fail-closed semantics.
// Dependencies: crate::{jcs, schema, gate::intent}, serde_yaml
// ============================================================================

//! ## Overview
//! Policies are validated and normalized before any evaluation: enums are
//! closed, string lists are trimmed/deduplicated/sorted, defaults are
//! populated, and rules are ordered by `(priority, name)` so the first
//! match wins deterministically. Fail-closed mode converts missing required
//! intent fields — or an unevaluable intent — into a `block` verdict; this
//! is the only place a normalization failure becomes a verdict instead of
//! an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;

use crate::DEFAULT_PRODUCER_VERSION;
use crate::frozen_epoch;
use crate::gate::intent;
use crate::gate::intent::IntentError;
use crate::jcs;
use crate::schema::gate::GateResult;
use crate::schema::gate::IntentRequest;
use crate::schema::gate::Verdict;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema identifier for policies.
pub const POLICY_SCHEMA_ID: &str = "gait.gate.policy";
/// Schema version for policies.
pub const POLICY_SCHEMA_VERSION: &str = "1.0.0";
/// Schema identifier for gate results.
pub const GATE_RESULT_SCHEMA_ID: &str = "gait.gate.result";
/// Schema version for gate results.
pub const GATE_RESULT_SCHEMA_VERSION: &str = "1.0.0";
/// Default verdict applied when a policy does not set one.
const DEFAULT_VERDICT: &str = "require_approval";

const ALLOWED_REQUIRED_FIELDS: [&str; 2] = ["targets", "arg_provenance"];
const ALLOWED_RATE_LIMIT_WINDOWS: [&str; 2] = ["minute", "hour"];
const ALLOWED_RATE_LIMIT_SCOPES: [&str; 3] = ["tool", "identity", "tool_identity"];
const ALLOWED_DATAFLOW_ACTIONS: [&str; 2] = ["block", "require_approval"];
/// Default tainted sources when dataflow is enabled without any.
const DEFAULT_TAINTED_SOURCES: [&str; 2] = ["external", "tool_output"];

// ============================================================================
// SECTION: Policy Types
// ============================================================================

/// Tool-control policy loaded from YAML.
///
/// # Invariants
/// - After [`normalize_policy`], all lists are trimmed, deduplicated, and
///   sorted, enums are validated, and rules are ordered by
///   `(priority, name)` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Schema identifier (`gait.gate.policy`).
    #[serde(default)]
    pub schema_id: String,
    /// Schema version.
    #[serde(default)]
    pub schema_version: String,
    /// Verdict applied when no rule matches.
    #[serde(default)]
    pub default_verdict: String,
    /// Fail-closed configuration.
    #[serde(default)]
    pub fail_closed: FailClosedPolicy,
    /// Ordered rules; first match wins after normalization.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Fail-closed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailClosedPolicy {
    /// Whether fail-closed mode is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Risk classes the mode applies to; defaults to critical and high.
    #[serde(default)]
    pub risk_classes: Vec<String>,
    /// Intent fields that must be present (targets, arg_provenance).
    #[serde(default)]
    pub required_fields: Vec<String>,
}

/// One policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule name; unique names make the rule order total.
    #[serde(default)]
    pub name: String,
    /// Rule priority; lower evaluates first.
    #[serde(default)]
    pub priority: i64,
    /// Verdict applied when the rule matches.
    #[serde(default)]
    pub effect: String,
    /// Intent filters; every present filter must match.
    #[serde(default)]
    pub r#match: PolicyMatch,
    /// Reason codes emitted on match.
    #[serde(default)]
    pub reason_codes: Vec<String>,
    /// Violations emitted on match.
    #[serde(default)]
    pub violations: Vec<String>,
    /// Minimum approvals for require-approval effects.
    #[serde(default)]
    pub min_approvals: i64,
    /// Whether approvals must come from distinct approvers.
    #[serde(default)]
    pub require_distinct_approvers: bool,
    /// Whether a brokered credential is required.
    #[serde(default)]
    pub require_broker_credential: bool,
    /// Broker reference for credential issuance.
    #[serde(default)]
    pub broker_reference: String,
    /// Broker scopes to request.
    #[serde(default)]
    pub broker_scopes: Vec<String>,
    /// Rate limit applied on match.
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
    /// Dataflow overlay applied on match.
    #[serde(default)]
    pub dataflow: DataflowPolicy,
}

/// Intent filters for a rule. Every present filter must match (AND);
/// within a filter any element matches (OR). Empty filters are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyMatch {
    /// Tool names to match.
    #[serde(default)]
    pub tool_names: Vec<String>,
    /// Risk classes to match.
    #[serde(default)]
    pub risk_classes: Vec<String>,
    /// Target kinds to match.
    #[serde(default)]
    pub target_kinds: Vec<String>,
    /// Target values to match.
    #[serde(default)]
    pub target_values: Vec<String>,
    /// Target sensitivity labels to match.
    #[serde(default)]
    pub data_classes: Vec<String>,
    /// Destination target kinds to match.
    #[serde(default)]
    pub destination_kinds: Vec<String>,
    /// Destination target values to match.
    #[serde(default)]
    pub destination_values: Vec<String>,
    /// Destination target operations to match.
    #[serde(default)]
    pub destination_operations: Vec<String>,
    /// Provenance sources to match.
    #[serde(default)]
    pub provenance_sources: Vec<String>,
    /// Identities to match.
    #[serde(default)]
    pub identities: Vec<String>,
    /// Workspace prefixes to match.
    #[serde(default)]
    pub workspace_prefixes: Vec<String>,
}

/// Rate limit attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Allowed requests per window; 0 disables the limit.
    #[serde(default)]
    pub requests: i64,
    /// Window size (`minute` or `hour`); defaults to `minute`.
    #[serde(default)]
    pub window: String,
    /// Counter scope (`tool`, `identity`, `tool_identity`); defaults to
    /// `tool_identity`.
    #[serde(default)]
    pub scope: String,
}

/// Dataflow overlay attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataflowPolicy {
    /// Whether the overlay is active; implied by any populated filter.
    #[serde(default)]
    pub enabled: bool,
    /// Provenance sources considered tainted; defaults to external and
    /// tool_output.
    #[serde(default)]
    pub tainted_sources: Vec<String>,
    /// Destination kinds; empty falls back to the default egress kinds.
    #[serde(default)]
    pub destination_kinds: Vec<String>,
    /// Destination values.
    #[serde(default)]
    pub destination_values: Vec<String>,
    /// Destination operations.
    #[serde(default)]
    pub destination_operations: Vec<String>,
    /// Replacement effect on a hit (`block` or `require_approval`);
    /// defaults to `require_approval`.
    #[serde(default)]
    pub action: String,
    /// Reason code merged on a hit.
    #[serde(default)]
    pub reason_code: String,
    /// Violation merged on a hit.
    #[serde(default)]
    pub violation: String,
}

// ============================================================================
// SECTION: Evaluation Types
// ============================================================================

/// Options for policy evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    /// Producer version stamped into results.
    pub producer_version: String,
}

/// Detailed evaluation outcome for downstream enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    /// The rendered gate result.
    pub result: GateResult,
    /// Name of the matched rule; empty when none matched.
    pub matched_rule: String,
    /// Effective minimum approvals.
    pub min_approvals: i64,
    /// Whether approvals must come from distinct approvers.
    pub require_distinct_approvers: bool,
    /// Whether a brokered credential is required.
    pub require_broker_credential: bool,
    /// Broker reference from the matched rule.
    pub broker_reference: String,
    /// Broker scopes from the matched rule, sorted and unique.
    pub broker_scopes: Vec<String>,
    /// Rate limit from the matched rule.
    pub rate_limit: RateLimitPolicy,
    /// Whether the dataflow overlay replaced the rule effect.
    pub dataflow_triggered: bool,
}

/// Errors raised while loading, normalizing, or evaluating policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy file could not be read.
    #[error("read policy {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Policy YAML could not be parsed.
    #[error("parse policy yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// Schema identifier is not supported.
    #[error("unsupported policy schema_id: {0}")]
    UnsupportedSchemaId(String),
    /// Schema version is not supported.
    #[error("unsupported policy schema_version: {0}")]
    UnsupportedSchemaVersion(String),
    /// Default verdict is not a known verdict.
    #[error("invalid default_verdict: {0}")]
    InvalidDefaultVerdict(String),
    /// Fail-closed required field is unknown.
    #[error("unsupported fail_closed required_field: {0}")]
    UnsupportedRequiredField(String),
    /// A rule was missing its name.
    #[error("rule name is required")]
    RuleNameRequired,
    /// A rule was missing its effect.
    #[error("rule effect is required for {0}")]
    RuleEffectRequired(String),
    /// A rule effect is not a known verdict.
    #[error("invalid rule effect {effect:?} for {rule}")]
    InvalidRuleEffect {
        /// The offending effect string.
        effect: String,
        /// The rule carrying it.
        rule: String,
    },
    /// Minimum approvals were negative.
    #[error("min_approvals must be >= 0 for {0}")]
    NegativeMinApprovals(String),
    /// Rate limit request count was negative.
    #[error("rate_limit.requests must be >= 0 for {0}")]
    NegativeRateLimitRequests(String),
    /// Rate limit window is unknown.
    #[error("unsupported rate_limit.window {window:?} for {rule}")]
    UnsupportedRateLimitWindow {
        /// The offending window string.
        window: String,
        /// The rule carrying it.
        rule: String,
    },
    /// Rate limit scope is unknown.
    #[error("unsupported rate_limit.scope {scope:?} for {rule}")]
    UnsupportedRateLimitScope {
        /// The offending scope string.
        scope: String,
        /// The rule carrying it.
        rule: String,
    },
    /// Dataflow action is unknown.
    #[error("unsupported dataflow.action {action:?} for {rule}")]
    UnsupportedDataflowAction {
        /// The offending action string.
        action: String,
        /// The rule carrying it.
        rule: String,
    },
    /// Intent normalization failed outside the fail-closed path.
    #[error("normalize intent: {0}")]
    Intent(#[from] IntentError),
    /// Canonical encoding failed.
    #[error("digest policy: {0}")]
    Digest(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads and normalizes a policy from a YAML file.
///
/// # Errors
///
/// Returns [`PolicyError`] on read, parse, or validation failure.
pub fn load_policy_file(path: &Path) -> Result<Policy, PolicyError> {
    let content = fs::read(path).map_err(|source| PolicyError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_policy_yaml(&content)
}

/// Parses and normalizes a policy from YAML bytes.
///
/// # Errors
///
/// Returns [`PolicyError`] on parse or validation failure.
pub fn parse_policy_yaml(data: &[u8]) -> Result<Policy, PolicyError> {
    let policy: Policy = serde_yaml::from_slice(data)?;
    normalize_policy(&policy)
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Validates and normalizes a policy.
///
/// # Errors
///
/// Returns [`PolicyError`] when an enum, schema, or bound is invalid.
pub fn normalize_policy(input: &Policy) -> Result<Policy, PolicyError> {
    let mut output = input.clone();
    if output.schema_id.is_empty() {
        output.schema_id = POLICY_SCHEMA_ID.to_string();
    }
    if output.schema_id != POLICY_SCHEMA_ID {
        return Err(PolicyError::UnsupportedSchemaId(output.schema_id));
    }
    if output.schema_version.is_empty() {
        output.schema_version = POLICY_SCHEMA_VERSION.to_string();
    }
    if output.schema_version != POLICY_SCHEMA_VERSION {
        return Err(PolicyError::UnsupportedSchemaVersion(output.schema_version));
    }

    output.default_verdict = output.default_verdict.trim().to_lowercase();
    if output.default_verdict.is_empty() {
        output.default_verdict = DEFAULT_VERDICT.to_string();
    }
    if Verdict::from_str(&output.default_verdict).is_err() {
        return Err(PolicyError::InvalidDefaultVerdict(output.default_verdict));
    }

    output.fail_closed.risk_classes = normalize_string_list_lower(&output.fail_closed.risk_classes);
    if output.fail_closed.enabled && output.fail_closed.risk_classes.is_empty() {
        output.fail_closed.risk_classes = vec!["critical".to_string(), "high".to_string()];
    }
    output.fail_closed.required_fields =
        normalize_string_list_lower(&output.fail_closed.required_fields);
    for field in &output.fail_closed.required_fields {
        if !ALLOWED_REQUIRED_FIELDS.contains(&field.as_str()) {
            return Err(PolicyError::UnsupportedRequiredField(field.clone()));
        }
    }

    for rule in &mut output.rules {
        normalize_rule(rule)?;
    }
    output.rules.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));
    Ok(output)
}

fn normalize_rule(rule: &mut PolicyRule) -> Result<(), PolicyError> {
    rule.name = rule.name.trim().to_string();
    if rule.name.is_empty() {
        return Err(PolicyError::RuleNameRequired);
    }

    rule.effect = rule.effect.trim().to_lowercase();
    if rule.effect.is_empty() {
        return Err(PolicyError::RuleEffectRequired(rule.name.clone()));
    }
    if Verdict::from_str(&rule.effect).is_err() {
        return Err(PolicyError::InvalidRuleEffect {
            effect: rule.effect.clone(),
            rule: rule.name.clone(),
        });
    }

    rule.r#match.tool_names = normalize_string_list_lower(&rule.r#match.tool_names);
    rule.r#match.risk_classes = normalize_string_list_lower(&rule.r#match.risk_classes);
    rule.r#match.target_kinds = normalize_string_list_lower(&rule.r#match.target_kinds);
    rule.r#match.target_values = normalize_string_list(&rule.r#match.target_values);
    rule.r#match.data_classes = normalize_string_list_lower(&rule.r#match.data_classes);
    rule.r#match.destination_kinds = normalize_string_list_lower(&rule.r#match.destination_kinds);
    rule.r#match.destination_values = normalize_string_list(&rule.r#match.destination_values);
    rule.r#match.destination_operations =
        normalize_string_list_lower(&rule.r#match.destination_operations);
    rule.r#match.provenance_sources = normalize_string_list_lower(&rule.r#match.provenance_sources);
    rule.r#match.identities = normalize_string_list(&rule.r#match.identities);
    rule.r#match.workspace_prefixes = normalize_string_list(&rule.r#match.workspace_prefixes);
    rule.reason_codes = unique_sorted(&rule.reason_codes);
    rule.violations = unique_sorted(&rule.violations);

    if rule.min_approvals < 0 {
        return Err(PolicyError::NegativeMinApprovals(rule.name.clone()));
    }
    if rule.min_approvals > 1 {
        rule.require_distinct_approvers = true;
    }
    rule.broker_reference = rule.broker_reference.trim().to_string();
    rule.broker_scopes = normalize_string_list_lower(&rule.broker_scopes);

    if rule.rate_limit.requests < 0 {
        return Err(PolicyError::NegativeRateLimitRequests(rule.name.clone()));
    }
    rule.rate_limit.window = rule.rate_limit.window.trim().to_lowercase();
    rule.rate_limit.scope = rule.rate_limit.scope.trim().to_lowercase();
    if rule.rate_limit.requests > 0 {
        if rule.rate_limit.window.is_empty() {
            rule.rate_limit.window = "minute".to_string();
        }
        if !ALLOWED_RATE_LIMIT_WINDOWS.contains(&rule.rate_limit.window.as_str()) {
            return Err(PolicyError::UnsupportedRateLimitWindow {
                window: rule.rate_limit.window.clone(),
                rule: rule.name.clone(),
            });
        }
        if rule.rate_limit.scope.is_empty() {
            rule.rate_limit.scope = "tool_identity".to_string();
        }
        if !ALLOWED_RATE_LIMIT_SCOPES.contains(&rule.rate_limit.scope.as_str()) {
            return Err(PolicyError::UnsupportedRateLimitScope {
                scope: rule.rate_limit.scope.clone(),
                rule: rule.name.clone(),
            });
        }
    }

    rule.dataflow.tainted_sources = normalize_string_list_lower(&rule.dataflow.tainted_sources);
    rule.dataflow.destination_kinds = normalize_string_list_lower(&rule.dataflow.destination_kinds);
    rule.dataflow.destination_values = normalize_string_list(&rule.dataflow.destination_values);
    rule.dataflow.destination_operations =
        normalize_string_list_lower(&rule.dataflow.destination_operations);
    rule.dataflow.action = rule.dataflow.action.trim().to_lowercase();
    rule.dataflow.reason_code = rule.dataflow.reason_code.trim().to_string();
    rule.dataflow.violation = rule.dataflow.violation.trim().to_string();
    let dataflow_implied = rule.dataflow.enabled
        || !rule.dataflow.tainted_sources.is_empty()
        || !rule.dataflow.destination_kinds.is_empty()
        || !rule.dataflow.destination_values.is_empty()
        || !rule.dataflow.destination_operations.is_empty();
    if dataflow_implied {
        rule.dataflow.enabled = true;
        if rule.dataflow.tainted_sources.is_empty() {
            rule.dataflow.tainted_sources =
                DEFAULT_TAINTED_SOURCES.iter().map(ToString::to_string).collect();
        }
        if rule.dataflow.action.is_empty() {
            rule.dataflow.action = "require_approval".to_string();
        }
        if !ALLOWED_DATAFLOW_ACTIONS.contains(&rule.dataflow.action.as_str()) {
            return Err(PolicyError::UnsupportedDataflowAction {
                action: rule.dataflow.action.clone(),
                rule: rule.name.clone(),
            });
        }
        if rule.dataflow.reason_code.is_empty() {
            rule.dataflow.reason_code = "dataflow_tainted_destination".to_string();
        }
        if rule.dataflow.violation.is_empty() {
            rule.dataflow.violation = "tainted_dataflow".to_string();
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a policy against an intent and returns the gate result.
///
/// # Errors
///
/// Returns [`PolicyError`] on policy validation failure or on intent
/// normalization failure outside the fail-closed path.
pub fn evaluate_policy(
    policy: &Policy,
    intent: &IntentRequest,
    opts: &EvalOptions,
) -> Result<GateResult, PolicyError> {
    Ok(evaluate_policy_detailed(policy, intent, opts)?.result)
}

/// Evaluates a policy against an intent with the full outcome.
///
/// # Errors
///
/// Returns [`PolicyError`] on policy validation failure or on intent
/// normalization failure outside the fail-closed path.
pub fn evaluate_policy_detailed(
    policy: &Policy,
    intent: &IntentRequest,
    opts: &EvalOptions,
) -> Result<EvalOutcome, PolicyError> {
    let normalized_policy = normalize_policy(policy)?;

    let normalized_intent = match intent::normalize_intent(intent) {
        Ok(normalized) => normalized,
        Err(err) => {
            let risk_class = intent.context.risk_class.trim().to_lowercase();
            if should_fail_closed(&normalized_policy.fail_closed, &risk_class) {
                return Ok(EvalOutcome {
                    result: build_gate_result(
                        intent.created_at,
                        opts,
                        Verdict::Block,
                        &["fail_closed_intent_invalid".to_string()],
                        &["intent_not_evaluable".to_string()],
                    ),
                    ..empty_outcome()
                });
            }
            return Err(err.into());
        }
    };

    if should_fail_closed(&normalized_policy.fail_closed, &normalized_intent.context.risk_class) {
        let (reasons, violations) =
            missing_required_fields(&normalized_policy.fail_closed.required_fields, &normalized_intent);
        if !reasons.is_empty() {
            return Ok(EvalOutcome {
                result: build_gate_result(
                    normalized_intent.created_at,
                    opts,
                    Verdict::Block,
                    &reasons,
                    &violations,
                ),
                ..empty_outcome()
            });
        }
    }

    for rule in &normalized_policy.rules {
        if !rule_matches(&rule.r#match, &normalized_intent) {
            continue;
        }
        let mut effect = rule.effect.clone();
        let mut reasons = rule.reason_codes.clone();
        let mut violations = rule.violations.clone();
        if reasons.is_empty() {
            reasons = vec![format!("matched_rule_{}", sanitize_name(&rule.name))];
        }
        let dataflow_triggered = dataflow_hit(&rule.dataflow, &normalized_intent);
        if dataflow_triggered {
            effect = rule.dataflow.action.clone();
            reasons.push(rule.dataflow.reason_code.clone());
            violations.push(rule.dataflow.violation.clone());
        }
        let mut min_approvals = rule.min_approvals;
        if effect == "require_approval" && min_approvals == 0 {
            min_approvals = 1;
        }
        let verdict = Verdict::from_str(&effect).map_err(PolicyError::InvalidDefaultVerdict)?;
        return Ok(EvalOutcome {
            result: build_gate_result(
                normalized_intent.created_at,
                opts,
                verdict,
                &reasons,
                &violations,
            ),
            matched_rule: rule.name.clone(),
            min_approvals,
            require_distinct_approvers: rule.require_distinct_approvers,
            require_broker_credential: rule.require_broker_credential,
            broker_reference: rule.broker_reference.clone(),
            broker_scopes: rule.broker_scopes.clone(),
            rate_limit: rule.rate_limit.clone(),
            dataflow_triggered,
        });
    }

    let default_verdict = Verdict::from_str(&normalized_policy.default_verdict)
        .map_err(PolicyError::InvalidDefaultVerdict)?;
    let min_approvals = i64::from(default_verdict == Verdict::RequireApproval);
    Ok(EvalOutcome {
        result: build_gate_result(
            normalized_intent.created_at,
            opts,
            default_verdict,
            &[format!("default_{}", normalized_policy.default_verdict)],
            &[],
        ),
        min_approvals,
        ..empty_outcome()
    })
}

fn empty_outcome() -> EvalOutcome {
    EvalOutcome {
        result: build_gate_result(None, &EvalOptions::default(), Verdict::Block, &[], &[]),
        matched_rule: String::new(),
        min_approvals: 0,
        require_distinct_approvers: false,
        require_broker_credential: false,
        broker_reference: String::new(),
        broker_scopes: Vec::new(),
        rate_limit: RateLimitPolicy::default(),
        dataflow_triggered: false,
    }
}

// ============================================================================
// SECTION: Rule Matching
// ============================================================================

fn rule_matches(filters: &PolicyMatch, intent: &IntentRequest) -> bool {
    if !filters.tool_names.is_empty() && !filters.tool_names.contains(&intent.tool_name) {
        return false;
    }
    if !filters.risk_classes.is_empty()
        && !filters.risk_classes.contains(&intent.context.risk_class)
    {
        return false;
    }
    if !filters.identities.is_empty() && !filters.identities.contains(&intent.context.identity) {
        return false;
    }
    if !filters.workspace_prefixes.is_empty()
        && !filters
            .workspace_prefixes
            .iter()
            .any(|prefix| intent.context.workspace.starts_with(prefix.as_str()))
    {
        return false;
    }
    if !filters.target_kinds.is_empty()
        && !intent.targets.iter().any(|t| filters.target_kinds.contains(&t.kind))
    {
        return false;
    }
    if !filters.target_values.is_empty()
        && !intent.targets.iter().any(|t| filters.target_values.contains(&t.value))
    {
        return false;
    }
    if !filters.data_classes.is_empty()
        && !intent.targets.iter().any(|t| filters.data_classes.contains(&t.sensitivity))
    {
        return false;
    }
    if !filters.destination_kinds.is_empty()
        && !intent.targets.iter().any(|t| filters.destination_kinds.contains(&t.kind))
    {
        return false;
    }
    if !filters.destination_values.is_empty()
        && !intent.targets.iter().any(|t| filters.destination_values.contains(&t.value))
    {
        return false;
    }
    if !filters.destination_operations.is_empty()
        && !intent.targets.iter().any(|t| filters.destination_operations.contains(&t.operation))
    {
        return false;
    }
    if !filters.provenance_sources.is_empty()
        && !intent
            .arg_provenance
            .iter()
            .any(|p| filters.provenance_sources.contains(&p.source))
    {
        return false;
    }
    true
}

// ============================================================================
// SECTION: Dataflow Overlay
// ============================================================================

fn dataflow_hit(dataflow: &DataflowPolicy, intent: &IntentRequest) -> bool {
    if !dataflow.enabled {
        return false;
    }
    let tainted = intent
        .arg_provenance
        .iter()
        .any(|entry| dataflow.tainted_sources.contains(&entry.source));
    if !tainted {
        return false;
    }
    matches_dataflow_destination(dataflow, intent)
}

fn matches_dataflow_destination(dataflow: &DataflowPolicy, intent: &IntentRequest) -> bool {
    if intent.targets.is_empty() {
        return false;
    }
    if dataflow.destination_kinds.is_empty()
        && dataflow.destination_values.is_empty()
        && dataflow.destination_operations.is_empty()
    {
        return intent.targets.iter().any(|t| is_default_egress_kind(&t.kind));
    }
    intent.targets.iter().any(|target| {
        (dataflow.destination_kinds.is_empty() || dataflow.destination_kinds.contains(&target.kind))
            && (dataflow.destination_values.is_empty()
                || dataflow.destination_values.contains(&target.value))
            && (dataflow.destination_operations.is_empty()
                || dataflow.destination_operations.contains(&target.operation))
    })
}

fn is_default_egress_kind(kind: &str) -> bool {
    matches!(kind, "host" | "url" | "bucket" | "queue" | "topic")
}

// ============================================================================
// SECTION: Fail-Closed
// ============================================================================

fn should_fail_closed(policy: &FailClosedPolicy, risk_class: &str) -> bool {
    policy.enabled
        && !policy.risk_classes.is_empty()
        && policy.risk_classes.iter().any(|candidate| candidate == risk_class)
}

fn missing_required_fields(
    required_fields: &[String],
    intent: &IntentRequest,
) -> (Vec<String>, Vec<String>) {
    let mut reasons = Vec::new();
    let mut violations = Vec::new();
    for field in required_fields {
        match field.as_str() {
            "targets" if intent.targets.is_empty() => {
                reasons.push("fail_closed_missing_targets".to_string());
                violations.push("missing_targets".to_string());
            }
            "arg_provenance" if intent.arg_provenance.is_empty() => {
                reasons.push("fail_closed_missing_arg_provenance".to_string());
                violations.push("missing_arg_provenance".to_string());
            }
            _ => {}
        }
    }
    (unique_sorted(&reasons), unique_sorted(&violations))
}

// ============================================================================
// SECTION: Result Construction
// ============================================================================

fn build_gate_result(
    created_at: Option<OffsetDateTime>,
    opts: &EvalOptions,
    verdict: Verdict,
    reason_codes: &[String],
    violations: &[String],
) -> GateResult {
    let producer_version = if opts.producer_version.is_empty() {
        DEFAULT_PRODUCER_VERSION.to_string()
    } else {
        opts.producer_version.clone()
    };
    GateResult {
        schema_id: GATE_RESULT_SCHEMA_ID.to_string(),
        schema_version: GATE_RESULT_SCHEMA_VERSION.to_string(),
        created_at: created_at
            .map_or_else(frozen_epoch, |value| value.to_offset(time::UtcOffset::UTC)),
        producer_version,
        verdict,
        reason_codes: unique_sorted(reason_codes),
        violations: unique_sorted(violations),
        policy_digest: String::new(),
        intent_digest: String::new(),
    }
}

// ============================================================================
// SECTION: Policy Digest
// ============================================================================

/// Computes the canonical digest of the normalized policy.
///
/// # Errors
///
/// Returns [`PolicyError`] when normalization or encoding fails.
pub fn policy_digest(policy: &Policy) -> Result<String, PolicyError> {
    let normalized = normalize_policy(policy)?;
    jcs::digest_value(&digest_payload(&normalized))
        .map_err(|err| PolicyError::Digest(err.to_string()))
}

/// Builds the digest payload with its historical field names. Optional rule
/// fields appear only when set, so adding features never perturbs digests
/// of policies that do not use them.
fn digest_payload(policy: &Policy) -> Value {
    let rules: Vec<Value> = policy.rules.iter().map(rule_digest_payload).collect();
    json!({
        "SchemaID": policy.schema_id,
        "SchemaVersion": policy.schema_version,
        "DefaultVerdict": policy.default_verdict,
        "FailClosed": {
            "Enabled": policy.fail_closed.enabled,
            "RiskClasses": policy.fail_closed.risk_classes,
            "RequiredFields": policy.fail_closed.required_fields,
        },
        "Rules": rules,
    })
}

fn rule_digest_payload(rule: &PolicyRule) -> Value {
    let mut match_payload = BTreeMap::from([
        ("ToolNames", json!(rule.r#match.tool_names)),
        ("RiskClasses", json!(rule.r#match.risk_classes)),
        ("TargetKinds", json!(rule.r#match.target_kinds)),
        ("TargetValues", json!(rule.r#match.target_values)),
        ("ProvenanceSources", json!(rule.r#match.provenance_sources)),
        ("Identities", json!(rule.r#match.identities)),
        ("WorkspacePrefixes", json!(rule.r#match.workspace_prefixes)),
    ]);
    if !rule.r#match.data_classes.is_empty() {
        match_payload.insert("DataClasses", json!(rule.r#match.data_classes));
    }
    if !rule.r#match.destination_kinds.is_empty() {
        match_payload.insert("DestinationKinds", json!(rule.r#match.destination_kinds));
    }
    if !rule.r#match.destination_values.is_empty() {
        match_payload.insert("DestinationValues", json!(rule.r#match.destination_values));
    }
    if !rule.r#match.destination_operations.is_empty() {
        match_payload.insert("DestinationOps", json!(rule.r#match.destination_operations));
    }

    let mut payload = BTreeMap::from([
        ("Name", json!(rule.name)),
        ("Priority", json!(rule.priority)),
        ("Effect", json!(rule.effect)),
        ("Match", json!(match_payload)),
        ("ReasonCodes", json!(rule.reason_codes)),
        ("Violations", json!(rule.violations)),
    ]);
    if rule.min_approvals > 0 {
        payload.insert("MinApprovals", json!(rule.min_approvals));
    }
    if rule.require_distinct_approvers {
        payload.insert("RequireDistinctApprovers", json!(true));
    }
    if rule.require_broker_credential {
        payload.insert("RequireBrokerCredential", json!(true));
    }
    if !rule.broker_reference.is_empty() {
        payload.insert("BrokerReference", json!(rule.broker_reference));
    }
    if !rule.broker_scopes.is_empty() {
        payload.insert("BrokerScopes", json!(rule.broker_scopes));
    }
    if rule.rate_limit.requests > 0 {
        payload.insert(
            "RateLimit",
            json!({
                "Requests": rule.rate_limit.requests,
                "Window": rule.rate_limit.window,
                "Scope": rule.rate_limit.scope,
            }),
        );
    }
    if rule.dataflow.enabled {
        let mut dataflow = BTreeMap::from([
            ("Enabled", json!(true)),
            ("TaintedSources", json!(rule.dataflow.tainted_sources)),
            ("Action", json!(rule.dataflow.action)),
            ("ReasonCode", json!(rule.dataflow.reason_code)),
            ("Violation", json!(rule.dataflow.violation)),
        ]);
        if !rule.dataflow.destination_kinds.is_empty() {
            dataflow.insert("DestinationKinds", json!(rule.dataflow.destination_kinds));
        }
        if !rule.dataflow.destination_values.is_empty() {
            dataflow.insert("DestinationValues", json!(rule.dataflow.destination_values));
        }
        if !rule.dataflow.destination_operations.is_empty() {
            dataflow.insert("DestinationOperations", json!(rule.dataflow.destination_operations));
        }
        payload.insert("Dataflow", json!(dataflow));
    }
    json!(payload)
}

// ============================================================================
// SECTION: High-Risk Broker Checks
// ============================================================================

/// Returns true when any non-block high/critical rule lacks a broker
/// credential requirement.
#[must_use]
pub fn policy_has_high_risk_unbrokered_actions(policy: &Policy) -> bool {
    let Ok(normalized) = normalize_policy(policy) else {
        return false;
    };
    normalized
        .rules
        .iter()
        .any(|rule| is_high_risk_action_rule(rule) && !rule.require_broker_credential)
}

/// Returns true when any non-block high/critical rule requires a broker
/// credential.
#[must_use]
pub fn policy_requires_broker_for_high_risk(policy: &Policy) -> bool {
    let Ok(normalized) = normalize_policy(policy) else {
        return false;
    };
    normalized
        .rules
        .iter()
        .any(|rule| is_high_risk_action_rule(rule) && rule.require_broker_credential)
}

fn is_high_risk_action_rule(rule: &PolicyRule) -> bool {
    rule.effect != "block"
        && rule
            .r#match
            .risk_classes
            .iter()
            .any(|risk_class| risk_class == "high" || risk_class == "critical")
}

// ============================================================================
// SECTION: String Helpers
// ============================================================================

/// Trims entries, drops empties, deduplicates, and sorts.
#[must_use]
pub fn unique_sorted(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() || out.iter().any(|seen| seen == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out.sort();
    out
}

fn normalize_string_list(values: &[String]) -> Vec<String> {
    unique_sorted(values)
}

fn normalize_string_list_lower(values: &[String]) -> Vec<String> {
    let lowered: Vec<String> = values.iter().map(|value| value.trim().to_lowercase()).collect();
    unique_sorted(&lowered)
}

fn sanitize_name(value: &str) -> String {
    if value.is_empty() {
        return "rule".to_string();
    }
    value.to_lowercase().replace([' ', '-'], "_")
}
