// crates/gait-core/src/schema/gate.rs
// ============================================================================
// Module: Gate Records
// Description: Intent requests, gate results, traces, and audit sidecars.
// Purpose: Define the wire shapes consumed and produced by the gate pipeline.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! An intent request describes one proposed tool invocation; a gate result
//! is the verdict rendered for it. Trace, approval-audit, and
//! credential-evidence records are sidecar artifacts correlated by trace id
//! and collected into incident packs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// Closed verdict set for gate decisions.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - Unknown verdict strings are rejected at parse boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Permit the invocation.
    Allow,
    /// Refuse the invocation.
    Block,
    /// Simulate the invocation without side effects.
    DryRun,
    /// Suspend the invocation pending approvals.
    RequireApproval,
}

impl Verdict {
    /// Returns the stable wire label for the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::DryRun => "dry_run",
            Self::RequireApproval => "require_approval",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "allow" => Ok(Self::Allow),
            "block" => Ok(Self::Block),
            "dry_run" => Ok(Self::DryRun),
            "require_approval" => Ok(Self::RequireApproval),
            other => Err(format!("invalid verdict: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Intent Requests
// ============================================================================

/// One proposed tool invocation with targets, provenance, and context.
///
/// # Invariants
/// - After normalization, list fields are sorted and deduplicated and
///   `args_digest`/`intent_digest` match the normalized projection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntentRequest {
    /// Schema identifier (`gait.gate.intent_request`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Optional creation timestamp supplied by the caller.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    /// Tool name being invoked.
    pub tool_name: String,
    /// Tool arguments as a JSON object.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Digest of the normalized args.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args_digest: String,
    /// Digest of the full normalized intent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent_digest: String,
    /// Declared invocation targets.
    #[serde(default)]
    pub targets: Vec<IntentTarget>,
    /// Provenance of the argument values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arg_provenance: Vec<IntentArgProvenance>,
    /// Caller context.
    #[serde(default)]
    pub context: IntentContext,
}

/// A resource the invocation touches.
///
/// # Invariants
/// - `kind` is one of the closed target kinds; `kind`, `operation`, and
///   `sensitivity` are lowercase after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentTarget {
    /// Target kind (path, url, host, repo, bucket, table, queue, topic, other).
    pub kind: String,
    /// Target value; trimmed but case-preserved.
    pub value: String,
    /// Operation applied to the target.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,
    /// Data sensitivity label for the target.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sensitivity: String,
}

/// Provenance of one argument value.
///
/// # Invariants
/// - `source` is one of the closed provenance sources.
/// - `integrity_digest`, when present, is a lowercase 64-hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentArgProvenance {
    /// Path of the argument within `args`.
    pub arg_path: String,
    /// Origin of the value (user, tool_output, external, system).
    pub source: String,
    /// Reference into the originating artifact.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_ref: String,
    /// Digest attesting the value's integrity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub integrity_digest: String,
}

/// Caller context for an intent.
///
/// # Invariants
/// - `identity`, `workspace`, and `risk_class` are required after
///   normalization; `workspace` uses forward slashes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntentContext {
    /// Calling identity.
    #[serde(default)]
    pub identity: String,
    /// Workspace path or locator.
    #[serde(default)]
    pub workspace: String,
    /// Risk class label, lowercase after normalization.
    #[serde(default)]
    pub risk_class: String,
    /// Session identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    /// Request identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

// ============================================================================
// SECTION: Gate Results
// ============================================================================

/// Verdict rendered for a single intent.
///
/// # Invariants
/// - `reason_codes` and `violations` are sorted and deduplicated.
/// - `created_at` is the intent's UTC timestamp or the frozen 1980-01-01Z
///   fallback; never a wall-clock read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Schema identifier (`gait.gate.result`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Result timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Rendered verdict.
    pub verdict: Verdict,
    /// Sorted, deduplicated reason codes.
    pub reason_codes: Vec<String>,
    /// Sorted, deduplicated violations.
    pub violations: Vec<String>,
    /// Digest of the evaluated policy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy_digest: String,
    /// Digest of the normalized intent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent_digest: String,
}

// ============================================================================
// SECTION: Trace Records
// ============================================================================

/// Execution trace sidecar correlating a gate decision with a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Schema identifier (`gait.gate.trace`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Trace timestamp.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    /// Version of the producing engine.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub producer_version: String,
    /// Trace identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    /// Correlation identifier (typically the run id).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    /// Tool name that was gated.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,
    /// Digest of the normalized args.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args_digest: String,
    /// Digest of the normalized intent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent_digest: String,
    /// Digest of the evaluated policy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy_digest: String,
    /// Rendered verdict label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verdict: String,
    /// Violations observed at decision time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

// ============================================================================
// SECTION: Audit Sidecars
// ============================================================================

/// One recorded approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    /// Approving identity.
    pub approver: String,
    /// Approval timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub approved_at: OffsetDateTime,
}

/// Approval audit sidecar for a require-approval decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalAuditRecord {
    /// Schema identifier (`gait.gate.approval_audit`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Audit timestamp.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    /// Trace this audit belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    /// Approvals collected for the decision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvals: Vec<ApprovalEntry>,
    /// Minimum approvals the matched rule demanded.
    #[serde(default)]
    pub min_approvals: u32,
    /// Whether distinct approvers were required.
    #[serde(default)]
    pub require_distinct_approvers: bool,
}

/// Credential issuance evidence sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerCredentialRecord {
    /// Schema identifier (`gait.gate.credential_evidence`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// Schema version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_version: String,
    /// Issuance timestamp.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    /// Trace this credential was issued for.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    /// Broker that issued the credential.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issued_by: String,
    /// Opaque credential reference; never the material itself.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential_ref: String,
    /// Scopes granted with the credential.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}
