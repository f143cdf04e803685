// crates/gait-core/src/gate/intent.rs
// ============================================================================
// Module: Intent Normalization
// Description: Stable-form derivation for intent requests.
// Purpose: Feed one normalized shape into every digest and rule match.
// Dependencies: crate::{jcs, schema}, serde_json
// ============================================================================

//! ## Overview
//! Normalization trims and lower-cases where the wire contract demands it,
//! rejects unknown enum members at the boundary, removes duplicates, sorts
//! every list, and derives `args_digest` and `intent_digest` over the
//! canonical projection. Two requests that normalize to the same logical
//! intent digest identically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::jcs;
use crate::jcs::is_hex_digest;
use crate::schema::gate::IntentArgProvenance;
use crate::schema::gate::IntentContext;
use crate::schema::gate::IntentRequest;
use crate::schema::gate::IntentTarget;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema identifier applied to normalized intent requests.
pub const INTENT_REQUEST_SCHEMA_ID: &str = "gait.gate.intent_request";
/// Schema version applied to normalized intent requests.
pub const INTENT_REQUEST_SCHEMA_VERSION: &str = "1.0.0";

/// Closed set of target kinds.
const ALLOWED_TARGET_KINDS: [&str; 9] =
    ["path", "url", "host", "repo", "bucket", "table", "queue", "topic", "other"];
/// Closed set of provenance sources.
const ALLOWED_PROVENANCE_SOURCES: [&str; 4] = ["user", "tool_output", "external", "system"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while normalizing an intent.
#[derive(Debug, Error)]
pub enum IntentError {
    /// A required field was missing or empty.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// A target carried an unknown kind.
    #[error("unsupported target kind: {0}")]
    UnsupportedTargetKind(String),
    /// A target was missing its kind or value.
    #[error("targets require kind and value")]
    TargetIncomplete,
    /// A provenance entry was missing its arg path or source.
    #[error("arg provenance requires arg_path and source")]
    ProvenanceIncomplete,
    /// A provenance entry carried an unknown source.
    #[error("unsupported provenance source: {0}")]
    UnsupportedProvenanceSource(String),
    /// An integrity digest was not a lowercase 64-hex string.
    #[error("invalid provenance integrity_digest: {0}")]
    BadDigest(String),
    /// Args contained an empty object key.
    #[error("args contains empty key")]
    EmptyArgKey,
    /// A value could not be represented as canonical JSON.
    #[error("json not representable: {0}")]
    JsonNotRepresentable(String),
}

// ============================================================================
// SECTION: Normalized Projection
// ============================================================================

/// The digest-participating projection of a normalized intent.
#[derive(Debug, Clone, Serialize)]
struct NormalizedIntent {
    /// Trimmed tool name.
    tool_name: String,
    /// Normalized args object.
    args: Map<String, Value>,
    /// Normalized, sorted, deduplicated targets.
    targets: Vec<IntentTarget>,
    /// Normalized, sorted, deduplicated provenance.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    arg_provenance: Vec<IntentArgProvenance>,
    /// Normalized context.
    context: IntentContext,
}

// ============================================================================
// SECTION: Public Operations
// ============================================================================

/// Normalizes an intent request and derives its digests.
///
/// The returned request carries normalized fields, populated schema
/// id/version defaults, and fresh `args_digest`/`intent_digest` values.
///
/// # Errors
///
/// Returns [`IntentError`] when validation fails.
pub fn normalize_intent(input: &IntentRequest) -> Result<IntentRequest, IntentError> {
    let normalized = normalize_projection(input)?;
    let args_digest = digest_args(&normalized.args)?;
    let intent_digest = digest_projection(&normalized)?;

    let mut output = input.clone();
    if output.schema_id.is_empty() {
        output.schema_id = INTENT_REQUEST_SCHEMA_ID.to_string();
    }
    if output.schema_version.is_empty() {
        output.schema_version = INTENT_REQUEST_SCHEMA_VERSION.to_string();
    }
    output.tool_name = normalized.tool_name;
    output.args = normalized.args;
    output.args_digest = args_digest;
    output.intent_digest = intent_digest;
    output.targets = normalized.targets;
    output.arg_provenance = normalized.arg_provenance;
    output.context = normalized.context;
    Ok(output)
}

/// Returns the canonical bytes of the normalized intent projection.
///
/// # Errors
///
/// Returns [`IntentError`] when normalization or encoding fails.
pub fn normalized_intent_bytes(input: &IntentRequest) -> Result<Vec<u8>, IntentError> {
    let normalized = normalize_projection(input)?;
    jcs::canonical_json_bytes(&normalized)
        .map_err(|err| IntentError::JsonNotRepresentable(err.to_string()))
}

/// Computes the digest of the normalized intent.
///
/// # Errors
///
/// Returns [`IntentError`] when normalization fails.
pub fn intent_digest(input: &IntentRequest) -> Result<String, IntentError> {
    digest_projection(&normalize_projection(input)?)
}

/// Normalizes an args object and computes its digest.
///
/// # Errors
///
/// Returns [`IntentError`] when normalization fails.
pub fn args_digest(args: &Map<String, Value>) -> Result<String, IntentError> {
    digest_args(&normalize_args(args)?)
}

// ============================================================================
// SECTION: Normalization Steps
// ============================================================================

fn normalize_projection(input: &IntentRequest) -> Result<NormalizedIntent, IntentError> {
    let tool_name = input.tool_name.trim().to_string();
    if tool_name.is_empty() {
        return Err(IntentError::MissingField("tool_name"));
    }

    Ok(NormalizedIntent {
        tool_name,
        args: normalize_args(&input.args)?,
        targets: normalize_targets(&input.targets)?,
        arg_provenance: normalize_provenance(&input.arg_provenance)?,
        context: normalize_context(&input.context)?,
    })
}

fn normalize_args(args: &Map<String, Value>) -> Result<Map<String, Value>, IntentError> {
    let mut out = Map::with_capacity(args.len());
    for (key, value) in args {
        let key = key.trim();
        if key.is_empty() {
            return Err(IntentError::EmptyArgKey);
        }
        out.insert(key.to_string(), normalize_json_value(value)?);
    }
    Ok(out)
}

/// Recursively normalizes a JSON value: strings trimmed, numbers, booleans,
/// and nulls passed through, objects and arrays recursed.
fn normalize_json_value(value: &Value) -> Result<Value, IntentError> {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
        Value::String(text) => Ok(Value::String(text.trim().to_string())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(normalize_json_value(item)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => Ok(Value::Object(normalize_args(map)?)),
    }
}

fn normalize_targets(targets: &[IntentTarget]) -> Result<Vec<IntentTarget>, IntentError> {
    let mut out: Vec<IntentTarget> = Vec::with_capacity(targets.len());
    for target in targets {
        let kind = target.kind.trim().to_lowercase();
        let value = target.value.trim().to_string();
        let operation = target.operation.trim().to_lowercase();
        let sensitivity = target.sensitivity.trim().to_lowercase();

        if kind.is_empty() || value.is_empty() {
            return Err(IntentError::TargetIncomplete);
        }
        if !ALLOWED_TARGET_KINDS.contains(&kind.as_str()) {
            return Err(IntentError::UnsupportedTargetKind(kind));
        }

        let normalized = IntentTarget {
            kind,
            value,
            operation,
            sensitivity,
        };
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out.sort_by(|a, b| {
        (&a.kind, &a.value, &a.operation, &a.sensitivity).cmp(&(
            &b.kind,
            &b.value,
            &b.operation,
            &b.sensitivity,
        ))
    });
    Ok(out)
}

fn normalize_provenance(
    provenance: &[IntentArgProvenance],
) -> Result<Vec<IntentArgProvenance>, IntentError> {
    let mut out: Vec<IntentArgProvenance> = Vec::with_capacity(provenance.len());
    for entry in provenance {
        let arg_path = entry.arg_path.trim().to_string();
        let source = entry.source.trim().to_lowercase();
        let source_ref = entry.source_ref.trim().to_string();
        let integrity_digest = entry.integrity_digest.trim().to_lowercase();

        if arg_path.is_empty() || source.is_empty() {
            return Err(IntentError::ProvenanceIncomplete);
        }
        if !ALLOWED_PROVENANCE_SOURCES.contains(&source.as_str()) {
            return Err(IntentError::UnsupportedProvenanceSource(source));
        }
        if !integrity_digest.is_empty() && !is_hex_digest(&integrity_digest) {
            return Err(IntentError::BadDigest(integrity_digest));
        }

        let normalized = IntentArgProvenance {
            arg_path,
            source,
            source_ref,
            integrity_digest,
        };
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out.sort_by(|a, b| {
        (&a.arg_path, &a.source, &a.source_ref, &a.integrity_digest).cmp(&(
            &b.arg_path,
            &b.source,
            &b.source_ref,
            &b.integrity_digest,
        ))
    });
    Ok(out)
}

fn normalize_context(context: &IntentContext) -> Result<IntentContext, IntentError> {
    let identity = context.identity.trim().to_string();
    let workspace = context.workspace.trim().to_string();
    let risk_class = context.risk_class.trim().to_lowercase();
    if identity.is_empty() {
        return Err(IntentError::MissingField("context.identity"));
    }
    if workspace.is_empty() {
        return Err(IntentError::MissingField("context.workspace"));
    }
    if risk_class.is_empty() {
        return Err(IntentError::MissingField("context.risk_class"));
    }
    Ok(IntentContext {
        identity,
        workspace: workspace.replace('\\', "/"),
        risk_class,
        session_id: context.session_id.trim().to_string(),
        request_id: context.request_id.trim().to_string(),
    })
}

// ============================================================================
// SECTION: Digest Helpers
// ============================================================================

fn digest_args(args: &Map<String, Value>) -> Result<String, IntentError> {
    jcs::digest_value(args).map_err(|err| IntentError::JsonNotRepresentable(err.to_string()))
}

fn digest_projection(intent: &NormalizedIntent) -> Result<String, IntentError> {
    jcs::digest_value(intent).map_err(|err| IntentError::JsonNotRepresentable(err.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn base_intent() -> IntentRequest {
        let mut args = Map::new();
        args.insert("query".to_string(), json!("  demo  "));
        IntentRequest {
            tool_name: " tool.search ".to_string(),
            args,
            targets: vec![
                IntentTarget {
                    kind: "HOST".to_string(),
                    value: "api.example.com".to_string(),
                    operation: "Write".to_string(),
                    sensitivity: String::new(),
                },
                IntentTarget {
                    kind: "host".to_string(),
                    value: "api.example.com".to_string(),
                    operation: "write".to_string(),
                    sensitivity: String::new(),
                },
            ],
            context: IntentContext {
                identity: "agent@example".to_string(),
                workspace: r"C:\repo\demo".to_string(),
                risk_class: "HIGH".to_string(),
                ..IntentContext::default()
            },
            ..IntentRequest::default()
        }
    }

    #[test]
    fn normalization_trims_lowercases_and_dedupes() {
        let normalized = normalize_intent(&base_intent()).expect("normalize");
        assert_eq!(normalized.tool_name, "tool.search");
        assert_eq!(normalized.args["query"], json!("demo"));
        assert_eq!(normalized.targets.len(), 1);
        assert_eq!(normalized.targets[0].kind, "host");
        assert_eq!(normalized.targets[0].operation, "write");
        assert_eq!(normalized.context.risk_class, "high");
        assert_eq!(normalized.context.workspace, "C:/repo/demo");
        assert_eq!(normalized.schema_id, INTENT_REQUEST_SCHEMA_ID);
        assert!(is_hex_digest(&normalized.args_digest));
        assert!(is_hex_digest(&normalized.intent_digest));
    }

    #[test]
    fn equivalent_inputs_share_digests() {
        let first = normalize_intent(&base_intent()).expect("first");

        let mut reordered = base_intent();
        reordered.targets.reverse();
        reordered.tool_name = "tool.search".to_string();
        let second = normalize_intent(&reordered).expect("second");

        assert_eq!(first.args_digest, second.args_digest);
        assert_eq!(first.intent_digest, second.intent_digest);
    }

    #[test]
    fn missing_tool_name_is_rejected() {
        let mut intent = base_intent();
        intent.tool_name = "   ".to_string();
        assert!(matches!(
            normalize_intent(&intent),
            Err(IntentError::MissingField("tool_name"))
        ));
    }

    #[test]
    fn unknown_target_kind_is_rejected() {
        let mut intent = base_intent();
        intent.targets[0].kind = "socket".to_string();
        assert!(matches!(
            normalize_intent(&intent),
            Err(IntentError::UnsupportedTargetKind(_))
        ));
    }

    #[test]
    fn unknown_provenance_source_is_rejected() {
        let mut intent = base_intent();
        intent.arg_provenance.push(IntentArgProvenance {
            arg_path: "query".to_string(),
            source: "oracle".to_string(),
            source_ref: String::new(),
            integrity_digest: String::new(),
        });
        assert!(matches!(
            normalize_intent(&intent),
            Err(IntentError::UnsupportedProvenanceSource(_))
        ));
    }

    #[test]
    fn malformed_integrity_digest_is_rejected() {
        let mut intent = base_intent();
        intent.arg_provenance.push(IntentArgProvenance {
            arg_path: "query".to_string(),
            source: "external".to_string(),
            source_ref: String::new(),
            integrity_digest: "not-a-digest".to_string(),
        });
        assert!(matches!(normalize_intent(&intent), Err(IntentError::BadDigest(_))));
    }

    #[test]
    fn empty_arg_key_is_rejected() {
        let mut intent = base_intent();
        intent.args.insert("   ".to_string(), json!(1));
        assert!(matches!(normalize_intent(&intent), Err(IntentError::EmptyArgKey)));
    }

    #[test]
    fn nested_args_are_normalized_recursively() {
        let mut intent = base_intent();
        intent.args.insert("nested".to_string(), json!({"inner": "  padded  ", "list": [" a "]}));
        let normalized = normalize_intent(&intent).expect("normalize");
        assert_eq!(normalized.args["nested"], json!({"inner": "padded", "list": ["a"]}));
    }
}
