// crates/gait-cli/src/gateway.rs
// ============================================================================
// Module: Gateway Ingest
// Description: Convert gateway audit logs into signed proof records.
// Purpose: Turn third-party enforcement logs into verifiable evidence.
// Dependencies: gait-core, serde_json
// ============================================================================

//! ## Overview
//! Ingest reads one JSONL decision event per line from a gateway log
//! (`kong`, `docker`, or `mintmcp` shapes), projects each onto a
//! `policy_enforcement` proof record, signs the record's canonical bytes,
//! and writes one canonical record per output line. Unparseable lines are
//! skipped with a warning rather than failing the whole ingest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::str::FromStr;

use gait_core::jcs;
use gait_core::schema::runpack::ManifestSignature;
use gait_core::sign::KeyPair;
use gait_core::sign::sign_manifest_bytes;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Proof record schema identifier.
pub const PROOF_RECORD_SCHEMA_ID: &str = "gait.gateway.policy_enforcement";
/// Proof record schema version.
pub const PROOF_RECORD_SCHEMA_VERSION: &str = "1.0.0";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Supported gateway log shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewaySource {
    /// Kong HTTP access logs.
    Kong,
    /// Docker engine event logs.
    Docker,
    /// MintMCP decision logs.
    Mintmcp,
}

impl GatewaySource {
    /// Returns the stable wire label for the source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kong => "kong",
            Self::Docker => "docker",
            Self::Mintmcp => "mintmcp",
        }
    }
}

impl FromStr for GatewaySource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "kong" => Ok(Self::Kong),
            "docker" => Ok(Self::Docker),
            "mintmcp" => Ok(Self::Mintmcp),
            other => Err(format!("unsupported gateway source: {other}")),
        }
    }
}

/// One signed policy-enforcement proof record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofRecord {
    /// Schema identifier (`gait.gateway.policy_enforcement`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Event timestamp; the frozen epoch when the log carried none.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Gateway source label.
    pub source: String,
    /// Zero-based index of the event in the log.
    pub event_index: usize,
    /// Tool or route the decision applied to.
    pub tool_name: String,
    /// Identity the decision applied to, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identity: String,
    /// Enforcement decision (`allow` or `deny`).
    pub decision: String,
    /// Digest of the canonical source event.
    pub event_digest: String,
    /// Signature over the record without this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<ManifestSignature>,
}

/// Options for one ingest.
#[derive(Debug)]
pub struct IngestOptions<'a> {
    /// Gateway log shape.
    pub source: GatewaySource,
    /// Path of the gateway log.
    pub log_path: &'a Path,
    /// Output path for proof record JSONL.
    pub output_path: &'a Path,
    /// Producer version stamped into records.
    pub producer_version: &'a str,
    /// Keypair signing each record.
    pub keypair: &'a KeyPair,
}

/// Outcome of one ingest.
#[derive(Debug, Clone)]
pub struct IngestResult {
    /// Gateway source label.
    pub source: String,
    /// Log path that was read.
    pub log_path: String,
    /// Proof record output path.
    pub proof_records_out: String,
    /// Count of input lines considered.
    pub input_events: usize,
    /// Count of proof records written.
    pub output_records: usize,
    /// Warnings for skipped lines.
    pub warnings: Vec<String>,
}

/// Errors raised during ingest.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Log or output I/O failed.
    #[error("gateway io: {0}")]
    Io(#[from] std::io::Error),
    /// Canonical encoding failed.
    #[error("canonical encode: {0}")]
    Canonical(#[from] gait_core::jcs::JcsError),
}

// ============================================================================
// SECTION: Ingest
// ============================================================================

/// Ingests a gateway log and writes signed proof records.
///
/// # Errors
///
/// Returns [`GatewayError`] on I/O or encoding failure.
pub fn ingest_logs(options: &IngestOptions<'_>) -> Result<IngestResult, GatewayError> {
    let raw = fs::read_to_string(options.log_path)?;
    let mut warnings = Vec::new();
    let mut records = Vec::new();
    let mut input_events = 0usize;

    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        input_events += 1;
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            warnings.push(format!("line {}: not valid json", index + 1));
            continue;
        };
        let Some(projection) = project_event(options.source, &event) else {
            warnings.push(format!("line {}: no decision fields for {}", index + 1, options.source.as_str()));
            continue;
        };

        let mut record = ProofRecord {
            schema_id: PROOF_RECORD_SCHEMA_ID.to_string(),
            schema_version: PROOF_RECORD_SCHEMA_VERSION.to_string(),
            created_at: projection.created_at.unwrap_or_else(gait_core::frozen_epoch),
            producer_version: options.producer_version.to_string(),
            source: options.source.as_str().to_string(),
            event_index: records.len(),
            tool_name: projection.tool_name,
            identity: projection.identity,
            decision: projection.decision,
            event_digest: jcs::digest_value(&event)?,
            signature: None,
        };
        let signable = jcs::canonical_json_bytes(&record)?;
        record.signature = Some(sign_manifest_bytes(options.keypair, &signable));
        records.push(record);
    }

    let mut out = Vec::new();
    for record in &records {
        out.extend_from_slice(&jcs::canonical_json_bytes(record)?);
        out.push(b'\n');
    }
    if let Some(parent) = options.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(options.output_path, out)?;
    tracing::debug!(
        source = options.source.as_str(),
        input = input_events,
        output = records.len(),
        "ingested gateway log"
    );

    Ok(IngestResult {
        source: options.source.as_str().to_string(),
        log_path: options.log_path.display().to_string(),
        proof_records_out: options.output_path.display().to_string(),
        input_events,
        output_records: records.len(),
        warnings,
    })
}

// ============================================================================
// SECTION: Event Projection
// ============================================================================

struct EventProjection {
    tool_name: String,
    identity: String,
    decision: String,
    created_at: Option<OffsetDateTime>,
}

fn project_event(source: GatewaySource, event: &Value) -> Option<EventProjection> {
    match source {
        GatewaySource::Kong => {
            let tool_name = string_at(event, &["route", "name"])
                .or_else(|| string_at(event, &["service", "name"]))?;
            let status = event.get("response")?.get("status")?.as_i64()?;
            Some(EventProjection {
                tool_name,
                identity: string_at(event, &["consumer", "username"]).unwrap_or_default(),
                decision: if status < 400 { "allow" } else { "deny" }.to_string(),
                created_at: event
                    .get("started_at")
                    .and_then(Value::as_i64)
                    .and_then(|millis| OffsetDateTime::from_unix_timestamp(millis / 1000).ok()),
            })
        }
        GatewaySource::Docker => {
            let kind = event.get("Type")?.as_str()?;
            let action = event.get("Action")?.as_str()?;
            Some(EventProjection {
                tool_name: format!("{kind}.{action}"),
                identity: string_at(event, &["Actor", "Attributes", "name"]).unwrap_or_default(),
                decision: "allow".to_string(),
                created_at: event
                    .get("time")
                    .and_then(Value::as_i64)
                    .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
            })
        }
        GatewaySource::Mintmcp => {
            let tool_name = event.get("tool")?.as_str()?.to_string();
            let decision = match event.get("decision")?.as_str()? {
                "allow" | "allowed" => "allow",
                _ => "deny",
            };
            Some(EventProjection {
                tool_name,
                identity: event
                    .get("identity")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                decision: decision.to_string(),
                created_at: event
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|text| OffsetDateTime::parse(text, &Rfc3339).ok()),
            })
        }
    }
}

fn string_at(event: &Value, path: &[&str]) -> Option<String> {
    let mut cursor = event;
    for key in path {
        cursor = cursor.get(key)?;
    }
    cursor.as_str().map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mintmcp_events_project_decisions() {
        let event: Value = serde_json::from_str(
            r#"{"tool":"tool.write","identity":"agent@example","decision":"deny","timestamp":"2026-02-05T00:00:00Z"}"#,
        )
        .expect("parse event");
        let projection = project_event(GatewaySource::Mintmcp, &event).expect("project");
        assert_eq!(projection.tool_name, "tool.write");
        assert_eq!(projection.decision, "deny");
        assert!(projection.created_at.is_some());
    }

    #[test]
    fn kong_status_maps_to_allow_or_deny() {
        let allowed: Value = serde_json::from_str(
            r#"{"route":{"name":"orders"},"response":{"status":200},"consumer":{"username":"svc"}}"#,
        )
        .expect("parse event");
        assert_eq!(project_event(GatewaySource::Kong, &allowed).expect("project").decision, "allow");

        let denied: Value = serde_json::from_str(
            r#"{"route":{"name":"orders"},"response":{"status":403}}"#,
        )
        .expect("parse event");
        assert_eq!(project_event(GatewaySource::Kong, &denied).expect("project").decision, "deny");
    }

    #[test]
    fn unknown_shapes_are_skipped() {
        let event: Value = serde_json::from_str(r#"{"noise":true}"#).expect("parse event");
        assert!(project_event(GatewaySource::Kong, &event).is_none());
        assert!(project_event(GatewaySource::Mintmcp, &event).is_none());
    }
}
