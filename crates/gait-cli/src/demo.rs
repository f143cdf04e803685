// crates/gait-cli/src/demo.rs
// ============================================================================
// Module: Demo Bundle
// Description: The fully offline deterministic demo run bundle.
// Purpose: Give first-run users a verifiable runpack without any tools.
// Dependencies: gait-core, gait-runpack
// ============================================================================

//! ## Overview
//! The demo bundle is three intents (search, fetch, summarize) with frozen
//! timestamps and deterministic digests. Writing it twice yields identical
//! archives, which makes it the seed for `regress bootstrap` as well.

// ============================================================================
// SECTION: Imports
// ============================================================================

use gait_core::jcs;
use gait_core::schema::runpack::IntentRecord;
use gait_core::schema::runpack::RefReceipt;
use gait_core::schema::runpack::Refs;
use gait_core::schema::runpack::ResultRecord;
use gait_core::schema::runpack::Run;
use gait_core::schema::runpack::RunEnv;
use gait_core::schema::runpack::TimelineEvent;
use gait_runpack::RecordOptions;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use time::Duration;
use time::macros::datetime;

/// Run identifier of the demo bundle.
pub const DEMO_RUN_ID: &str = "run_demo";
/// Frozen timestamp of the demo bundle.
const DEMO_TS: time::OffsetDateTime = datetime!(2026-02-05 00:00:00 UTC);

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds the demo record options.
///
/// # Errors
///
/// Returns [`gait_core::jcs::JcsError`] when digest derivation fails.
pub fn build_demo_bundle(producer_version: &str) -> Result<RecordOptions, gait_core::jcs::JcsError> {
    let run = Run {
        schema_id: "gait.runpack.run".to_string(),
        schema_version: "1.0.0".to_string(),
        created_at: DEMO_TS,
        producer_version: producer_version.to_string(),
        run_id: DEMO_RUN_ID.to_string(),
        env: RunEnv {
            os: "demo".to_string(),
            arch: "demo".to_string(),
            runtime: "rust".to_string(),
        },
        timeline: vec![
            TimelineEvent {
                event: "start".to_string(),
                ts: DEMO_TS,
            },
            TimelineEvent {
                event: "finish".to_string(),
                ts: DEMO_TS + Duration::seconds(2),
            },
        ],
    };

    let intent_args: [Map<String, Value>; 3] = [
        object(&[("query", json!("gait demo: offline verification"))]),
        object(&[("url", json!("https://example.local/demo"))]),
        object(&[("input_ref", json!("ref_1"))]),
    ];
    let intent_names = ["tool.search", "tool.fetch", "tool.summarize"];

    let mut intents = Vec::with_capacity(3);
    let mut results = Vec::with_capacity(3);
    let mut receipts = Vec::with_capacity(3);
    for (index, (tool_name, args)) in intent_names.iter().zip(intent_args).enumerate() {
        let intent_id = format!("intent_{}", index + 1);
        let result_payload =
            object(&[("ok", json!(true)), ("message", json!(format!("demo result {}", index + 1)))]);

        intents.push(IntentRecord {
            schema_id: "gait.runpack.intent".to_string(),
            schema_version: "1.0.0".to_string(),
            created_at: Some(DEMO_TS),
            producer_version: run.producer_version.clone(),
            run_id: run.run_id.clone(),
            intent_id: intent_id.clone(),
            tool_name: (*tool_name).to_string(),
            args_digest: jcs::digest_value(&args)?,
            args,
        });
        results.push(ResultRecord {
            schema_id: "gait.runpack.result".to_string(),
            schema_version: "1.0.0".to_string(),
            created_at: Some(DEMO_TS),
            producer_version: run.producer_version.clone(),
            run_id: run.run_id.clone(),
            intent_id,
            status: "ok".to_string(),
            result_digest: jcs::digest_value(&result_payload)?,
            result: Some(result_payload),
        });
        receipts.push(RefReceipt {
            ref_id: format!("ref_{}", index + 1),
            source_type: "demo".to_string(),
            source_locator: (*tool_name).to_string(),
            query_digest: jcs::digest_bytes(format!("query-{}", index + 1).as_bytes()),
            content_digest: jcs::digest_bytes(format!("content-{}", index + 1).as_bytes()),
            retrieved_at: Some(DEMO_TS),
            redaction_mode: "reference".to_string(),
        });
    }

    Ok(RecordOptions {
        refs: Refs {
            schema_id: "gait.runpack.refs".to_string(),
            schema_version: "1.0.0".to_string(),
            created_at: Some(DEMO_TS),
            producer_version: run.producer_version.clone(),
            run_id: run.run_id.clone(),
            receipts,
        },
        run,
        intents,
        results,
        capture_mode: "reference".to_string(),
    })
}

fn object(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(key, value)| ((*key).to_string(), value.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_bundle_is_deterministic() {
        let first = build_demo_bundle("test").expect("first");
        let second = build_demo_bundle("test").expect("second");
        assert_eq!(
            jcs::canonical_json_bytes(&first.run).expect("run bytes"),
            jcs::canonical_json_bytes(&second.run).expect("run bytes again"),
        );
        assert_eq!(first.intents.len(), 3);
        assert_eq!(first.results.len(), 3);
        assert_eq!(first.refs.receipts.len(), 3);
        assert_eq!(first.intents[0].tool_name, "tool.search");
        assert_eq!(first.intents[1].tool_name, "tool.fetch");
        assert_eq!(first.intents[2].tool_name, "tool.summarize");
    }
}
