// crates/gait-scout/tests/top_actions.rs
// ============================================================================
// Module: Top Actions Tests
// Description: Deterministic ranking over runpack and trace sources.
// ============================================================================
//! ## Overview
//! Builds reports over mixed sources and asserts order independence,
//! ranking by risk, trace-only behavior, and input validation.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::path::Path;
use std::path::PathBuf;

use gait_core::schema::gate::TraceRecord;
use gait_core::schema::runpack::IntentRecord;
use gait_core::schema::runpack::Refs;
use gait_core::schema::runpack::ResultRecord;
use gait_core::schema::runpack::Run;
use gait_runpack::RecordOptions;
use gait_runpack::write_runpack;
use gait_scout::TopActionsInput;
use gait_scout::TopActionsOptions;
use gait_scout::build_top_actions_report;
use serde_json::Map;
use time::macros::datetime;

const FIXED_TS: time::OffsetDateTime = datetime!(2026-02-13 00:00:00 UTC);

fn write_signal_runpack(dir: &Path, run_id: &str, tool_name: &str, status: &str) -> PathBuf {
    let path = dir.join(format!("runpack_{run_id}.zip"));
    write_runpack(
        &path,
        RecordOptions {
            run: Run {
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: FIXED_TS,
                producer_version: "test".to_string(),
                run_id: run_id.to_string(),
                env: gait_core::schema::runpack::RunEnv::default(),
                timeline: Vec::new(),
            },
            intents: vec![IntentRecord {
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
                run_id: String::new(),
                intent_id: "intent_1".to_string(),
                tool_name: tool_name.to_string(),
                args_digest: "a".repeat(64),
                args: Map::new(),
            }],
            results: vec![ResultRecord {
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
                run_id: String::new(),
                intent_id: "intent_1".to_string(),
                status: status.to_string(),
                result_digest: String::new(),
                result: None,
            }],
            refs: Refs {
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
                run_id: run_id.to_string(),
                receipts: Vec::new(),
            },
            capture_mode: String::new(),
        },
    )
    .expect("write runpack");
    path
}

fn write_trace(dir: &Path, name: &str, tool_name: &str, verdict: &str) -> PathBuf {
    let path = dir.join(name);
    let record = TraceRecord {
        schema_id: "gait.gate.trace".to_string(),
        schema_version: "1.0.0".to_string(),
        created_at: Some(FIXED_TS),
        producer_version: "test".to_string(),
        trace_id: "trace_001".to_string(),
        correlation_id: "run_high".to_string(),
        tool_name: tool_name.to_string(),
        args_digest: "a".repeat(64),
        intent_digest: "b".repeat(64),
        policy_digest: "c".repeat(64),
        verdict: verdict.to_string(),
        violations: vec!["prompt_injection_egress_attempt".to_string()],
    };
    std::fs::write(&path, gait_core::canonical_json_bytes(&record).expect("encode trace"))
        .expect("write trace");
    path
}

#[test]
fn report_is_deterministic_across_input_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let run_high = write_signal_runpack(dir.path(), "run_high", "tool.delete_customer", "error");
    let run_low = write_signal_runpack(dir.path(), "run_low", "tool.read_inventory", "ok");
    let trace = write_trace(dir.path(), "trace_run_high.json", "tool.delete_customer", "block");

    let options = TopActionsOptions {
        producer_version: "test".to_string(),
        now: Some(FIXED_TS),
    };
    let first = build_top_actions_report(
        &TopActionsInput {
            runpack_paths: vec![run_high.clone(), run_low.clone()],
            trace_paths: vec![trace.clone()],
            limit: 5,
        },
        &options,
    )
    .expect("first report");
    let second = build_top_actions_report(
        &TopActionsInput {
            runpack_paths: vec![run_low, run_high],
            trace_paths: vec![trace],
            limit: 5,
        },
        &options,
    )
    .expect("second report");

    let first_bytes = gait_core::canonical_json_bytes(&first).expect("encode first");
    let second_bytes = gait_core::canonical_json_bytes(&second).expect("encode second");
    assert_eq!(first_bytes, second_bytes);

    assert_eq!(first.schema_id, "gait.report.top_actions");
    assert!(first.action_count >= 3);
    assert_eq!(first.top_actions[0].tool_class, "destructive");
    let scores: Vec<i64> = first.top_actions.iter().map(|action| action.score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
}

#[test]
fn trace_only_reports_count_the_trace_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let trace = write_trace(dir.path(), "trace_only.json", "tool.write_customer", "require_approval");

    let report = build_top_actions_report(
        &TopActionsInput {
            trace_paths: vec![trace],
            limit: 1,
            ..TopActionsInput::default()
        },
        &TopActionsOptions {
            producer_version: "test".to_string(),
            now: Some(FIXED_TS),
        },
    )
    .expect("trace-only report");

    assert_eq!(report.run_count, 1);
    assert_eq!(report.trace_count, 1);
    assert_eq!(report.top_actions.len(), 1);
    let action = &report.top_actions[0];
    assert_eq!(action.source_type, "trace");
    assert_eq!(action.verdict, "require_approval");
    assert_eq!(action.rank, 1);
    assert!(action.reason_codes.iter().any(|code| code.starts_with("violation_")));
}

#[test]
fn limit_is_clamped_and_defaulted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let trace = write_trace(dir.path(), "trace_clamp.json", "tool.fetch", "allow");

    let defaulted = build_top_actions_report(
        &TopActionsInput {
            trace_paths: vec![trace.clone()],
            limit: 0,
            ..TopActionsInput::default()
        },
        &TopActionsOptions::default(),
    )
    .expect("defaulted");
    assert_eq!(defaulted.top_actions.len(), 1);

    let clamped = build_top_actions_report(
        &TopActionsInput {
            trace_paths: vec![trace],
            limit: 500,
            ..TopActionsInput::default()
        },
        &TopActionsOptions::default(),
    )
    .expect("clamped");
    assert_eq!(clamped.top_actions.len(), 1);
}

#[test]
fn empty_and_missing_sources_fail() {
    assert!(
        build_top_actions_report(&TopActionsInput::default(), &TopActionsOptions::default())
            .is_err()
    );
    assert!(build_top_actions_report(
        &TopActionsInput {
            runpack_paths: vec![PathBuf::from("missing.zip")],
            ..TopActionsInput::default()
        },
        &TopActionsOptions::default(),
    )
    .is_err());
}
