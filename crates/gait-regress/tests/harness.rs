// crates/gait-regress/tests/harness.rs
// ============================================================================
// Module: Regression Harness Tests
// Description: Fixture init, grader outcomes, and diff tolerance behavior.
// ============================================================================
//! ## Overview
//! Seeds fixtures from real runpacks and drives the harness through pass,
//! exit-code mismatch, and diff-tolerance scenarios, mirroring how the CLI
//! uses it.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::path::Path;
use std::path::PathBuf;

use gait_core::schema::regress::RegressStatus;
use gait_core::schema::runpack::IntentRecord;
use gait_core::schema::runpack::Refs;
use gait_core::schema::runpack::ResultRecord;
use gait_core::schema::runpack::Run;
use gait_regress::InitOptions;
use gait_regress::RunOptions;
use gait_regress::harness::read_fixture_meta;
use gait_regress::harness::write_fixture_meta;
use gait_regress::init_fixture;
use gait_runpack::RecordOptions;
use gait_runpack::write_runpack;
use serde_json::Map;
use serde_json::json;
use time::macros::datetime;

const FIXED_TS: time::OffsetDateTime = datetime!(2026-02-05 00:00:00 UTC);

fn create_runpack(dir: &Path, run_id: &str, message: &str) -> PathBuf {
    let mut args = Map::new();
    args.insert("input".to_string(), json!("demo"));
    let mut payload = Map::new();
    payload.insert("message".to_string(), json!(message));

    let path = dir.join(format!("runpack_{run_id}_{message}.zip"));
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
                tool_name: "tool.demo".to_string(),
                args_digest:
                    "2222222222222222222222222222222222222222222222222222222222222222".to_string(),
                args,
            }],
            results: vec![ResultRecord {
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
                run_id: String::new(),
                intent_id: "intent_1".to_string(),
                status: "ok".to_string(),
                result_digest:
                    "3333333333333333333333333333333333333333333333333333333333333333".to_string(),
                result: Some(payload),
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

fn run_harness(work_dir: &Path) -> gait_regress::RunOutcome {
    gait_regress::run(&RunOptions {
        config_path: work_dir.join("gait.yaml"),
        output_path: work_dir.join("regress_result.json"),
        work_dir: work_dir.to_path_buf(),
        producer_version: "test".to_string(),
        junit_path: Some(work_dir.join("regress_result.xml")),
        now: None,
    })
    .expect("run harness")
}

#[test]
fn default_fixture_passes_all_graders() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = create_runpack(dir.path(), "run_demo", "baseline");
    init_fixture(&InitOptions {
        source_runpack_path: source,
        work_dir: dir.path().to_path_buf(),
    })
    .expect("init fixture");

    let outcome = run_harness(dir.path());
    assert_eq!(outcome.result.status, RegressStatus::Pass);
    assert_eq!(outcome.failed_graders, 0);
    assert_eq!(outcome.result.graders.len(), 3);

    let written = std::fs::read(dir.path().join("regress_result.json")).expect("read output");
    let decoded: serde_json::Value = serde_json::from_slice(&written).expect("parse output");
    assert_eq!(decoded["status"], json!("pass"));

    let junit = std::fs::read_to_string(dir.path().join("regress_result.xml")).expect("junit");
    assert!(junit.contains("failures=\"0\""));
}

#[test]
fn exit_code_mismatch_fails_the_exit_grader() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = create_runpack(dir.path(), "run_demo", "baseline");
    init_fixture(&InitOptions {
        source_runpack_path: source,
        work_dir: dir.path().to_path_buf(),
    })
    .expect("init fixture");

    let meta_path = dir.path().join("fixtures/run_demo/fixture.json");
    let mut meta = read_fixture_meta(&meta_path).expect("read meta");
    meta.expected_replay_exit_code = 2;
    write_fixture_meta(&meta_path, &meta).expect("write meta");

    let outcome = run_harness(dir.path());
    assert_eq!(outcome.result.status, RegressStatus::Fail);
    let failed = outcome
        .result
        .graders
        .iter()
        .find(|grader| grader.name == "run_demo/expected_exit_code")
        .expect("exit grader");
    assert_eq!(failed.status, RegressStatus::Fail);
    assert_eq!(failed.reason_codes, vec!["unexpected_exit_code".to_string()]);
}

#[test]
fn diff_tolerance_converts_failure_into_pass() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = create_runpack(dir.path(), "run_demo", "baseline");
    init_fixture(&InitOptions {
        source_runpack_path: source.clone(),
        work_dir: dir.path().to_path_buf(),
    })
    .expect("init fixture");
    let candidate = create_runpack(dir.path(), "run_demo", "changed");

    let meta_path = dir.path().join("fixtures/run_demo/fixture.json");
    let mut meta = read_fixture_meta(&meta_path).expect("read meta");
    meta.candidate_runpack = candidate.to_string_lossy().to_string();
    meta.diff_allow_changed_files = Vec::new();
    write_fixture_meta(&meta_path, &meta).expect("write meta");

    let first = run_harness(dir.path());
    assert_eq!(first.result.status, RegressStatus::Fail);
    let diff_grader = first
        .result
        .graders
        .iter()
        .find(|grader| grader.name == "run_demo/diff")
        .expect("diff grader");
    assert_eq!(diff_grader.reason_codes, vec!["unexpected_diff".to_string()]);

    // Widen the tolerance to exactly the observed changes.
    let diff = gait_runpack::diff_runpacks(&source, &candidate, gait_runpack::DiffPrivacy::Full)
        .expect("diff");
    let mut meta = read_fixture_meta(&meta_path).expect("read meta again");
    meta.candidate_runpack = candidate.to_string_lossy().to_string();
    meta.diff_allow_changed_files = diff.summary.files_changed;
    write_fixture_meta(&meta_path, &meta).expect("write meta again");

    let second = run_harness(dir.path());
    assert_eq!(second.result.status, RegressStatus::Pass);
}

#[test]
fn trajectory_mismatch_fails_the_trajectory_grader() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = create_runpack(dir.path(), "run_demo", "baseline");
    init_fixture(&InitOptions {
        source_runpack_path: source,
        work_dir: dir.path().to_path_buf(),
    })
    .expect("init fixture");

    let meta_path = dir.path().join("fixtures/run_demo/fixture.json");
    let mut meta = read_fixture_meta(&meta_path).expect("read meta");
    meta.expected_tool_sequence = vec!["tool.other".to_string()];
    meta.expected_verdict_sequence = vec!["block".to_string()];
    write_fixture_meta(&meta_path, &meta).expect("write meta");

    let outcome = run_harness(dir.path());
    let trajectory = outcome
        .result
        .graders
        .iter()
        .find(|grader| grader.name == "run_demo/trajectory")
        .expect("trajectory grader");
    assert_eq!(trajectory.status, RegressStatus::Fail);
    assert!(trajectory.reason_codes.contains(&"unexpected_tool_sequence".to_string()));
    assert!(trajectory.reason_codes.contains(&"unexpected_verdict_sequence".to_string()));
}
