// crates/gait-runpack/tests/runpack.rs
// ============================================================================
// Module: Runpack Tests
// Description: Write/read/verify/diff/replay behavior over real archives.
// ============================================================================
//! ## Overview
//! Exercises the full runpack lifecycle: deterministic writes, hash-checked
//! reads, tamper detection with and without signatures, privacy-aware
//! diffs, and the replay stub's missing-result contract.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::path::Path;
use std::path::PathBuf;

use gait_core::jcs;
use gait_core::schema::runpack::IntentRecord;
use gait_core::schema::runpack::Manifest;
use gait_core::schema::runpack::ManifestFile;
use gait_core::schema::runpack::Refs;
use gait_core::schema::runpack::ResultRecord;
use gait_core::schema::runpack::Run;
use gait_core::schema::runpack::RunEnv;
use gait_core::schema::runpack::TimelineEvent;
use gait_core::sign::KeyPair;
use gait_core::sign::sign_manifest_bytes;
use gait_core::zipx::ZipEntry;
use gait_core::zipx::write_deterministic_zip;
use gait_runpack::DiffPrivacy;
use gait_runpack::RecordOptions;
use gait_runpack::ReplayOptions;
use gait_runpack::SignatureStatus;
use gait_runpack::VerifyOptions;
use gait_runpack::diff_runpacks;
use gait_runpack::read_runpack;
use gait_runpack::replay_stub;
use gait_runpack::verify_zip;
use gait_runpack::write::write_runpack_signed;
use gait_runpack::write_runpack;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use time::macros::datetime;

const FIXED_TS: time::OffsetDateTime = datetime!(2026-02-05 00:00:00 UTC);

fn build_run(run_id: &str) -> Run {
    Run {
        schema_id: "gait.runpack.run".to_string(),
        schema_version: "1.0.0".to_string(),
        created_at: FIXED_TS,
        producer_version: "0.0.0-dev".to_string(),
        run_id: run_id.to_string(),
        env: RunEnv {
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            runtime: "rust".to_string(),
        },
        timeline: vec![TimelineEvent {
            event: "start".to_string(),
            ts: FIXED_TS,
        }],
    }
}

fn build_intent(intent_id: &str) -> IntentRecord {
    let mut args = Map::new();
    args.insert("foo".to_string(), json!("bar"));
    IntentRecord {
        intent_id: intent_id.to_string(),
        tool_name: "tool.demo".to_string(),
        args_digest: "2222222222222222222222222222222222222222222222222222222222222222"
            .to_string(),
        args,
        schema_id: String::new(),
        schema_version: String::new(),
        created_at: None,
        producer_version: String::new(),
        run_id: String::new(),
    }
}

fn build_result(intent_id: &str) -> ResultRecord {
    let mut payload = Map::new();
    payload.insert("ok".to_string(), json!(true));
    ResultRecord {
        intent_id: intent_id.to_string(),
        status: "ok".to_string(),
        result_digest: "3333333333333333333333333333333333333333333333333333333333333333"
            .to_string(),
        result: Some(payload),
        schema_id: String::new(),
        schema_version: String::new(),
        created_at: None,
        producer_version: String::new(),
        run_id: String::new(),
    }
}

fn write_test_runpack(
    dir: &Path,
    run_id: &str,
    intents: Vec<IntentRecord>,
    results: Vec<ResultRecord>,
) -> PathBuf {
    let path = dir.join(format!("runpack_{run_id}.zip"));
    write_runpack(
        &path,
        RecordOptions {
            run: build_run(run_id),
            intents,
            results,
            refs: Refs {
                run_id: run_id.to_string(),
                receipts: Vec::new(),
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
            },
            capture_mode: "reference".to_string(),
        },
    )
    .expect("write runpack");
    path
}

/// Rebuilds an archive by hand so individual entries can be tampered with.
fn write_custom_zip(dir: &Path, name: &str, entries: Vec<ZipEntry>) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).expect("create zip");
    write_deterministic_zip(file, &entries).expect("write zip");
    path
}

fn signed_manifest_bytes(keypair: &KeyPair, files: Vec<ManifestFile>) -> Vec<u8> {
    let mut manifest = Manifest {
        schema_id: "gait.runpack.manifest".to_string(),
        schema_version: "1.0.0".to_string(),
        created_at: FIXED_TS,
        producer_version: "0.0.0-dev".to_string(),
        run_id: "run_test".to_string(),
        capture_mode: "reference".to_string(),
        files,
        manifest_digest: String::new(),
        signatures: Vec::new(),
    };
    let signable = jcs::canonical_json_bytes(&manifest).expect("signable bytes");
    manifest.manifest_digest = jcs::digest_bytes(&signable);
    manifest.signatures = vec![sign_manifest_bytes(keypair, &signable)];
    jcs::canonical_json_bytes(&manifest).expect("manifest bytes")
}

// ============================================================================
// SECTION: Write and Read
// ============================================================================

#[test]
fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_test_runpack(
        dir.path(),
        "run_read",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );

    let pack = read_runpack(&path).expect("read runpack");
    assert_eq!(pack.run.run_id, "run_read");
    assert_eq!(pack.intents.len(), 1);
    assert_eq!(pack.results.len(), 1);
    assert_eq!(pack.manifest.capture_mode, "reference");
    assert!(!pack.manifest.manifest_digest.is_empty());
}

#[test]
fn repeated_writes_are_byte_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_test_runpack(
        dir.path(),
        "run_a",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );
    let second_dir = tempfile::tempdir().expect("tempdir 2");
    let second = write_test_runpack(
        second_dir.path(),
        "run_a",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );

    let first_bytes = std::fs::read(first).expect("read first");
    let second_bytes = std::fs::read(second).expect("read second");
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn read_rejects_missing_listed_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = Manifest {
        schema_id: "gait.runpack.manifest".to_string(),
        schema_version: "1.0.0".to_string(),
        created_at: FIXED_TS,
        producer_version: "0.0.0-dev".to_string(),
        run_id: "run_missing".to_string(),
        capture_mode: "reference".to_string(),
        files: vec![ManifestFile {
            path: "run.json".to_string(),
            sha256: "1111111111111111111111111111111111111111111111111111111111111111"
                .to_string(),
        }],
        manifest_digest: "2222222222222222222222222222222222222222222222222222222222222222"
            .to_string(),
        signatures: Vec::new(),
    };
    let manifest_bytes = jcs::canonical_json_bytes(&manifest).expect("manifest bytes");
    let path = write_custom_zip(
        dir.path(),
        "runpack_missing.zip",
        vec![ZipEntry {
            path: "manifest.json".to_string(),
            data: manifest_bytes,
            mode: 0o644,
        }],
    );
    assert!(read_runpack(&path).is_err());
}

// ============================================================================
// SECTION: Verification
// ============================================================================

#[test]
fn demo_scenario_verifies_without_signature() {
    let dir = tempfile::tempdir().expect("tempdir");
    let intents: Vec<IntentRecord> = ["tool.search", "tool.fetch", "tool.summarize"]
        .iter()
        .enumerate()
        .map(|(index, tool)| {
            let mut intent = build_intent(&format!("intent_{}", index + 1));
            intent.tool_name = (*tool).to_string();
            intent
        })
        .collect();
    let results =
        vec![build_result("intent_1"), build_result("intent_2"), build_result("intent_3")];
    let path = write_test_runpack(dir.path(), "run_demo", intents, results);

    let result = verify_zip(&path, &VerifyOptions::default()).expect("verify");
    assert!(result.ok());
    assert_eq!(result.run_id, "run_demo");
    assert_eq!(result.signature_status, SignatureStatus::Missing);
    assert!(gait_core::is_hex_digest(&result.manifest_digest));
}

#[test]
fn signed_write_verifies_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keypair = KeyPair::generate();
    let path = dir.path().join("runpack_signed.zip");
    let written = write_runpack_signed(
        &path,
        RecordOptions {
            run: build_run("run_signed"),
            intents: vec![build_intent("intent_1")],
            results: vec![build_result("intent_1")],
            refs: Refs {
                run_id: "run_signed".to_string(),
                receipts: Vec::new(),
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
            },
            capture_mode: String::new(),
        },
        Some(&keypair),
    )
    .expect("write signed");
    assert_eq!(written.manifest.signatures.len(), 1);
    assert_eq!(
        written.manifest.signatures[0].signed_digest,
        written.manifest.manifest_digest
    );

    let result = verify_zip(
        &path,
        &VerifyOptions {
            public_key: Some(keypair.verifying),
            require_signature: true,
        },
    )
    .expect("verify");
    assert!(result.ok());
    assert_eq!(result.signature_status, SignatureStatus::Verified);
}

#[test]
fn tampered_file_flips_hash_mismatch_but_not_signature() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keypair = KeyPair::generate();
    let file_data = b"hello".to_vec();
    let manifest_bytes = signed_manifest_bytes(
        &keypair,
        vec![ManifestFile {
            path: "run.json".to_string(),
            sha256: jcs::digest_bytes(&file_data),
        }],
    );
    let path = write_custom_zip(
        dir.path(),
        "runpack_tampered.zip",
        vec![
            ZipEntry {
                path: "manifest.json".to_string(),
                data: manifest_bytes,
                mode: 0o644,
            },
            ZipEntry {
                path: "run.json".to_string(),
                data: b"tampered".to_vec(),
                mode: 0o644,
            },
        ],
    );

    let result = verify_zip(
        &path,
        &VerifyOptions {
            public_key: Some(keypair.verifying),
            require_signature: true,
        },
    )
    .expect("verify");
    assert_eq!(result.hash_mismatches.len(), 1);
    assert_eq!(result.hash_mismatches[0].path, "run.json");
    assert_eq!(result.signature_status, SignatureStatus::Verified);
}

#[test]
fn tampered_manifest_fails_signature() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keypair = KeyPair::generate();
    let file_data = b"hello".to_vec();
    let manifest_bytes = signed_manifest_bytes(
        &keypair,
        vec![ManifestFile {
            path: "run.json".to_string(),
            sha256: jcs::digest_bytes(&file_data),
        }],
    );
    let tampered = String::from_utf8(manifest_bytes)
        .expect("utf8 manifest")
        .replace("run_test", "run_bad")
        .into_bytes();
    let path = write_custom_zip(
        dir.path(),
        "runpack_badsig.zip",
        vec![
            ZipEntry {
                path: "manifest.json".to_string(),
                data: tampered,
                mode: 0o644,
            },
            ZipEntry {
                path: "run.json".to_string(),
                data: file_data,
                mode: 0o644,
            },
        ],
    );

    let result = verify_zip(
        &path,
        &VerifyOptions {
            public_key: Some(keypair.verifying),
            require_signature: true,
        },
    )
    .expect("verify");
    assert_eq!(result.signature_status, SignatureStatus::Failed);
    assert!(!result.signature_errors.is_empty());
}

#[test]
fn listed_but_absent_file_is_reported_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keypair = KeyPair::generate();
    let manifest_bytes = signed_manifest_bytes(
        &keypair,
        vec![ManifestFile {
            path: "run.json".to_string(),
            sha256: jcs::digest_bytes(b"hello"),
        }],
    );
    let path = write_custom_zip(
        dir.path(),
        "runpack_absent.zip",
        vec![ZipEntry {
            path: "manifest.json".to_string(),
            data: manifest_bytes,
            mode: 0o644,
        }],
    );

    let result = verify_zip(&path, &VerifyOptions::default()).expect("verify");
    assert_eq!(result.missing_files, vec!["run.json".to_string()]);
}

#[test]
fn missing_manifest_is_a_hard_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_custom_zip(
        dir.path(),
        "runpack_nomanifest.zip",
        vec![ZipEntry {
            path: "run.json".to_string(),
            data: b"{}".to_vec(),
            mode: 0o644,
        }],
    );
    assert!(verify_zip(&path, &VerifyOptions::default()).is_err());
}

#[test]
fn unsigned_pack_with_required_signature_reports_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_test_runpack(dir.path(), "run_unsigned", Vec::new(), Vec::new());
    let result = verify_zip(
        &path,
        &VerifyOptions {
            public_key: None,
            require_signature: true,
        },
    )
    .expect("verify");
    assert_eq!(result.signature_status, SignatureStatus::Missing);
    assert!(!result.signature_errors.is_empty());
    assert!(!result.ok());
}

// ============================================================================
// SECTION: Diff
// ============================================================================

#[test]
fn identical_packs_report_no_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let left = write_test_runpack(
        dir.path(),
        "run_diff",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );
    let other_dir = tempfile::tempdir().expect("tempdir 2");
    let right = write_test_runpack(
        other_dir.path(),
        "run_diff",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );

    let result = diff_runpacks(&left, &right, DiffPrivacy::Full).expect("diff");
    assert!(!result.summary.manifest_changed);
    assert!(!result.summary.intents_changed);
    assert!(!result.summary.results_changed);
    assert!(!result.summary.refs_changed);
    assert!(result.summary.files_changed.is_empty());
}

#[test]
fn intent_payload_change_is_full_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut changed_intent = build_intent("intent_1");
    changed_intent.args.insert("foo".to_string(), Value::String("baz".to_string()));

    let left = write_test_runpack(
        dir.path(),
        "run_left",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );
    let right = write_test_runpack(
        dir.path(),
        "run_right",
        vec![changed_intent],
        vec![build_result("intent_1")],
    );

    let metadata = diff_runpacks(&left, &right, DiffPrivacy::Metadata).expect("metadata diff");
    assert!(!metadata.summary.intents_changed);
    let full = diff_runpacks(&left, &right, DiffPrivacy::Full).expect("full diff");
    assert!(full.summary.intents_changed);
}

#[test]
fn result_payload_change_is_full_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut changed_result = build_result("intent_1");
    changed_result
        .result
        .as_mut()
        .expect("payload")
        .insert("ok".to_string(), Value::Bool(false));

    let left = write_test_runpack(
        dir.path(),
        "run_left",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );
    let right = write_test_runpack(
        dir.path(),
        "run_right",
        vec![build_intent("intent_1")],
        vec![changed_result],
    );

    let metadata = diff_runpacks(&left, &right, DiffPrivacy::Metadata).expect("metadata diff");
    assert!(!metadata.summary.results_changed);
    let full = diff_runpacks(&left, &right, DiffPrivacy::Full).expect("full diff");
    assert!(full.summary.results_changed);
    assert!(full.summary.files_changed.contains(&"results.jsonl".to_string()));
}

#[test]
fn refs_change_is_reported_in_both_modes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let left = write_test_runpack(
        dir.path(),
        "run_left",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );
    let right_path = dir.path().join("runpack_right_refs.zip");
    write_runpack(
        &right_path,
        RecordOptions {
            run: build_run("run_right"),
            intents: vec![build_intent("intent_1")],
            results: vec![build_result("intent_1")],
            refs: Refs {
                run_id: "run_right".to_string(),
                receipts: vec![gait_core::schema::runpack::RefReceipt {
                    ref_id: "ref_extra".to_string(),
                    source_type: "demo".to_string(),
                    source_locator: "extra".to_string(),
                    query_digest:
                        "4444444444444444444444444444444444444444444444444444444444444444"
                            .to_string(),
                    content_digest:
                        "5555555555555555555555555555555555555555555555555555555555555555"
                            .to_string(),
                    retrieved_at: Some(FIXED_TS),
                    redaction_mode: "reference".to_string(),
                }],
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
            },
            capture_mode: String::new(),
        },
    )
    .expect("write right");

    let metadata = diff_runpacks(&left, &right_path, DiffPrivacy::Metadata).expect("diff");
    assert!(metadata.summary.refs_changed);
}

#[test]
fn one_sided_intents_are_listed_symmetrically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let left = write_test_runpack(
        dir.path(),
        "run_left",
        vec![build_intent("intent_1")],
        vec![build_result("intent_1")],
    );
    let right = write_test_runpack(
        dir.path(),
        "run_right",
        vec![build_intent("intent_2")],
        vec![build_result("intent_2")],
    );

    let forward = diff_runpacks(&left, &right, DiffPrivacy::Full).expect("forward");
    assert_eq!(forward.summary.left_only_intents, vec!["intent_1".to_string()]);
    assert_eq!(forward.summary.right_only_intents, vec!["intent_2".to_string()]);

    let reverse = diff_runpacks(&right, &left, DiffPrivacy::Full).expect("reverse");
    assert_eq!(reverse.summary.left_only_intents, forward.summary.right_only_intents);
    assert_eq!(reverse.summary.right_only_intents, forward.summary.left_only_intents);
    assert_eq!(reverse.summary.files_changed, forward.summary.files_changed);
}

#[test]
fn invalid_privacy_mode_is_rejected() {
    assert!("partial".parse::<DiffPrivacy>().is_err());
    assert_eq!("full".parse::<DiffPrivacy>().expect("full"), DiffPrivacy::Full);
    assert_eq!("metadata".parse::<DiffPrivacy>().expect("metadata"), DiffPrivacy::Metadata);
}

// ============================================================================
// SECTION: Replay
// ============================================================================

#[test]
fn replay_reports_recorded_results_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_test_runpack(
        dir.path(),
        "run_replay",
        vec![build_intent("intent_1"), build_intent("intent_2")],
        vec![build_result("intent_1"), build_result("intent_2")],
    );

    let result = replay_stub(&path, ReplayOptions::default()).expect("replay");
    assert_eq!(result.run_id, "run_replay");
    assert_eq!(result.mode, "stub");
    assert_eq!(result.steps.len(), 2);
    assert!(result.missing_results.is_empty());
    assert_eq!(gait_runpack::replay_exit_code(&result), 0);
}

#[test]
fn replay_marks_missing_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut intent = build_intent("intent_1");
    intent.tool_name = "tool.opaque".to_string();
    let path = write_test_runpack(dir.path(), "run_missing_result", vec![intent], Vec::new());

    let result = replay_stub(&path, ReplayOptions::default()).expect("replay");
    assert_eq!(result.missing_results, vec!["intent_1".to_string()]);
    assert_eq!(result.steps[0].status, "missing_result");
    assert_eq!(gait_runpack::replay_exit_code(&result), 2);
}

#[test]
fn replay_without_synthesis_never_stubs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut intent = build_intent("intent_1");
    intent.tool_name = "tool.fetch".to_string();
    let path = write_test_runpack(dir.path(), "run_no_stub", vec![intent], Vec::new());

    let result = replay_stub(&path, ReplayOptions::default()).expect("replay");
    assert_eq!(result.steps[0].status, "missing_result");
}

#[test]
fn replay_synthesis_stubs_classifiable_tools() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fetch = build_intent("intent_1");
    fetch.tool_name = "tool.fetch".to_string();
    let mut opaque = build_intent("intent_2");
    opaque.tool_name = "tool.opaque".to_string();
    let path = write_test_runpack(dir.path(), "run_stub", vec![fetch, opaque], Vec::new());

    let result = replay_stub(
        &path,
        ReplayOptions {
            synthesize_stubs: true,
        },
    )
    .expect("replay");
    assert_eq!(result.steps[0].status, "stubbed");
    assert_eq!(result.steps[0].stub_type, "http");
    assert!(gait_core::is_hex_digest(&result.steps[0].result_digest));
    assert_eq!(result.steps[1].status, "missing_result");
    assert_eq!(result.missing_results, vec!["intent_2".to_string()]);
}

#[test]
fn replay_rejects_duplicate_intents_and_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dup_intents = write_test_runpack(
        dir.path(),
        "run_dup_intent",
        vec![build_intent("intent_dup"), build_intent("intent_dup")],
        vec![build_result("intent_dup")],
    );
    assert!(replay_stub(&dup_intents, ReplayOptions::default()).is_err());

    let dup_results = write_test_runpack(
        dir.path(),
        "run_dup_result",
        vec![build_intent("intent_dup")],
        vec![build_result("intent_dup"), build_result("intent_dup")],
    );
    assert!(replay_stub(&dup_results, ReplayOptions::default()).is_err());
}
