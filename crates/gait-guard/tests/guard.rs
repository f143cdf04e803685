// crates/gait-guard/tests/guard.rs
// ============================================================================
// Module: Guard Tests
// Description: Evidence packs, incident windows, retention, and encryption.
// ============================================================================
//! ## Overview
//! Drives the guard surface over real artifacts: template-indexed packs
//! with rendered summaries, incident selection by window and trace id,
//! TTL-based sweeping with dry-run parity, and the AES-256-GCM envelope
//! round trip.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use gait_core::schema::gate::TraceRecord;
use gait_core::schema::runpack::Refs;
use gait_core::schema::runpack::Run;
use gait_core::sign::KeyPair;
use gait_guard::BuildOptions;
use gait_guard::DecryptOptions;
use gait_guard::EncryptOptions;
use gait_guard::IncidentPackOptions;
use gait_guard::RetentionOptions;
use gait_guard::apply_retention;
use gait_guard::build_incident_pack;
use gait_guard::build_pack;
use gait_guard::decrypt_artifact;
use gait_guard::encrypt_artifact;
use gait_guard::verify_pack;
use gait_runpack::RecordOptions;
use gait_runpack::SignatureStatus;
use gait_runpack::write_runpack;
use time::Duration;
use time::macros::datetime;

const FIXED_TS: time::OffsetDateTime = datetime!(2026-02-06 10:00:00 UTC);

fn write_anchor_runpack(dir: &Path, run_id: &str) -> PathBuf {
    let path = dir.join(format!("runpack_{run_id}.zip"));
    write_runpack(
        &path,
        RecordOptions {
            run: Run {
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: FIXED_TS,
                producer_version: "0.0.0-dev".to_string(),
                run_id: run_id.to_string(),
                env: gait_core::schema::runpack::RunEnv::default(),
                timeline: Vec::new(),
            },
            intents: Vec::new(),
            results: Vec::new(),
            refs: Refs {
                schema_id: String::new(),
                schema_version: String::new(),
                created_at: None,
                producer_version: String::new(),
                run_id: run_id.to_string(),
                receipts: Vec::new(),
            },
            capture_mode: "reference".to_string(),
        },
    )
    .expect("write runpack");
    path
}

fn write_trace(dir: &Path, name: &str, trace_id: &str, created_at: time::OffsetDateTime) {
    let record = TraceRecord {
        schema_id: "gait.gate.trace".to_string(),
        schema_version: "1.0.0".to_string(),
        created_at: Some(created_at),
        producer_version: "test".to_string(),
        trace_id: trace_id.to_string(),
        correlation_id: "run_v14".to_string(),
        tool_name: "tool.demo".to_string(),
        args_digest: "a".repeat(64),
        intent_digest: "b".repeat(64),
        policy_digest: "c".repeat(64),
        verdict: "block".to_string(),
        violations: vec!["external_target".to_string()],
    };
    std::fs::write(
        dir.join(name),
        gait_core::canonical_json_bytes(&record).expect("encode trace"),
    )
    .expect("write trace");
}

// ============================================================================
// SECTION: Evidence Packs
// ============================================================================

#[test]
fn pack_build_indexes_template_and_renders_pdf() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_anchor_runpack(dir.path(), "run_v14");

    let result = build_pack(
        &BuildOptions {
            runpack_path: runpack,
            output_path: Some(dir.path().join("evidence_pack_v14.zip")),
            case_id: "INC-42".to_string(),
            template_id: "pci".to_string(),
            render_pdf: true,
            extra_evidence_files: BTreeMap::from([(
                "policy_digests.json".to_string(),
                br#"{"policy_digests":[]}"#.to_vec(),
            )]),
            producer_version: "0.0.0-dev".to_string(),
            ..BuildOptions::default()
        },
        None,
    )
    .expect("build pack");

    assert_eq!(result.manifest.template_id, "pci");
    assert!(!result.manifest.control_index.is_empty());
    assert!(!result.manifest.evidence_ptrs.is_empty());
    assert_eq!(result.manifest.rendered[0].path, "summary.pdf");

    let paths: Vec<&str> =
        result.manifest.contents.iter().map(|entry| entry.path.as_str()).collect();
    for expected in
        ["control_index.json", "evidence_pointers.json", "summary.pdf", "policy_digests.json"]
    {
        assert!(paths.contains(&expected), "expected {expected} in {paths:?}");
    }
}

#[test]
fn unknown_template_falls_back_to_incident_response() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_anchor_runpack(dir.path(), "run_unknown_template");

    let result = build_pack(
        &BuildOptions {
            runpack_path: runpack,
            output_path: Some(dir.path().join("evidence_pack_unknown.zip")),
            case_id: "INC-1".to_string(),
            template_id: "hipaa".to_string(),
            ..BuildOptions::default()
        },
        None,
    )
    .expect("build pack");
    assert_eq!(result.manifest.template_id, "incident_response");
}

#[test]
fn signed_pack_verifies_and_detects_signature_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_anchor_runpack(dir.path(), "run_signed_pack");
    let keypair = KeyPair::generate();

    let result = build_pack(
        &BuildOptions {
            runpack_path: runpack,
            output_path: Some(dir.path().join("evidence_pack_signed.zip")),
            case_id: "INC-7".to_string(),
            template_id: "soc2".to_string(),
            ..BuildOptions::default()
        },
        Some(&keypair),
    )
    .expect("build pack");

    let verified = verify_pack(&result.path, Some(&keypair.verifying), true).expect("verify");
    assert!(verified.ok());
    assert_eq!(verified.signature_status, SignatureStatus::Verified);
    assert_eq!(verified.run_id, "run_signed_pack");

    let skipped = verify_pack(&result.path, None, false).expect("verify unsigned");
    assert_eq!(skipped.signature_status, SignatureStatus::Skipped);
}

#[test]
fn pack_builds_are_deterministic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_anchor_runpack(dir.path(), "run_deterministic");

    let build = |name: &str| {
        build_pack(
            &BuildOptions {
                runpack_path: runpack.clone(),
                output_path: Some(dir.path().join(name)),
                case_id: "INC-9".to_string(),
                template_id: "soc2".to_string(),
                render_pdf: true,
                ..BuildOptions::default()
            },
            None,
        )
        .expect("build pack")
    };
    let first = build("evidence_pack_first.zip");
    let second = build("evidence_pack_second.zip");

    let first_bytes = std::fs::read(first.path).expect("read first");
    let second_bytes = std::fs::read(second.path).expect("read second");
    assert_eq!(first_bytes, second_bytes);
}

// ============================================================================
// SECTION: Incident Packs
// ============================================================================

#[test]
fn incident_pack_selects_window_and_aggregates_policy_digests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_anchor_runpack(dir.path(), "run_v14");

    write_trace(dir.path(), "trace_inside.json", "trace_001", FIXED_TS + Duration::hours(1));
    write_trace(dir.path(), "trace_outside.json", "trace_002", FIXED_TS + Duration::hours(60));

    let result = build_incident_pack(
        &IncidentPackOptions {
            runpack_path: runpack,
            case_id: "INC-55".to_string(),
            template_id: "incident_response".to_string(),
            producer_version: "test".to_string(),
            ..IncidentPackOptions::default()
        },
        None,
    )
    .expect("build incident pack");

    assert_eq!(result.trace_count, 1);
    assert_eq!(result.policy_digests, vec!["c".repeat(64)]);
    assert_eq!(result.window_from, FIXED_TS - Duration::hours(24));
    assert_eq!(result.window_to, FIXED_TS + Duration::hours(24));

    let window = result.build.manifest.incident_window.as_ref().expect("window");
    assert_eq!(window.selection_anchor, "run_v14");
    assert_eq!(window.window_seconds, 24 * 3600);

    let paths: Vec<&str> =
        result.build.manifest.contents.iter().map(|entry| entry.path.as_str()).collect();
    assert!(paths.contains(&"trace_inside.json"));
    assert!(!paths.contains(&"trace_outside.json"));
    assert!(paths.contains(&"policy_digests.json"));
}

// ============================================================================
// SECTION: Retention
// ============================================================================

#[test]
fn retention_sweeps_aged_artifacts_with_dry_run_parity() {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in
        ["trace_old.json", "evidence_pack_old.zip", "trace_keep.json", "incident_pack_keep.zip"]
    {
        std::fs::write(dir.path().join(name), b"x").expect("write artifact");
    }
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(200 * 3600);
    for name in ["trace_old.json", "evidence_pack_old.zip"] {
        let file = std::fs::File::options()
            .write(true)
            .open(dir.path().join(name))
            .expect("open artifact");
        file.set_modified(old).expect("set mtime");
    }

    let dry_run = apply_retention(&RetentionOptions {
        root_path: dir.path().to_path_buf(),
        trace_ttl: Duration::hours(24),
        pack_ttl: Duration::hours(48),
        dry_run: true,
        report_output: Some(dir.path().join("retention_report.json")),
        now: None,
        producer_version: "test".to_string(),
    })
    .expect("dry-run retention");
    assert_eq!(dry_run.deleted_files.len(), 2);
    assert_eq!(dry_run.kept_files.len(), 2);
    assert!(dir.path().join("trace_old.json").exists());
    assert!(dir.path().join("retention_report.json").exists());

    let applied = apply_retention(&RetentionOptions {
        root_path: dir.path().to_path_buf(),
        trace_ttl: Duration::hours(24),
        pack_ttl: Duration::hours(48),
        dry_run: false,
        report_output: None,
        now: None,
        producer_version: "test".to_string(),
    })
    .expect("apply retention");
    assert_eq!(applied.deleted_files.len(), 2);
    assert!(!dir.path().join("trace_old.json").exists());
    assert!(!dir.path().join("evidence_pack_old.zip").exists());
    assert!(dir.path().join("trace_keep.json").exists());
}

#[test]
fn zero_ttl_keeps_everything() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("trace_any.json"), b"x").expect("write artifact");

    let report = apply_retention(&RetentionOptions {
        root_path: dir.path().to_path_buf(),
        trace_ttl: Duration::ZERO,
        pack_ttl: Duration::ZERO,
        dry_run: false,
        report_output: None,
        now: None,
        producer_version: "test".to_string(),
    })
    .expect("apply retention");
    assert!(report.deleted_files.is_empty());
    assert_eq!(report.kept_files.len(), 1);
}

// ============================================================================
// SECTION: Encryption
// ============================================================================

#[test]
fn encrypt_then_decrypt_round_trips_with_digest_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("artifact.json");
    std::fs::write(&source, br#"{"k":"v"}"#).expect("write source");

    let key = BASE64.encode(b"0123456789abcdef0123456789abcdef");
    // Unique env var name keeps parallel tests from clobbering each other.
    let env_name = "GAIT_ENCRYPTION_KEY_TEST_ROUNDTRIP";
    std::env::set_var(env_name, key);

    let encrypted = encrypt_artifact(&EncryptOptions {
        input_path: source.clone(),
        key_env: Some(env_name.to_string()),
        producer_version: "test".to_string(),
        ..EncryptOptions::default()
    })
    .expect("encrypt");
    assert!(encrypted.path.to_string_lossy().ends_with(".gaitenc"));
    assert_eq!(encrypted.artifact.algorithm, "aes-256-gcm");
    assert_eq!(encrypted.artifact.plain_size, 9);
    assert_eq!(encrypted.artifact.key_source.mode, "env");

    let output = dir.path().join("artifact_restored.json");
    let decrypted = decrypt_artifact(&DecryptOptions {
        input_path: encrypted.path,
        output_path: Some(output.clone()),
        key_env: Some(env_name.to_string()),
        ..DecryptOptions::default()
    })
    .expect("decrypt");
    assert_eq!(decrypted.plain_sha256, encrypted.artifact.plain_sha256);
    assert_eq!(std::fs::read(output).expect("read restored"), br#"{"k":"v"}"#);
}

#[test]
fn decrypt_with_wrong_key_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("artifact.json");
    std::fs::write(&source, b"payload").expect("write source");

    let right_env = "GAIT_ENCRYPTION_KEY_TEST_RIGHT";
    let wrong_env = "GAIT_ENCRYPTION_KEY_TEST_WRONG";
    std::env::set_var(right_env, BASE64.encode(b"0123456789abcdef0123456789abcdef"));
    std::env::set_var(wrong_env, BASE64.encode(b"ffffffffffffffffffffffffffffffff"));

    let encrypted = encrypt_artifact(&EncryptOptions {
        input_path: source,
        key_env: Some(right_env.to_string()),
        ..EncryptOptions::default()
    })
    .expect("encrypt");

    assert!(decrypt_artifact(&DecryptOptions {
        input_path: encrypted.path,
        key_env: Some(wrong_env.to_string()),
        ..DecryptOptions::default()
    })
    .is_err());
}
