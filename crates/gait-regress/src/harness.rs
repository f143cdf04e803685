// crates/gait-regress/src/harness.rs
// ============================================================================
// Module: Regression Harness
// Description: Fixture initialization and grader execution.
// Purpose: Grade fixture sets deterministically and report rolled-up results.
// Dependencies: gait-core, gait-runpack, serde_yaml
// ============================================================================

//! ## Overview
//! `init_fixture` seeds a fixture directory from a baseline runpack,
//! pinning the replay exit code and trajectories observed at init time.
//! `run` grades every fixture under the configured directory and writes a
//! canonical result record plus optional JUnit XML.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use gait_core::jcs;
use gait_core::schema::regress::FixtureMeta;
use gait_core::schema::regress::GraderResult;
use gait_core::schema::regress::RegressConfig;
use gait_core::schema::regress::RegressResult;
use gait_core::schema::regress::RegressStatus;
use gait_runpack::DiffPrivacy;
use gait_runpack::ReplayOptions;
use gait_runpack::diff_runpacks;
use gait_runpack::read_runpack;
use gait_runpack::replay_exit_code;
use gait_runpack::replay_stub;
use time::OffsetDateTime;

use crate::DEFAULT_CONFIG_NAME;
use crate::REGRESS_RESULT_SCHEMA_ID;
use crate::REGRESS_RESULT_SCHEMA_VERSION;
use crate::RegressError;
use crate::junit::render_junit;
use crate::trajectory::normalize_tool_sequence;
use crate::trajectory::normalize_verdict_sequence;
use crate::trajectory::tool_sequence_from_runpack;
use crate::trajectory::verdict_sequence_from_runpack;

// ============================================================================
// SECTION: Init
// ============================================================================

/// Options for seeding a fixture from a baseline runpack.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Source runpack archive.
    pub source_runpack_path: PathBuf,
    /// Harness working directory.
    pub work_dir: PathBuf,
}

/// Output of fixture initialization.
#[derive(Debug, Clone)]
pub struct InitResult {
    /// Fixture identifier (the baseline run id).
    pub fixture_id: String,
    /// Path of the written fixture metadata.
    pub fixture_path: PathBuf,
    /// Path of the harness config.
    pub config_path: PathBuf,
}

/// Seeds `fixtures/<run_id>/` with a baseline copy and pinned expectations.
///
/// # Errors
///
/// Returns [`RegressError`] on read, replay, or write failure.
pub fn init_fixture(options: &InitOptions) -> Result<InitResult, RegressError> {
    let pack = read_runpack(&options.source_runpack_path)?;
    let fixture_id = pack.run.run_id.clone();

    let fixtures_dir = options.work_dir.join("fixtures").join(&fixture_id);
    fs::create_dir_all(&fixtures_dir)?;
    let baseline_rel = PathBuf::from("fixtures").join(&fixture_id).join("baseline.zip");
    let baseline_abs = options.work_dir.join(&baseline_rel);
    fs::copy(&options.source_runpack_path, &baseline_abs)?;

    let replay = replay_stub(&baseline_abs, ReplayOptions::default())?;
    let meta = FixtureMeta {
        fixture_id: fixture_id.clone(),
        baseline_runpack: baseline_rel.to_string_lossy().replace('\\', "/"),
        candidate_runpack: String::new(),
        expected_replay_exit_code: replay_exit_code(&replay),
        expected_tool_sequence: tool_sequence_from_runpack(&pack),
        expected_verdict_sequence: verdict_sequence_from_runpack(&pack),
        diff_allow_changed_files: Vec::new(),
    };
    let fixture_path = fixtures_dir.join("fixture.json");
    fs::write(&fixture_path, jcs::canonical_json_bytes(&meta)?)?;

    let config_path = options.work_dir.join(DEFAULT_CONFIG_NAME);
    if !config_path.exists() {
        let config = RegressConfig::default();
        fs::write(&config_path, serde_yaml::to_string(&config).map_err(RegressError::Config)?)?;
    }
    tracing::debug!(fixture = %fixture_id, "initialized regression fixture");

    Ok(InitResult {
        fixture_id,
        fixture_path,
        config_path,
    })
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// Options for one harness run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Harness config path.
    pub config_path: PathBuf,
    /// Output path for the canonical result record.
    pub output_path: PathBuf,
    /// Working directory fixture paths resolve against.
    pub work_dir: PathBuf,
    /// Producer version stamped into the result.
    pub producer_version: String,
    /// Optional JUnit XML output path.
    pub junit_path: Option<PathBuf>,
    /// Report timestamp; the frozen epoch when absent.
    pub now: Option<OffsetDateTime>,
}

/// Outcome of one harness run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The rolled-up result as written.
    pub result: RegressResult,
    /// Count of failed graders.
    pub failed_graders: usize,
    /// Path the result record was written to.
    pub output_path: PathBuf,
}

/// Grades every fixture and writes the result record.
///
/// # Errors
///
/// Returns [`RegressError`] on config, fixture, or I/O failure. Grader
/// failures are reported in the result, not as errors.
pub fn run(options: &RunOptions) -> Result<RunOutcome, RegressError> {
    let config: RegressConfig = serde_yaml::from_slice(&fs::read(&options.config_path)?)?;
    let fixtures_root = options.work_dir.join(&config.fixtures_dir);

    let mut fixture_dirs: Vec<PathBuf> = fs::read_dir(&fixtures_root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    fixture_dirs.sort();
    if fixture_dirs.is_empty() {
        return Err(RegressError::NoFixtures(fixtures_root.display().to_string()));
    }

    let mut graders = Vec::new();
    for fixture_dir in &fixture_dirs {
        let meta_path = fixture_dir.join("fixture.json");
        let meta = read_fixture_meta(&meta_path)?;
        grade_fixture(&options.work_dir, &meta, &mut graders)?;
    }

    let failed_graders =
        graders.iter().filter(|grader| grader.status == RegressStatus::Fail).count();
    let status = if failed_graders == 0 { RegressStatus::Pass } else { RegressStatus::Fail };
    let result = RegressResult {
        schema_id: REGRESS_RESULT_SCHEMA_ID.to_string(),
        schema_version: REGRESS_RESULT_SCHEMA_VERSION.to_string(),
        created_at: options.now.unwrap_or_else(gait_core::frozen_epoch),
        producer_version: if options.producer_version.is_empty() {
            gait_core::DEFAULT_PRODUCER_VERSION.to_string()
        } else {
            options.producer_version.clone()
        },
        status,
        fixture_count: fixture_dirs.len(),
        graders,
    };

    if let Some(parent) = options.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&options.output_path, jcs::canonical_json_bytes(&result)?)?;
    if let Some(junit_path) = &options.junit_path {
        fs::write(junit_path, render_junit(&result))?;
    }
    tracing::debug!(
        status = result.status.as_str(),
        fixtures = result.fixture_count,
        failed = failed_graders,
        "graded regression fixtures"
    );

    Ok(RunOutcome {
        result,
        failed_graders,
        output_path: options.output_path.clone(),
    })
}

/// Reads fixture metadata from disk.
///
/// # Errors
///
/// Returns [`RegressError::Fixture`] on parse failure.
pub fn read_fixture_meta(path: &Path) -> Result<FixtureMeta, RegressError> {
    let raw = fs::read(path)?;
    serde_json::from_slice(&raw).map_err(|err| RegressError::Fixture {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Writes fixture metadata as canonical JSON.
///
/// # Errors
///
/// Returns [`RegressError`] on encoding or I/O failure.
pub fn write_fixture_meta(path: &Path, meta: &FixtureMeta) -> Result<(), RegressError> {
    fs::write(path, jcs::canonical_json_bytes(meta)?)?;
    Ok(())
}

// ============================================================================
// SECTION: Graders
// ============================================================================

fn grade_fixture(
    work_dir: &Path,
    meta: &FixtureMeta,
    graders: &mut Vec<GraderResult>,
) -> Result<(), RegressError> {
    let baseline = resolve(work_dir, &meta.baseline_runpack);
    graders.push(grade_expected_exit_code(meta, &baseline));
    graders.push(grade_diff(work_dir, meta, &baseline));
    graders.push(grade_trajectory(meta, &baseline)?);
    Ok(())
}

fn grade_expected_exit_code(meta: &FixtureMeta, baseline: &Path) -> GraderResult {
    let name = format!("{}/expected_exit_code", meta.fixture_id);
    match replay_stub(baseline, ReplayOptions::default()) {
        Ok(replay) if replay_exit_code(&replay) == meta.expected_replay_exit_code => {
            pass(name)
        }
        Ok(_) => fail(name, "unexpected_exit_code"),
        Err(_) => fail(name, "replay_failed"),
    }
}

fn grade_diff(work_dir: &Path, meta: &FixtureMeta, baseline: &Path) -> GraderResult {
    let name = format!("{}/diff", meta.fixture_id);
    if meta.candidate_runpack.is_empty() {
        return pass(name);
    }
    let candidate = resolve(work_dir, &meta.candidate_runpack);
    match diff_runpacks(baseline, &candidate, DiffPrivacy::Full) {
        Ok(diff) => {
            let unexpected = diff
                .summary
                .files_changed
                .iter()
                .any(|path| !meta.diff_allow_changed_files.contains(path));
            if unexpected { fail(name, "unexpected_diff") } else { pass(name) }
        }
        Err(_) => fail(name, "diff_failed"),
    }
}

fn grade_trajectory(meta: &FixtureMeta, baseline: &Path) -> Result<GraderResult, RegressError> {
    let name = format!("{}/trajectory", meta.fixture_id);
    let pack = match read_runpack(baseline) {
        Ok(pack) => pack,
        Err(_) => return Ok(fail(name, "runpack_unreadable")),
    };

    let mut reasons = Vec::new();
    let expected_tools = normalize_tool_sequence(&meta.expected_tool_sequence);
    if !expected_tools.is_empty() && tool_sequence_from_runpack(&pack) != expected_tools {
        reasons.push("unexpected_tool_sequence".to_string());
    }
    let expected_verdicts = normalize_verdict_sequence(&meta.expected_verdict_sequence)?;
    if !expected_verdicts.is_empty() && verdict_sequence_from_runpack(&pack) != expected_verdicts {
        reasons.push("unexpected_verdict_sequence".to_string());
    }

    Ok(if reasons.is_empty() {
        pass(name)
    } else {
        GraderResult {
            name,
            status: RegressStatus::Fail,
            reason_codes: reasons,
        }
    })
}

fn pass(name: String) -> GraderResult {
    GraderResult {
        name,
        status: RegressStatus::Pass,
        reason_codes: Vec::new(),
    }
}

fn fail(name: String, reason: &str) -> GraderResult {
    GraderResult {
        name,
        status: RegressStatus::Fail,
        reason_codes: vec![reason.to_string()],
    }
}

fn resolve(work_dir: &Path, relative: &str) -> PathBuf {
    let candidate = PathBuf::from(relative);
    if candidate.is_absolute() { candidate } else { work_dir.join(candidate) }
}
