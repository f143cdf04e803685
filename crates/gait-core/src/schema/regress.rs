// crates/gait-core/src/schema/regress.rs
// ============================================================================
// Module: Regression Records
// Description: Fixture metadata, grader results, and regression reports.
// Purpose: Define the wire shapes exchanged by the regression harness.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A regression fixture pins a baseline runpack, the expected replay exit
//! code, optional expected trajectories, and the diff tolerances. Graders
//! produce pass/fail results with stable reason codes; the harness rolls
//! them up into one report.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Regression harness configuration (`gait.yaml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressConfig {
    /// Directory holding one subdirectory per fixture.
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: String,
}

impl Default for RegressConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: default_fixtures_dir(),
        }
    }
}

fn default_fixtures_dir() -> String {
    "fixtures".to_string()
}

/// Metadata for one regression fixture (`fixture.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureMeta {
    /// Fixture identifier (defaults to the baseline run id).
    pub fixture_id: String,
    /// Path to the baseline runpack archive.
    pub baseline_runpack: String,
    /// Optional path to a candidate runpack for diffing.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub candidate_runpack: String,
    /// Expected replay exit code for the baseline.
    pub expected_replay_exit_code: i32,
    /// Expected tool sequence, when pinned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_tool_sequence: Vec<String>,
    /// Expected verdict sequence, when pinned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_verdict_sequence: Vec<String>,
    /// Changed files tolerated by the diff grader.
    #[serde(default)]
    pub diff_allow_changed_files: Vec<String>,
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Pass/fail status for graders and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressStatus {
    /// All checks passed.
    Pass,
    /// At least one check failed.
    Fail,
}

impl RegressStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

/// Result of one grader over one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraderResult {
    /// Grader name (`<fixture>/<grader>`).
    pub name: String,
    /// Grader status.
    pub status: RegressStatus,
    /// Stable failure reason codes; empty on pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason_codes: Vec<String>,
}

/// Rolled-up regression report.
///
/// # Invariants
/// - `status` is `pass` iff every grader passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressResult {
    /// Schema identifier (`gait.regress.result`).
    pub schema_id: String,
    /// Schema version.
    pub schema_version: String,
    /// Report timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Version of the producing engine.
    pub producer_version: String,
    /// Overall status.
    pub status: RegressStatus,
    /// Number of fixtures graded.
    pub fixture_count: usize,
    /// Grader results in fixture order.
    pub graders: Vec<GraderResult>,
}
