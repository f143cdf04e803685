// crates/gait-regress/src/lib.rs
// ============================================================================
// Module: GAIT Regression Harness
// Description: Replay, diff, and trajectory grading over runpack fixtures.
// Purpose: Catch behavior drift with bit-exact replay and bounded tolerances.
// Dependencies: gait-core, gait-runpack, serde_yaml
// ============================================================================

//! ## Overview
//! The harness grades fixtures with three graders: the expected replay exit
//! code, the diff against a candidate runpack bounded by an allow-list of
//! changed files, and the tool/verdict trajectory. A fixture set passes
//! only when every grader of every fixture passes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod harness;
pub mod junit;
pub mod trajectory;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use harness::InitOptions;
pub use harness::InitResult;
pub use harness::RunOptions;
pub use harness::RunOutcome;
pub use harness::init_fixture;
pub use harness::run;
pub use junit::render_junit;
pub use trajectory::tool_sequence_from_runpack;
pub use trajectory::verdict_sequence_from_runpack;

use thiserror::Error;

/// Regression result schema identifier.
pub const REGRESS_RESULT_SCHEMA_ID: &str = "gait.regress.result";
/// Regression result schema version.
pub const REGRESS_RESULT_SCHEMA_VERSION: &str = "1.0.0";
/// Default harness config file name.
pub const DEFAULT_CONFIG_NAME: &str = "gait.yaml";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the regression harness.
#[derive(Debug, Error)]
pub enum RegressError {
    /// Harness I/O failed.
    #[error("regress io: {0}")]
    Io(#[from] std::io::Error),
    /// Config file could not be parsed.
    #[error("parse regress config: {0}")]
    Config(#[from] serde_yaml::Error),
    /// Fixture metadata could not be parsed.
    #[error("parse fixture {path}: {message}")]
    Fixture {
        /// Fixture path that failed.
        path: String,
        /// Parse failure detail.
        message: String,
    },
    /// A runpack operation failed.
    #[error(transparent)]
    Runpack(#[from] gait_runpack::RunpackError),
    /// Canonical encoding failed.
    #[error("canonical encode: {0}")]
    Canonical(#[from] gait_core::jcs::JcsError),
    /// An expected verdict label was invalid.
    #[error("invalid verdict {0:?}")]
    InvalidVerdict(String),
    /// The fixtures directory held no fixtures.
    #[error("no fixtures found under {0}")]
    NoFixtures(String),
}
