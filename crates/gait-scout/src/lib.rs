// crates/gait-scout/src/lib.rs
// ============================================================================
// Module: GAIT Scout
// Description: Top-actions risk ranking over runpacks and traces.
// Purpose: Surface the riskiest recorded actions in a deterministic order.
// Dependencies: gait-core, gait-runpack
// ============================================================================

//! ## Overview
//! Scout scores every intent and trace by tool class, blast radius,
//! verdict, and reason codes, then ranks them under a total order so the
//! same input set always renders byte-identical reports.

pub mod top_actions;

pub use top_actions::TopActionsInput;
pub use top_actions::TopActionsOptions;
pub use top_actions::TopActionsReport;
pub use top_actions::build_top_actions_report;

use thiserror::Error;

/// Top-actions report schema identifier.
pub const TOP_ACTIONS_SCHEMA_ID: &str = "gait.report.top_actions";
/// Top-actions report schema version.
pub const TOP_ACTIONS_SCHEMA_VERSION: &str = "1.0.0";
/// Default report limit.
pub const DEFAULT_TOP_ACTIONS_LIMIT: usize = 5;
/// Maximum report limit.
pub const MAX_TOP_ACTIONS_LIMIT: usize = 20;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building top-actions reports.
#[derive(Debug, Error)]
pub enum ScoutError {
    /// Neither runpacks nor traces were provided.
    #[error("at least one runpack or trace path is required")]
    NoSources,
    /// A runpack could not be read.
    #[error("read runpack {path}: {source}")]
    Runpack {
        /// Runpack path that failed.
        path: String,
        /// Underlying runpack error.
        #[source]
        source: gait_runpack::RunpackError,
    },
    /// A trace file could not be read.
    #[error("read trace {path}: {source}")]
    TraceIo {
        /// Trace path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A trace file could not be parsed.
    #[error("parse trace {path}: {message}")]
    TraceParse {
        /// Trace path that failed.
        path: String,
        /// Parse failure detail.
        message: String,
    },
    /// A runpack was missing its run id.
    #[error("runpack {0} missing run_id")]
    MissingRunId(String),
    /// The provided sources held no scorable actions.
    #[error("no actions found in provided runpack/trace sources")]
    NoActions,
}
