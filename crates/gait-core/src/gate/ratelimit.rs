// crates/gait-core/src/gate/ratelimit.rs
// ============================================================================
// Module: Rate-Limit State
// Description: File-backed sliding-window counter with advisory locking.
// Purpose: Enforce per-scope request budgets across concurrent evaluations.
// Dependencies: fs2, serde_json
// ============================================================================

//! ## Overview
//! The counter file is the only mutable on-disk state in the system. Every
//! acquisition takes an exclusive advisory lock, evicts timestamps older
//! than the window, and appends the current acquisition only when the
//! surviving count is under the limit. Concurrent acquisitions therefore
//! form a single total order: the Nth is allowed iff N <= `requests`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use fs2::FileExt;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Sliding-window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitWindow {
    /// Sixty-second window.
    Minute,
    /// Thirty-six-hundred-second window.
    Hour,
}

impl RateLimitWindow {
    /// Returns the window size in seconds.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3600,
        }
    }
}

impl FromStr for RateLimitWindow {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            other => Err(format!("invalid rate limit window: {other}")),
        }
    }
}

/// Counter scope selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// One counter per tool.
    Tool,
    /// One counter per identity.
    Identity,
    /// One counter per (tool, identity) pair.
    ToolIdentity,
}

impl RateLimitScope {
    /// Derives the counter key for this scope.
    #[must_use]
    pub fn key(self, tool_name: &str, identity: &str) -> String {
        match self {
            Self::Tool => format!("tool:{tool_name}"),
            Self::Identity => format!("identity:{identity}"),
            Self::ToolIdentity => format!("tool_identity:{tool_name}:{identity}"),
        }
    }
}

impl FromStr for RateLimitScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tool" => Ok(Self::Tool),
            "identity" => Ok(Self::Identity),
            "tool_identity" => Ok(Self::ToolIdentity),
            other => Err(format!("invalid rate limit scope: {other}")),
        }
    }
}

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the acquisition was admitted.
    pub allowed: bool,
    /// Count of acquisitions inside the window after this attempt.
    pub current: usize,
    /// Configured request budget.
    pub limit: i64,
}

/// Errors raised while acquiring rate-limit slots.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// State file I/O or locking failed.
    #[error("rate limit state io: {0}")]
    Io(#[from] std::io::Error),
    /// State file contents were malformed.
    #[error("rate limit state parse: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// SECTION: Acquisition
// ============================================================================

/// Attempts one acquisition against the scoped sliding window.
///
/// The state file maps scope keys to unix-second acquisition timestamps.
/// The file is created on first use; readers and writers both take the
/// exclusive lock.
///
/// # Errors
///
/// Returns [`RateLimitError`] when the state file cannot be locked, read,
/// or rewritten.
pub fn acquire(
    state_path: &Path,
    scope_key: &str,
    requests: i64,
    window: RateLimitWindow,
    now: OffsetDateTime,
) -> Result<RateLimitDecision, RateLimitError> {
    let mut file =
        OpenOptions::new().read(true).write(true).create(true).truncate(false).open(state_path)?;
    file.lock_exclusive()?;
    let result = acquire_locked(&mut file, scope_key, requests, window, now);
    let unlock = file.unlock();
    let decision = result?;
    unlock?;
    Ok(decision)
}

fn acquire_locked(
    file: &mut std::fs::File,
    scope_key: &str,
    requests: i64,
    window: RateLimitWindow,
    now: OffsetDateTime,
) -> Result<RateLimitDecision, RateLimitError> {
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;
    let mut state: BTreeMap<String, Vec<i64>> = if raw.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_str(&raw)?
    };

    let now_secs = now.unix_timestamp();
    let horizon = now_secs - window.seconds();
    let entries = state.entry(scope_key.to_string()).or_default();
    entries.retain(|ts| *ts > horizon);

    let allowed = i64::try_from(entries.len()).unwrap_or(i64::MAX) < requests;
    if allowed {
        entries.push(now_secs);
    }
    let current = entries.len();

    let encoded = serde_json::to_vec(&state)?;
    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    file.write_all(&encoded)?;
    file.flush()?;

    Ok(RateLimitDecision {
        allowed,
        current,
        limit: requests,
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn admits_up_to_the_limit_then_denies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ratelimit.json");
        let now = datetime!(2026-02-05 00:00:00 UTC);
        let key = RateLimitScope::ToolIdentity.key("tool.write", "agent@example");

        let mut allowed = 0;
        for _ in 0..10 {
            let decision =
                acquire(&path, &key, 2, RateLimitWindow::Minute, now).expect("acquire");
            if decision.allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 2);
    }

    #[test]
    fn window_eviction_frees_slots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ratelimit.json");
        let key = RateLimitScope::Tool.key("tool.fetch", "");

        let start = datetime!(2026-02-05 00:00:00 UTC);
        let first = acquire(&path, &key, 1, RateLimitWindow::Minute, start).expect("first");
        assert!(first.allowed);
        let denied = acquire(&path, &key, 1, RateLimitWindow::Minute, start).expect("denied");
        assert!(!denied.allowed);

        let later = start + time::Duration::seconds(61);
        let freed = acquire(&path, &key, 1, RateLimitWindow::Minute, later).expect("freed");
        assert!(freed.allowed);
    }

    #[test]
    fn scopes_use_independent_counters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ratelimit.json");
        let now = datetime!(2026-02-05 00:00:00 UTC);

        let first = RateLimitScope::ToolIdentity.key("tool.write", "alpha");
        let second = RateLimitScope::ToolIdentity.key("tool.write", "beta");
        assert!(acquire(&path, &first, 1, RateLimitWindow::Minute, now).expect("a").allowed);
        assert!(acquire(&path, &second, 1, RateLimitWindow::Minute, now).expect("b").allowed);
        assert!(!acquire(&path, &first, 1, RateLimitWindow::Minute, now).expect("c").allowed);
    }

    #[test]
    fn concurrent_acquisitions_admit_exactly_the_budget() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ratelimit.json");
        let now = datetime!(2026-02-05 00:00:00 UTC);
        let key = RateLimitScope::ToolIdentity.key("tool.write", "agent@example");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let path = path.clone();
            let key = key.clone();
            handles.push(std::thread::spawn(move || {
                acquire(&path, &key, 2, RateLimitWindow::Minute, now).expect("acquire").allowed
            }));
        }
        let admitted = handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 2);
    }
}
