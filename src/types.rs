//! Core types for the refinery merge queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a merge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MrStatus {
    /// Awaiting processing, claimable
    Open,
    /// Claimed and being processed by a worker
    InProgress,
    /// Terminal; never re-opens except via explicit retry from a failed state
    Closed,
}

impl std::fmt::Display for MrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl MrStatus {
    /// Parse a status string from the issue store.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }
}

/// Why a merge request was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Work was merged to its target
    Merged,
    /// Explicitly rejected by an operator or automation
    Rejected,
    /// Closed because of an unresolvable conflict
    Conflict,
    /// Replaced by a newer merge request for the same work
    Superseded,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::Rejected => write!(f, "rejected"),
            Self::Conflict => write!(f, "conflict"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

/// A time-bounded exclusive lease held by one worker on a merge request
///
/// The timestamp is kept as the raw string from the store: staleness checks
/// must distinguish "empty" (legacy record, treated as not stale) from
/// "unparseable" (an error), and that distinction is lost after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Worker holding the claim
    pub worker: String,
    /// RFC 3339 timestamp of claim acquisition; may be empty on legacy records
    pub claimed_at: String,
}

/// A merge request: one branch's pending integration into a target branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Issue ID backing this merge request
    pub id: String,
    /// Source branch to be merged
    pub branch: String,
    /// Target branch (main or an integration branch)
    pub target: String,
    /// Issue the work was done for
    pub source_issue: String,
    /// Worker that submitted the branch
    pub submitted_by: String,
    /// Rig (project) this merge request belongs to
    pub rig: String,
    /// Priority 0-4, lower is more urgent
    pub priority: u8,
    /// Lifecycle status
    pub status: MrStatus,
    /// Close reason, only when closed
    pub close_reason: Option<CloseReason>,
    /// Active lease, if any; absent = unclaimed
    pub claim: Option<Claim>,
    /// Number of conflict-class retries
    pub retry_count: u32,
    /// Commit SHA of the branch head at the last conflict
    pub last_conflict_sha: Option<String>,
    /// Issue created to track conflict resolution
    pub conflict_task: Option<String>,
    /// Issues that block processing of this merge request
    pub blocked_by: Vec<String>,
    /// Last failure description, if any
    pub error: Option<String>,
    /// Convoy this merge request's source issue belongs to, if any
    pub convoy: Option<String>,
    /// When the merge request was created
    pub created_at: DateTime<Utc>,
    /// When the merge request was last updated
    pub updated_at: DateTime<Utc>,
}

impl MergeRequest {
    /// Whether a worker currently holds a claim (staleness not considered).
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }
}

/// Kind of queue anomaly detected by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Claimed, but the claim has outlived the stale-claim timeout
    StaleClaim,
    /// Blocked-by task is still open
    Blocked,
    /// Neither local nor remote copy of the source branch exists
    NoBranch,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleClaim => write!(f, "stale-claim"),
            Self::Blocked => write!(f, "blocked"),
            Self::NoBranch => write!(f, "no-branch"),
        }
    }
}

/// Severity of a queue anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational; normal queue mechanics will resolve it
    Info,
    /// Needs operator attention
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// An observational diagnostic about one open merge request
///
/// Derived at scan time, never persisted; remediation is a separate
/// explicit action (retry/release/reject).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueAnomaly {
    /// Anomaly classification
    pub kind: AnomalyKind,
    /// How urgent this is
    pub severity: Severity,
    /// Affected merge request ID
    pub mr_id: String,
    /// Source branch of the merge request
    pub branch: String,
    /// Claim holder or assignee, if any
    pub assignee: Option<String>,
    /// Human-readable age of the merge request
    pub age: String,
    /// Human-readable description of the anomaly
    pub detail: String,
}

/// Format a duration as a compact human age like "45s", "5m", "2h", "3d".
#[must_use]
pub fn format_age(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

/// Shorten a commit SHA for display.
#[must_use]
pub fn short_sha(sha: &str) -> &str {
    if sha.len() > 8 { &sha[..8] } else { sha }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_age_buckets() {
        assert_eq!(format_age(chrono::Duration::seconds(45)), "45s");
        assert_eq!(format_age(chrono::Duration::seconds(300)), "5m");
        assert_eq!(format_age(chrono::Duration::hours(7)), "7h");
        assert_eq!(format_age(chrono::Duration::days(3)), "3d");
        assert_eq!(format_age(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn status_parse_defaults_to_open() {
        assert_eq!(MrStatus::parse("in_progress"), MrStatus::InProgress);
        assert_eq!(MrStatus::parse("closed"), MrStatus::Closed);
        assert_eq!(MrStatus::parse("open"), MrStatus::Open);
        assert_eq!(MrStatus::parse("weird"), MrStatus::Open);
    }

    #[test]
    fn short_sha_truncates() {
        assert_eq!(short_sha("0123456789abcdef"), "01234567");
        assert_eq!(short_sha("abc"), "abc");
    }
}
