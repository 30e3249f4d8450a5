//! Error types for refinery

use thiserror::Error;

/// Result type alias using the refinery error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in refinery operations
#[derive(Debug, Error)]
pub enum Error {
    /// Another worker holds a non-stale claim on the merge request
    #[error("merge request {mr} is already claimed by {holder}")]
    AlreadyClaimed {
        /// Merge request ID
        mr: String,
        /// Worker currently holding the claim
        holder: String,
    },

    /// No merge request matched the given ID or branch query
    #[error("merge request not found: {0}")]
    MrNotFound(String),

    /// Retry requested on a merge request that has no recorded failure
    #[error("merge request {0} is not in a failed state")]
    NotFailed(String),

    /// Mutation attempted on a closed merge request
    #[error("merge request {0} is closed and cannot be modified")]
    ClosedImmutable(String),

    /// One or more validation gates failed or timed out
    #[error("gates failed for {mr}: {detail}")]
    GateFailure {
        /// Merge request ID
        mr: String,
        /// Combined failure text from the pipeline
        detail: String,
        /// True when a test gate was among the failures
        tests_failed: bool,
    },

    /// Rebase or merge conflict; requires a fresh dispatch, not an in-place retry
    #[error("conflict on {branch} against {target}: {detail}")]
    ConflictDetected {
        /// Source branch that conflicted
        branch: String,
        /// Target branch it was being integrated into
        target: String,
        /// Conflict description from git
        detail: String,
    },

    /// Invalid or malformed configuration; never silently defaulted
    #[error("configuration error: {0}")]
    Config(String),

    /// Issue store subprocess or protocol failure
    #[error("issue store {op} failed: {detail}")]
    Store {
        /// Store operation that failed
        op: String,
        /// Error detail from the store
        detail: String,
    },

    /// Git subprocess failure
    #[error("git {op} failed: {detail}")]
    Git {
        /// Git operation that failed
        op: String,
        /// Error detail from git
        detail: String,
    },

    /// Epic lookup failed or the issue is not an epic
    #[error("epic not found: {0}")]
    EpicNotFound(String),

    /// Integration branch error (bad name, missing metadata, not ready)
    #[error("integration branch error for {epic}: {detail}")]
    Integration {
        /// Epic the integration branch belongs to
        epic: String,
        /// What went wrong
        detail: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON parse error from the issue store
    #[error("invalid JSON from issue store: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a store failure with operation context.
    pub fn store(op: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Store {
            op: op.into(),
            detail: detail.to_string(),
        }
    }

    /// Wrap a git failure with operation context.
    pub fn git(op: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Git {
            op: op.into(),
            detail: detail.to_string(),
        }
    }
}
