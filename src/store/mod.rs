//! Issue store abstraction
//!
//! The durable record for merge requests, epics, and conflict tasks is an
//! external issue tracker reached through its CLI. The scheduling core
//! only sees this narrow trait, so tests substitute an in-memory fake and
//! subprocess details never leak into scheduling logic.

mod beads;
pub mod fields;

pub use beads::BeadsStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Label attached to every merge-request issue.
pub const MR_LABEL: &str = "gt:merge-request";

/// Issue type used for merge requests.
pub const MR_TYPE: &str = "merge-request";

/// An issue record as the store returns it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    /// Issue ID
    pub id: String,
    /// Issue title
    pub title: String,
    /// Free-text description; merge requests keep structured fields here
    #[serde(default)]
    pub description: String,
    /// open, in_progress, or closed
    pub status: String,
    /// Priority 0-4, lower is more urgent
    #[serde(default)]
    pub priority: i64,
    /// Issue type (merge-request, epic, task, ...)
    #[serde(default)]
    pub issue_type: String,
    /// Creation timestamp, RFC 3339
    #[serde(default)]
    pub created_at: String,
    /// Last-update timestamp, RFC 3339
    #[serde(default)]
    pub updated_at: String,
    /// Close timestamp, RFC 3339, when closed
    #[serde(default)]
    pub closed_at: Option<String>,
    /// Parent issue ID, if any
    #[serde(default)]
    pub parent: Option<String>,
    /// Assigned worker, empty when unassigned
    #[serde(default)]
    pub assignee: String,
    /// Child issue IDs
    #[serde(default)]
    pub children: Vec<String>,
    /// Issues this one is blocked by
    #[serde(default)]
    pub blocked_by: Vec<String>,
    /// Labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// Ephemeral issues are excluded from long-term reporting
    #[serde(default)]
    pub ephemeral: bool,
}

/// Filters for listing issues
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Filter by status: "open", "closed", "in_progress", or "all"
    pub status: Option<String>,
    /// Filter by label
    pub label: Option<String>,
    /// Filter by assignee
    pub assignee: Option<String>,
    /// Filter by parent issue
    pub parent: Option<String>,
    /// Maximum results; `None` = unlimited
    pub limit: Option<usize>,
}

/// Fields for creating an issue
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Issue title
    pub title: String,
    /// Issue description
    pub description: String,
    /// Issue type, recorded as a `gt:<type>` label
    pub issue_type: String,
    /// Priority 0-4
    pub priority: u8,
    /// Parent issue, if any
    pub parent: Option<String>,
    /// Whether the issue is ephemeral
    pub ephemeral: bool,
}

/// Optional field updates; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// New title
    pub title: Option<String>,
    /// New status
    pub status: Option<String>,
    /// New priority
    pub priority: Option<u8>,
    /// New description
    pub description: Option<String>,
    /// New assignee; empty string clears the assignment
    pub assignee: Option<String>,
}

/// Narrow interface to the external issue store
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Fetch a single issue by ID.
    async fn show(&self, id: &str) -> Result<Issue>;

    /// List issues matching the filters.
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Issue>>;

    /// Create an issue, returning its ID.
    async fn create(&self, opts: &CreateOptions) -> Result<String>;

    /// Update fields on an issue.
    async fn update(&self, id: &str, opts: &UpdateOptions) -> Result<()>;

    /// Close an issue with a reason.
    async fn close_with_reason(&self, id: &str, reason: &str) -> Result<()>;

    /// Record that `id` depends on `depends_on`.
    async fn add_dependency(&self, id: &str, depends_on: &str) -> Result<()>;

    /// Append a comment to an issue.
    async fn add_comment(&self, id: &str, text: &str) -> Result<()>;
}
