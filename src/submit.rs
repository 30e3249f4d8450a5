//! Merge request submission
//!
//! Workers submit a finished branch for integration. Submission is
//! idempotent per branch: an existing open merge request for the same
//! branch is returned instead of creating a duplicate.

use crate::error::Result;
use crate::store::fields::{mr_from_issue, new_mr_description, DEFAULT_TARGET};
use crate::store::{CreateOptions, IssueStore, ListOptions, MR_LABEL, MR_TYPE};
use crate::types::MrStatus;
use tracing::info;

/// What a worker hands to the queue
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Source branch to be merged
    pub branch: String,
    /// Target branch; `None` = default target
    pub target: Option<String>,
    /// Issue the work was done for
    pub source_issue: String,
    /// Submitting worker name
    pub worker: String,
    /// Rig (project) the merge request belongs to
    pub rig: String,
    /// Priority 0-4; usually inherited from the source issue
    pub priority: u8,
    /// Convoy the source issue belongs to, if any
    pub convoy: Option<String>,
}

/// Find an existing open merge request for a branch.
pub async fn find_mr_for_branch(
    store: &dyn IssueStore,
    branch: &str,
) -> Result<Option<String>> {
    let issues = store
        .list(&ListOptions {
            status: Some("all".to_string()),
            label: Some(MR_LABEL.to_string()),
            ..Default::default()
        })
        .await?;
    Ok(issues
        .iter()
        .map(|issue| mr_from_issue(issue))
        .find(|mr| mr.branch == branch && mr.status != MrStatus::Closed)
        .map(|mr| mr.id))
}

/// Submit a branch to the merge queue, returning the merge request ID.
///
/// If an open merge request for the branch already exists its ID is
/// returned unchanged.
pub async fn submit(store: &dyn IssueStore, opts: &SubmitOptions) -> Result<String> {
    if let Some(existing) = find_mr_for_branch(store, &opts.branch).await? {
        info!(branch = %opts.branch, mr = %existing, "merge request already queued");
        return Ok(existing);
    }

    let target = opts.target.as_deref().unwrap_or(DEFAULT_TARGET);
    let description = new_mr_description(
        &opts.branch,
        target,
        &opts.source_issue,
        &opts.worker,
        &opts.rig,
        opts.convoy.as_deref(),
    );
    let id = store
        .create(&CreateOptions {
            title: format!("Merge: {}", opts.source_issue),
            description,
            issue_type: MR_TYPE.to_string(),
            priority: opts.priority,
            parent: None,
            ephemeral: true,
        })
        .await?;
    info!(branch = %opts.branch, mr = %id, target, "merge request submitted");
    Ok(id)
}
