//! Integration branch management
//!
//! An integration branch batches several merge requests for one epic;
//! the batch reaches main as a single atomic no-fast-forward merge when
//! the epic is landed. The resolved branch name and base are persisted
//! as metadata fields on the epic itself.

use crate::config::MergeQueueConfig;
use crate::error::{Error, Result};
use crate::gate::run_gates;
use crate::git::GitOps;
use crate::store::fields::{mr_from_issue, parse_fields, set_fields, DEFAULT_TARGET};
use crate::store::{IssueStore, ListOptions, UpdateOptions, MR_LABEL};
use crate::types::{CloseReason, MergeRequest, MrStatus};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Metadata field on an epic naming its integration branch.
const BRANCH_FIELD: &str = "integration_branch";

/// Metadata field on an epic naming the branch the batch merges into.
const BASE_FIELD: &str = "integration_base";

/// Git refuses these; we refuse them earlier with a better message.
fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[~^:\s\\?*\[]|\.\.|@\{").expect("static pattern"))
}

/// Validate a candidate integration branch name.
pub fn validate_branch_name(name: &str) -> Result<()> {
    let reject = |detail: &str| {
        Err(Error::Config(format!("invalid branch name {name:?}: {detail}")))
    };
    if name.is_empty() {
        return reject("empty");
    }
    if name.len() > 200 {
        return reject("longer than 200 characters");
    }
    if invalid_chars().is_match(name) {
        return reject("contains characters git refs forbid");
    }
    if name.ends_with(".lock") {
        return reject("ends with .lock");
    }
    if name.starts_with('/') || name.ends_with('/') || name.starts_with('.') || name.ends_with('.')
    {
        return reject("leading or trailing '/' or '.'");
    }
    if name.contains("//") {
        return reject("contains //");
    }
    Ok(())
}

/// Resolve a branch name template.
///
/// Recognized variables: `{epic}` (full epic ID), `{prefix}` (epic ID up
/// to the first `-`), `{user}`.
#[must_use]
pub fn resolve_branch_name(template: &str, epic: &str, user: &str) -> String {
    let prefix = epic.split('-').next().unwrap_or(epic);
    template
        .replace("{epic}", epic)
        .replace("{prefix}", prefix)
        .replace("{user}", user)
}

/// Options for landing an integration branch
#[derive(Debug, Clone, Copy, Default)]
pub struct LandOptions {
    /// Bypass the open-merge-request and open-children checks
    pub force: bool,
    /// Skip the gate pipeline on the merged result
    pub skip_tests: bool,
    /// Perform read-only checks and report the plan without mutating
    pub dry_run: bool,
}

/// What landing did (or would do)
#[derive(Debug, Clone)]
pub enum LandOutcome {
    /// Dry run: the steps that would have been performed
    DryRun {
        /// Human-readable plan lines
        plan: Vec<String>,
    },
    /// The branch was merged (or found already merged) and cleaned up
    Landed {
        /// SHA of the merge commit; `None` when already merged
        merge_commit: Option<String>,
        /// The branch was already an ancestor of the base
        already_merged: bool,
    },
}

/// Point-in-time report on an integration branch
#[derive(Debug, Clone)]
pub struct IntegrationStatus {
    /// Epic the branch belongs to
    pub epic: String,
    /// Integration branch name
    pub branch: String,
    /// Branch the batch merges into
    pub base: String,
    /// Author date of the first commit unique to the branch
    pub created: Option<String>,
    /// Commits ahead of the base
    pub commits_ahead: u32,
    /// Merge requests already merged into the branch
    pub merged: Vec<MergeRequest>,
    /// Merge requests still pending against the branch
    pub pending: Vec<MergeRequest>,
    /// Total children of the epic
    pub children_total: usize,
    /// Closed children of the epic
    pub children_closed: usize,
    /// Whether the branch is ready to land
    pub ready: bool,
    /// Whether policy would land it automatically
    pub auto_land: bool,
}

/// Manager for epic-scoped integration branches
pub struct IntegrationManager {
    store: Arc<dyn IssueStore>,
    git: Arc<dyn GitOps>,
    config: MergeQueueConfig,
    workdir: PathBuf,
    user: String,
}

impl IntegrationManager {
    /// Create a manager operating on the given working tree.
    pub fn new(
        store: Arc<dyn IssueStore>,
        git: Arc<dyn GitOps>,
        config: MergeQueueConfig,
        workdir: impl Into<PathBuf>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            store,
            git,
            config,
            workdir: workdir.into(),
            user: user.into(),
        }
    }

    async fn epic(&self, epic_id: &str) -> Result<crate::store::Issue> {
        let issue = self
            .store
            .show(epic_id)
            .await
            .map_err(|_| Error::EpicNotFound(epic_id.to_string()))?;
        let is_epic =
            issue.issue_type == "epic" || issue.labels.iter().any(|l| l == "gt:epic");
        if !is_epic {
            return Err(Error::EpicNotFound(format!(
                "{epic_id} is not an epic (type {})",
                issue.issue_type
            )));
        }
        Ok(issue)
    }

    /// Create an integration branch for an epic.
    ///
    /// Resolves the name from the rig's template (or an override),
    /// branches from the base on origin, pushes, and records the branch
    /// on the epic. Refuses to overwrite existing metadata unless forced.
    pub async fn create(
        &self,
        epic_id: &str,
        template_override: Option<&str>,
        force: bool,
    ) -> Result<String> {
        let epic = self.epic(epic_id).await?;
        let fields = parse_fields(&epic.description);
        if let Some(existing) = fields.get(BRANCH_FIELD) {
            if !force {
                return Err(Error::Integration {
                    epic: epic_id.to_string(),
                    detail: format!("already has integration branch {existing} (use --force)"),
                });
            }
        }

        let template = template_override
            .unwrap_or(&self.config.integration_branch_template);
        let name = resolve_branch_name(template, epic_id, &self.user);
        validate_branch_name(&name)?;
        let base = DEFAULT_TARGET;

        self.git.fetch().await?;
        self.git
            .create_branch_from(&name, &format!("origin/{base}"))
            .await?;
        if let Err(e) = self.git.push(&name, false).await {
            // leave no half-created local branch behind
            if let Err(del) = self.git.delete_branch(&name).await {
                warn!(branch = %name, error = %del, "could not clean up local branch");
            }
            return Err(e);
        }

        let description = set_fields(
            &epic.description,
            &[(BRANCH_FIELD, &name), (BASE_FIELD, base)],
        );
        self.store
            .update(
                epic_id,
                &UpdateOptions {
                    description: Some(description),
                    ..Default::default()
                },
            )
            .await?;
        info!(epic = epic_id, branch = %name, "integration branch created");
        Ok(name)
    }

    async fn branch_metadata(&self, epic: &crate::store::Issue) -> Result<(String, String)> {
        let fields = parse_fields(&epic.description);
        let branch = fields.get(BRANCH_FIELD).cloned().ok_or_else(|| {
            Error::Integration {
                epic: epic.id.clone(),
                detail: "no integration branch recorded".to_string(),
            }
        })?;
        let base = fields
            .get(BASE_FIELD)
            .cloned()
            .unwrap_or_else(|| DEFAULT_TARGET.to_string());
        Ok((branch, base))
    }

    /// Merge requests targeting a branch, split into (merged, pending).
    async fn partition_mrs(
        &self,
        branch: &str,
    ) -> Result<(Vec<MergeRequest>, Vec<MergeRequest>)> {
        let issues = self
            .store
            .list(&ListOptions {
                status: Some("all".to_string()),
                label: Some(MR_LABEL.to_string()),
                ..Default::default()
            })
            .await?;
        let mut merged = Vec::new();
        let mut pending = Vec::new();
        for mr in issues.iter().map(mr_from_issue) {
            if mr.target != branch {
                continue;
            }
            if mr.status == MrStatus::Closed {
                if mr.close_reason == Some(CloseReason::Merged) {
                    merged.push(mr);
                }
                // rejected/superseded MRs count for neither side
            } else {
                pending.push(mr);
            }
        }
        Ok((merged, pending))
    }

    /// Land an integration branch: one atomic no-fast-forward merge of
    /// the whole batch into the base, then cleanup.
    pub async fn land(&self, epic_id: &str, opts: LandOptions) -> Result<LandOutcome> {
        let epic = self.epic(epic_id).await?;
        let (branch, base) = self.branch_metadata(&epic).await?;
        let (_, pending) = self.partition_mrs(&branch).await?;

        if !pending.is_empty() && !opts.force {
            let names: Vec<&str> = pending.iter().map(|m| m.id.as_str()).collect();
            return Err(Error::Integration {
                epic: epic_id.to_string(),
                detail: format!(
                    "{} merge request(s) still pending against {branch}: {} (use --force)",
                    pending.len(),
                    names.join(", ")
                ),
            });
        }

        let open_children = self.open_children(&epic).await?;
        if !open_children.is_empty() && !opts.force {
            return Err(Error::Integration {
                epic: epic_id.to_string(),
                detail: format!(
                    "{} child issue(s) still open: {} (use --force)",
                    open_children.len(),
                    open_children.join(", ")
                ),
            });
        }

        if opts.dry_run {
            let mut plan = vec![
                format!("merge {branch} into {base} (no fast-forward)"),
            ];
            if !opts.skip_tests && !self.config.gate_set().is_empty() {
                plan.push(format!("run gates on {base}"));
            }
            plan.push(format!("push {base}"));
            plan.push(format!("close epic {epic_id}"));
            plan.push(format!("delete branch {branch} (remote and local)"));
            return Ok(LandOutcome::DryRun { plan });
        }

        self.git.fetch().await?;
        let branch_ref = format!("origin/{branch}");
        let base_ref = format!("origin/{base}");

        // landing twice is a no-op: skip straight to cleanup
        if self.git.is_ancestor(&branch_ref, &base_ref).await? {
            info!(epic = epic_id, branch = %branch, "already landed, cleaning up");
            self.cleanup(epic_id, &branch).await;
            return Ok(LandOutcome::Landed {
                merge_commit: None,
                already_merged: true,
            });
        }
        if self.git.diff_empty(&branch_ref, &base_ref).await? {
            return Err(Error::Integration {
                epic: epic_id.to_string(),
                detail: format!("merging {branch} into {base} would be empty"),
            });
        }

        self.git.checkout(&base).await?;
        self.git.reset_hard(&base_ref).await?;
        let message = format!("Merge {branch}: {}\n\nEpic: {epic_id}", epic.title);
        if let Err(e) = self.git.merge_no_ff(&branch_ref, &message).await {
            if let Err(abort) = self.git.abort_merge().await {
                warn!(error = %abort, "could not abort merge");
            }
            return Err(Error::Integration {
                epic: epic_id.to_string(),
                detail: format!("merge of {branch} into {base} conflicted: {e}"),
            });
        }

        if !opts.skip_tests {
            let gates = self.config.gate_set();
            let pipeline = run_gates(&gates, self.config.gates_parallel, &self.workdir).await;
            if !pipeline.passed {
                self.git.reset_hard(&base_ref).await?;
                return Err(Error::GateFailure {
                    mr: epic_id.to_string(),
                    detail: pipeline
                        .error
                        .unwrap_or_else(|| "gates failed".to_string()),
                    tests_failed: pipeline.tests_failed,
                });
            }
        }

        self.git.push(&base, false).await?;
        let merge_commit = self.git.rev("HEAD").await.ok();
        self.cleanup(epic_id, &branch).await;
        info!(epic = epic_id, branch = %branch, "integration branch landed");
        Ok(LandOutcome::Landed {
            merge_commit,
            already_merged: false,
        })
    }

    /// Close the epic, then delete the branch. Ordering matters: if
    /// deletion fails the epic is still closed and a re-run reaches the
    /// idempotent cleanup path again.
    async fn cleanup(&self, epic_id: &str, branch: &str) {
        if let Err(e) = self
            .store
            .close_with_reason(epic_id, &format!("landed: {branch}"))
            .await
        {
            warn!(epic = epic_id, error = %e, "could not close epic");
        }
        if let Err(e) = self.git.delete_remote_branch(branch).await {
            warn!(branch, error = %e, "could not delete remote branch");
        }
        match self.git.branch_exists(branch).await {
            Ok(true) => {
                if let Err(e) = self.git.delete_branch(branch).await {
                    warn!(branch, error = %e, "could not delete local branch");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(branch, error = %e, "could not check local branch"),
        }
    }

    async fn open_children(&self, epic: &crate::store::Issue) -> Result<Vec<String>> {
        let mut open = Vec::new();
        for child in &epic.children {
            let issue = self.store.show(child).await?;
            if MrStatus::parse(&issue.status) != MrStatus::Closed {
                open.push(child.clone());
            }
        }
        Ok(open)
    }

    /// Report on an epic's integration branch.
    pub async fn status(&self, epic_id: &str) -> Result<IntegrationStatus> {
        let epic = self.epic(epic_id).await?;
        let (branch, base) = self.branch_metadata(&epic).await?;
        let (merged, pending) = self.partition_mrs(&branch).await?;

        let branch_ref = format!("origin/{branch}");
        let base_ref = format!("origin/{base}");
        let commits_ahead = self.git.commits_ahead(&branch_ref, &base_ref).await?;
        let created = self
            .git
            .branch_created_date(&branch_ref, &base_ref)
            .await
            .unwrap_or_default();

        let children_total = epic.children.len();
        let children_closed = children_total - self.open_children(&epic).await?.len();
        let ready = commits_ahead > 0
            && children_total > 0
            && children_closed == children_total
            && pending.is_empty();

        Ok(IntegrationStatus {
            epic: epic_id.to_string(),
            branch,
            base,
            created,
            commits_ahead,
            merged,
            pending,
            children_total,
            children_closed,
            ready,
            auto_land: self.config.integration_auto_land,
        })
    }
}
