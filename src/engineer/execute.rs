//! Merge processing - effectful operations
//!
//! Executes the state machine for one claimed merge request: rebase onto
//! the target, run gates, then merge/close - or route the failure.
//! Rebase and merge conflicts get a conflict task and a fresh dispatch;
//! gate failures stay retryable in place.

use crate::claim;
use crate::config::MergeQueueConfig;
use crate::convoy;
use crate::error::{Error, Result};
use crate::gate::{run_gate, run_gates, GateConfig, PipelineResult};
use crate::git::GitOps;
use crate::notify::Notifier;
use crate::store::fields::{mr_from_issue, set_fields};
use crate::store::{CreateOptions, IssueStore, UpdateOptions};
use crate::types::{short_sha, MergeRequest, MrStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest error text recorded on a merge request.
const MAX_ERROR_LEN: usize = 500;

/// Outcome of successfully processing one merge request
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Merge request that was processed
    pub mr_id: String,
    /// SHA of the resulting merge commit
    pub merge_commit: String,
}

/// The merge processor: owns the working tree for the duration of a claim
pub struct Engineer {
    store: Arc<dyn IssueStore>,
    git: Arc<dyn GitOps>,
    notifier: Arc<dyn Notifier>,
    config: MergeQueueConfig,
    workdir: PathBuf,
    worker: String,
}

impl Engineer {
    /// Create a merge processor.
    pub fn new(
        store: Arc<dyn IssueStore>,
        git: Arc<dyn GitOps>,
        notifier: Arc<dyn Notifier>,
        config: MergeQueueConfig,
        workdir: impl Into<PathBuf>,
        worker: impl Into<String>,
    ) -> Self {
        Self {
            store,
            git,
            notifier,
            config,
            workdir: workdir.into(),
            worker: worker.into(),
        }
    }

    /// The issue store this processor writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn IssueStore> {
        &self.store
    }

    /// The queue policy in effect.
    #[must_use]
    pub const fn config(&self) -> &MergeQueueConfig {
        &self.config
    }

    /// Worker identity used for claims.
    #[must_use]
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Process one merge request whose claim this worker holds.
    ///
    /// On gate failure the claim is released and the error recorded; the
    /// merge request stays open for retry. On conflict a conflict task is
    /// created and the merge request is left open but blocked. Both paths
    /// return the corresponding error after the bookkeeping is done.
    pub async fn process(&self, mr: &MergeRequest) -> Result<ProcessOutcome> {
        info!(mr = %mr.id, branch = %mr.branch, target = %mr.target, "processing merge request");
        let plan = crate::engineer::create_process_plan(mr, &self.config);
        for step in &plan.steps {
            debug!(mr = %mr.id, "plan: {step}");
        }

        if !self.config.setup_command.trim().is_empty() {
            let setup = GateConfig {
                cmd: self.config.setup_command.clone(),
                timeout: None,
            };
            let result = run_gate("setup", &setup, &self.workdir).await;
            if !result.passed {
                let detail = result.error.unwrap_or_else(|| "setup failed".to_string());
                return self.fail_gates(mr, &detail, false).await;
            }
        }

        self.git.fetch().await?;
        self.git.checkout(&mr.branch).await?;
        let target_ref = format!("origin/{}", mr.target);
        if let Err(e) = self.git.rebase(&target_ref).await {
            if let Err(abort) = self.git.abort_rebase().await {
                warn!(mr = %mr.id, error = %abort, "could not abort rebase");
            }
            return self.fail_conflict(mr, &e.to_string()).await;
        }

        let gates = self.config.gate_set();
        let pipeline = run_gates(&gates, self.config.gates_parallel, &self.workdir).await;
        if !pipeline.passed {
            return self.fail_pipeline(mr, &pipeline).await;
        }

        self.git.push(&mr.branch, true).await?;
        self.git.checkout(&mr.target).await?;
        // a stale local target would make the ff merge fail and look
        // like a conflict
        self.git.reset_hard(&target_ref).await?;
        if let Err(e) = self.git.merge_ff(&mr.branch).await {
            if let Err(abort) = self.git.abort_merge().await {
                warn!(mr = %mr.id, error = %abort, "could not abort merge");
            }
            return self.fail_conflict(mr, &e.to_string()).await;
        }
        let merge_commit = self.git.rev("HEAD").await?;
        self.git.push(&mr.target, false).await?;

        if self.config.delete_merged_branches {
            // branch cleanup never blocks a completed merge
            if let Err(e) = self.git.delete_branch(&mr.branch).await {
                warn!(branch = %mr.branch, error = %e, "could not delete local branch");
            }
            if let Err(e) = self.git.delete_remote_branch(&mr.branch).await {
                warn!(branch = %mr.branch, error = %e, "could not delete remote branch");
            }
        }

        self.close_merged(mr, &merge_commit).await?;
        info!(
            mr = %mr.id,
            commit = short_sha(&merge_commit),
            "merged {} into {}", mr.branch, mr.target
        );

        if !mr.source_issue.is_empty() {
            if let Err(e) = self
                .store
                .close_with_reason(&mr.source_issue, "merged")
                .await
            {
                warn!(issue = %mr.source_issue, error = %e, "could not close source issue");
            }
        }
        if let Some(convoy_id) = &mr.convoy {
            if let Err(e) =
                convoy::check_completion(self.store.as_ref(), self.notifier.as_ref(), convoy_id)
                    .await
            {
                warn!(convoy = %convoy_id, error = %e, "convoy completion check failed");
            }
        }

        Ok(ProcessOutcome {
            mr_id: mr.id.clone(),
            merge_commit,
        })
    }

    async fn close_merged(&self, mr: &MergeRequest, merge_commit: &str) -> Result<()> {
        let issue = self.store.show(&mr.id).await?;
        let description = set_fields(
            &issue.description,
            &[
                ("close_reason", "merged"),
                ("merge_commit", merge_commit),
                ("error", ""),
            ],
        );
        self.store
            .update(
                &mr.id,
                &UpdateOptions {
                    assignee: Some(String::new()),
                    description: Some(description),
                    ..Default::default()
                },
            )
            .await?;
        self.store.close_with_reason(&mr.id, "merged").await
    }

    async fn fail_pipeline(
        &self,
        mr: &MergeRequest,
        pipeline: &PipelineResult,
    ) -> Result<ProcessOutcome> {
        let detail = pipeline
            .error
            .clone()
            .unwrap_or_else(|| "gates failed".to_string());
        self.fail_gates(mr, &detail, pipeline.tests_failed).await
    }

    /// Gate failure: record the error, release the claim, leave the merge
    /// request open. Retry count is untouched; only conflicts count.
    async fn fail_gates(
        &self,
        mr: &MergeRequest,
        detail: &str,
        tests_failed: bool,
    ) -> Result<ProcessOutcome> {
        let issue = self.store.show(&mr.id).await?;
        let description = set_fields(
            &issue.description,
            &[("error", &flatten(detail)), ("claimed_at", "")],
        );
        self.store
            .update(
                &mr.id,
                &UpdateOptions {
                    assignee: Some(String::new()),
                    status: Some(MrStatus::Open.to_string()),
                    description: Some(description),
                    ..Default::default()
                },
            )
            .await?;
        Err(Error::GateFailure {
            mr: mr.id.clone(),
            detail: detail.to_string(),
            tests_failed,
        })
    }

    /// Conflict: create or reuse a conflict task, block the merge request
    /// on it, bump retry bookkeeping, and release the claim. A fresh
    /// worker is later dispatched against the task - the agent that
    /// produced the branch no longer exists by now.
    async fn fail_conflict(&self, mr: &MergeRequest, detail: &str) -> Result<ProcessOutcome> {
        let sha = self
            .git
            .rev(&mr.branch)
            .await
            .unwrap_or_else(|_| "unknown".to_string());

        let task = match self.existing_conflict_task(mr).await {
            Some(task) => task,
            None => {
                let task = self
                    .store
                    .create(&CreateOptions {
                        title: format!("Resolve conflict: {} -> {}", mr.branch, mr.target),
                        description: format!(
                            "Merge request {} hit a conflict rebasing {} onto {}.\n\
                             branch: {}\nconflict_sha: {}\n\n{}",
                            mr.id,
                            mr.branch,
                            mr.target,
                            mr.branch,
                            short_sha(&sha),
                            flatten(detail),
                        ),
                        issue_type: "task".to_string(),
                        priority: mr.priority,
                        parent: None,
                        ephemeral: false,
                    })
                    .await?;
                self.store.add_dependency(&mr.id, &task).await?;
                task
            }
        };

        let issue = self.store.show(&mr.id).await?;
        let retry = mr.retry_count + 1;
        let description = set_fields(
            &issue.description,
            &[
                ("error", &flatten(detail)),
                ("last_conflict_sha", &sha),
                ("conflict_task_id", &task),
                ("retry_count", &retry.to_string()),
                ("claimed_at", ""),
            ],
        );
        self.store
            .update(
                &mr.id,
                &UpdateOptions {
                    assignee: Some(String::new()),
                    status: Some(MrStatus::Open.to_string()),
                    description: Some(description),
                    ..Default::default()
                },
            )
            .await?;
        info!(mr = %mr.id, task = %task, retry, "conflict recorded, awaiting fresh dispatch");
        Err(Error::ConflictDetected {
            branch: mr.branch.clone(),
            target: mr.target.clone(),
            detail: detail.to_string(),
        })
    }

    async fn existing_conflict_task(&self, mr: &MergeRequest) -> Option<String> {
        let task = mr.conflict_task.as_ref()?;
        match self.store.show(task).await {
            Ok(issue) if MrStatus::parse(&issue.status) != MrStatus::Closed => Some(task.clone()),
            Ok(_) => None,
            Err(e) => {
                warn!(task = %task, error = %e, "could not check conflict task, creating a new one");
                None
            }
        }
    }

    /// Reject a merge request. Closes it with the reason but leaves the
    /// source issue open: the underlying work is not done.
    pub async fn reject(&self, mr: &MergeRequest, reason: &str, notify: bool) -> Result<()> {
        if mr.status == MrStatus::Closed {
            return Err(Error::ClosedImmutable(mr.id.clone()));
        }
        let full_reason = format!("rejected: {reason}");
        let issue = self.store.show(&mr.id).await?;
        let description = set_fields(&issue.description, &[("close_reason", &full_reason)]);
        self.store
            .update(
                &mr.id,
                &UpdateOptions {
                    assignee: Some(String::new()),
                    description: Some(description),
                    ..Default::default()
                },
            )
            .await?;
        self.store.close_with_reason(&mr.id, &full_reason).await?;
        info!(mr = %mr.id, reason, "merge request rejected");

        // the source issue stays open; leave a trace of why
        if !mr.source_issue.is_empty() {
            let note = format!("Merge request {} was rejected: {reason}", mr.id);
            if let Err(e) = self.store.add_comment(&mr.source_issue, &note).await {
                warn!(issue = %mr.source_issue, error = %e, "could not record rejection");
            }
        }

        if notify && !mr.submitted_by.is_empty() {
            let subject = format!("merge request {} rejected", mr.id);
            let body = format!("Branch {} was rejected: {reason}", mr.branch);
            if let Err(e) = self.notifier.send(&mr.submitted_by, &subject, &body).await {
                warn!(to = %mr.submitted_by, error = %e, "could not notify submitter");
            }
        }
        Ok(())
    }

    /// Retry a failed merge request.
    ///
    /// Only valid for an open merge request with a recorded error. Clears
    /// the error so the next poll cycle picks it up; with `now` the merge
    /// request is claimed and processed immediately instead.
    pub async fn retry(&self, mr_id: &str, now: bool) -> Result<Option<ProcessOutcome>> {
        let issue = self.store.show(mr_id).await?;
        let mr = mr_from_issue(&issue);
        if mr.status == MrStatus::Closed || mr.error.is_none() {
            return Err(Error::NotFailed(mr_id.to_string()));
        }

        let description = set_fields(&issue.description, &[("error", "")]);
        self.store
            .update(
                mr_id,
                &UpdateOptions {
                    description: Some(description),
                    ..Default::default()
                },
            )
            .await?;
        info!(mr = mr_id, now, "retry requested");

        if !now {
            return Ok(None);
        }
        let claimed = claim::claim(
            self.store.as_ref(),
            mr_id,
            &self.worker,
            self.config.stale_claim_timeout,
        )
        .await?;
        self.process(&claimed).await.map(Some)
    }
}

/// Collapse error text to a single bounded line fit for a field value.
fn flatten(text: &str) -> String {
    let line = text.replace('\n', " ");
    let line = line.trim();
    if line.len() > MAX_ERROR_LEN {
        let mut end = MAX_ERROR_LEN;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &line[..end])
    } else {
        line.to_string()
    }
}
