//! Git operations used by the merge processor
//!
//! Git is an external collaborator: rebase, merge, and push are primitive
//! subprocess operations. The trait exists so scheduling logic can be
//! tested against a recording fake without a real repository.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Git primitives consumed by the refinery
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Fetch all refs from origin.
    async fn fetch(&self) -> Result<()>;

    /// Check out a branch.
    async fn checkout(&self, branch: &str) -> Result<()>;

    /// Create a branch at the given start point without checking it out.
    async fn create_branch_from(&self, branch: &str, start: &str) -> Result<()>;

    /// Delete a local branch.
    async fn delete_branch(&self, branch: &str) -> Result<()>;

    /// Delete a branch on origin.
    async fn delete_remote_branch(&self, branch: &str) -> Result<()>;

    /// Whether a local branch exists.
    async fn branch_exists(&self, branch: &str) -> Result<bool>;

    /// Whether `origin/<branch>` exists.
    async fn remote_branch_exists(&self, branch: &str) -> Result<bool>;

    /// Rebase the current branch onto the given ref.
    async fn rebase(&self, onto: &str) -> Result<()>;

    /// Abort an in-progress rebase.
    async fn abort_rebase(&self) -> Result<()>;

    /// Fast-forward-only merge of a ref into the current branch.
    async fn merge_ff(&self, reference: &str) -> Result<()>;

    /// No-fast-forward merge of a ref into the current branch.
    async fn merge_no_ff(&self, reference: &str, message: &str) -> Result<()>;

    /// Abort an in-progress merge.
    async fn abort_merge(&self) -> Result<()>;

    /// Push a branch to origin, optionally forced.
    async fn push(&self, branch: &str, force: bool) -> Result<()>;

    /// Whether `ancestor` is an ancestor of `descendant`.
    async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;

    /// Number of commits `branch` is ahead of `base`.
    async fn commits_ahead(&self, branch: &str, base: &str) -> Result<u32>;

    /// Author date of the first commit unique to a branch, RFC 3339-ish.
    async fn branch_created_date(&self, branch: &str, base: &str) -> Result<Option<String>>;

    /// Resolve a ref to a commit SHA.
    async fn rev(&self, reference: &str) -> Result<String>;

    /// Hard-reset the current branch to a ref.
    async fn reset_hard(&self, reference: &str) -> Result<()>;

    /// Whether two refs have identical trees (an empty merge).
    async fn diff_empty(&self, a: &str, b: &str) -> Result<bool>;
}

/// `GitOps` implementation shelling out to the git CLI
#[derive(Debug, Clone)]
pub struct CliGit {
    repo: PathBuf,
}

impl CliGit {
    /// Create a git handle for the given repository root.
    #[must_use]
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    async fn run(&self, op: &str, args: &[&str]) -> Result<String> {
        debug!(op, ?args, "git call");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::git(op, format!("failed to run git: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::git(op, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Like `run`, but a non-zero exit is a boolean false, not an error.
    async fn check(&self, args: &[&str]) -> Result<bool> {
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::git("check", format!("failed to run git: {e}")))?;
        Ok(status.success())
    }
}

#[async_trait]
impl GitOps for CliGit {
    async fn fetch(&self) -> Result<()> {
        self.run("fetch", &["fetch", "origin", "--prune"]).await?;
        Ok(())
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        self.run("checkout", &["checkout", branch]).await?;
        Ok(())
    }

    async fn create_branch_from(&self, branch: &str, start: &str) -> Result<()> {
        self.run("branch", &["branch", branch, start]).await?;
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run("branch -D", &["branch", "-D", branch]).await?;
        Ok(())
    }

    async fn delete_remote_branch(&self, branch: &str) -> Result<()> {
        self.run("push --delete", &["push", "origin", "--delete", branch])
            .await?;
        Ok(())
    }

    async fn branch_exists(&self, branch: &str) -> Result<bool> {
        self.check(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])
        .await
    }

    async fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        self.check(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{branch}"),
        ])
        .await
    }

    async fn rebase(&self, onto: &str) -> Result<()> {
        self.run("rebase", &["rebase", onto]).await?;
        Ok(())
    }

    async fn abort_rebase(&self) -> Result<()> {
        self.run("rebase --abort", &["rebase", "--abort"]).await?;
        Ok(())
    }

    async fn merge_ff(&self, reference: &str) -> Result<()> {
        self.run("merge --ff-only", &["merge", "--ff-only", reference])
            .await?;
        Ok(())
    }

    async fn merge_no_ff(&self, reference: &str, message: &str) -> Result<()> {
        self.run("merge --no-ff", &["merge", "--no-ff", "-m", message, reference])
            .await?;
        Ok(())
    }

    async fn abort_merge(&self) -> Result<()> {
        self.run("merge --abort", &["merge", "--abort"]).await?;
        Ok(())
    }

    async fn push(&self, branch: &str, force: bool) -> Result<()> {
        let mut args = vec!["push", "origin", branch];
        if force {
            args.push("--force-with-lease");
        }
        self.run("push", &args).await?;
        Ok(())
    }

    async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        self.check(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await
    }

    async fn commits_ahead(&self, branch: &str, base: &str) -> Result<u32> {
        let out = self
            .run(
                "rev-list --count",
                &["rev-list", "--count", &format!("{base}..{branch}")],
            )
            .await?;
        out.parse()
            .map_err(|e| Error::git("rev-list --count", format!("bad count {out:?}: {e}")))
    }

    async fn branch_created_date(&self, branch: &str, base: &str) -> Result<Option<String>> {
        let out = self
            .run(
                "log",
                &[
                    "log",
                    "--reverse",
                    "--format=%aI",
                    &format!("{base}..{branch}"),
                ],
            )
            .await?;
        Ok(out.lines().next().map(str::to_string))
    }

    async fn rev(&self, reference: &str) -> Result<String> {
        self.run("rev-parse", &["rev-parse", reference]).await
    }

    async fn reset_hard(&self, reference: &str) -> Result<()> {
        self.run("reset --hard", &["reset", "--hard", reference])
            .await?;
        Ok(())
    }

    async fn diff_empty(&self, a: &str, b: &str) -> Result<bool> {
        self.check(&["diff", "--quiet", a, b]).await
    }
}
