//! Recording `GitOps` fake with per-operation error injection

use async_trait::async_trait;
use refinery::error::{Error, Result};
use refinery::git::GitOps;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// In-memory git for tests
#[derive(Default)]
pub struct MockGit {
    calls: Mutex<Vec<String>>,
    fail: Mutex<HashMap<String, String>>,
    local_branches: Mutex<HashSet<String>>,
    remote_branches: Mutex<HashSet<String>>,
    ancestors: Mutex<HashSet<(String, String)>>,
    commits_ahead: Mutex<u32>,
    diff_empty: Mutex<bool>,
}

impl MockGit {
    pub fn new() -> Self {
        Self {
            commits_ahead: Mutex::new(1),
            ..Default::default()
        }
    }

    /// Make the named operation fail with the given message.
    pub fn fail_on(&self, op: &str, message: &str) {
        self.fail
            .lock()
            .unwrap()
            .insert(op.to_string(), message.to_string());
    }

    pub fn add_local_branch(&self, branch: &str) {
        self.local_branches.lock().unwrap().insert(branch.to_string());
    }

    pub fn add_remote_branch(&self, branch: &str) {
        self.remote_branches
            .lock()
            .unwrap()
            .insert(branch.to_string());
    }

    /// Record that `ancestor` is an ancestor of `descendant`.
    pub fn add_ancestor(&self, ancestor: &str, descendant: &str) {
        self.ancestors
            .lock()
            .unwrap()
            .insert((ancestor.to_string(), descendant.to_string()));
    }

    pub fn set_commits_ahead(&self, n: u32) {
        *self.commits_ahead.lock().unwrap() = n;
    }

    pub fn set_diff_empty(&self, empty: bool) {
        *self.diff_empty.lock().unwrap() = empty;
    }

    /// All recorded calls, e.g. `"push feature/x"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change repository or remote state.
    pub fn mutating_calls(&self) -> Vec<String> {
        const MUTATING: &[&str] = &[
            "checkout",
            "branch",
            "delete-branch",
            "delete-remote-branch",
            "rebase",
            "merge",
            "push",
            "reset",
        ];
        self.calls()
            .into_iter()
            .filter(|c| MUTATING.iter().any(|m| c.starts_with(m)))
            .collect()
    }

    pub fn assert_called(&self, prefix: &str) {
        assert!(
            self.calls().iter().any(|c| c.starts_with(prefix)),
            "expected a git call starting with {prefix:?}, got {:?}",
            self.calls()
        );
    }

    pub fn assert_not_called(&self, prefix: &str) {
        assert!(
            !self.calls().iter().any(|c| c.starts_with(prefix)),
            "expected no git call starting with {prefix:?}, got {:?}",
            self.calls()
        );
    }

    fn record(&self, op: &str, subject: &str) -> Result<()> {
        self.calls.lock().unwrap().push(if subject.is_empty() {
            op.to_string()
        } else {
            format!("{op} {subject}")
        });
        if let Some(message) = self.fail.lock().unwrap().get(op) {
            return Err(Error::git(op, message));
        }
        Ok(())
    }
}

#[async_trait]
impl GitOps for MockGit {
    async fn fetch(&self) -> Result<()> {
        self.record("fetch", "")
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        self.record("checkout", branch)
    }

    async fn create_branch_from(&self, branch: &str, start: &str) -> Result<()> {
        self.record("branch", &format!("{branch} from {start}"))?;
        self.add_local_branch(branch);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.record("delete-branch", branch)?;
        self.local_branches.lock().unwrap().remove(branch);
        Ok(())
    }

    async fn delete_remote_branch(&self, branch: &str) -> Result<()> {
        self.record("delete-remote-branch", branch)?;
        self.remote_branches.lock().unwrap().remove(branch);
        Ok(())
    }

    async fn branch_exists(&self, branch: &str) -> Result<bool> {
        Ok(self.local_branches.lock().unwrap().contains(branch))
    }

    async fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        Ok(self.remote_branches.lock().unwrap().contains(branch))
    }

    async fn rebase(&self, onto: &str) -> Result<()> {
        self.record("rebase", onto)
    }

    async fn abort_rebase(&self) -> Result<()> {
        self.record("rebase-abort", "")
    }

    async fn merge_ff(&self, reference: &str) -> Result<()> {
        self.record("merge", reference)
    }

    async fn merge_no_ff(&self, reference: &str, _message: &str) -> Result<()> {
        self.record("merge", reference)
    }

    async fn abort_merge(&self) -> Result<()> {
        self.record("merge-abort", "")
    }

    async fn push(&self, branch: &str, force: bool) -> Result<()> {
        let subject = if force {
            format!("{branch} (force)")
        } else {
            branch.to_string()
        };
        self.record("push", &subject)?;
        self.add_remote_branch(branch);
        Ok(())
    }

    async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        Ok(self
            .ancestors
            .lock()
            .unwrap()
            .contains(&(ancestor.to_string(), descendant.to_string())))
    }

    async fn commits_ahead(&self, _branch: &str, _base: &str) -> Result<u32> {
        Ok(*self.commits_ahead.lock().unwrap())
    }

    async fn branch_created_date(&self, _branch: &str, _base: &str) -> Result<Option<String>> {
        Ok(Some("2026-07-30T09:00:00+00:00".to_string()))
    }

    async fn rev(&self, reference: &str) -> Result<String> {
        self.record("rev", reference)?;
        Ok(format!("sha-{reference}"))
    }

    async fn reset_hard(&self, reference: &str) -> Result<()> {
        self.record("reset", reference)
    }

    async fn diff_empty(&self, _a: &str, _b: &str) -> Result<bool> {
        Ok(*self.diff_empty.lock().unwrap())
    }
}
