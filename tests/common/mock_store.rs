//! In-memory `IssueStore` with call recording and error injection

use async_trait::async_trait;
use refinery::error::{Error, Result};
use refinery::store::{CreateOptions, Issue, IssueStore, ListOptions, UpdateOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory issue store for tests
#[derive(Default)]
pub struct MockStore {
    issues: Mutex<HashMap<String, Issue>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    fail_op: Mutex<Option<String>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an issue.
    pub fn insert(&self, issue: Issue) {
        self.issues
            .lock()
            .unwrap()
            .insert(issue.id.clone(), issue);
    }

    /// Make the named operation fail with an injected error.
    pub fn fail_on(&self, op: &str) {
        *self.fail_op.lock().unwrap() = Some(op.to_string());
    }

    /// Snapshot an issue by ID.
    pub fn get(&self, id: &str) -> Option<Issue> {
        self.issues.lock().unwrap().get(id).cloned()
    }

    /// All recorded calls, e.g. `"update gt-1"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn assert_called(&self, prefix: &str) {
        assert!(
            self.calls().iter().any(|c| c.starts_with(prefix)),
            "expected a call starting with {prefix:?}, got {:?}",
            self.calls()
        );
    }

    pub fn assert_not_called(&self, prefix: &str) {
        assert!(
            !self.calls().iter().any(|c| c.starts_with(prefix)),
            "expected no call starting with {prefix:?}, got {:?}",
            self.calls()
        );
    }

    fn record(&self, op: &str, subject: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{op} {subject}"));
        if self.fail_op.lock().unwrap().as_deref() == Some(op) {
            return Err(Error::store(op, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl IssueStore for MockStore {
    async fn show(&self, id: &str) -> Result<Issue> {
        self.record("show", id)?;
        self.get(id)
            .ok_or_else(|| Error::store("show", format!("no issue {id}")))
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<Issue>> {
        self.record("list", opts.label.as_deref().unwrap_or(""))?;
        let issues = self.issues.lock().unwrap();
        let mut out: Vec<Issue> = issues
            .values()
            .filter(|i| match opts.status.as_deref() {
                None | Some("all") => true,
                Some(s) => i.status == s,
            })
            .filter(|i| {
                opts.label
                    .as_ref()
                    .is_none_or(|l| i.labels.iter().any(|have| have == l))
            })
            .filter(|i| opts.assignee.as_ref().is_none_or(|a| &i.assignee == a))
            .filter(|i| opts.parent.as_ref().is_none_or(|p| i.parent.as_ref() == Some(p)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = opts.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn create(&self, opts: &CreateOptions) -> Result<String> {
        let id = format!("gt-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 100);
        self.record("create", &id)?;
        let issue = Issue {
            id: id.clone(),
            title: opts.title.clone(),
            description: opts.description.clone(),
            status: "open".to_string(),
            priority: i64::from(opts.priority),
            issue_type: opts.issue_type.clone(),
            labels: vec![format!("gt:{}", opts.issue_type)],
            parent: opts.parent.clone(),
            ephemeral: opts.ephemeral,
            created_at: "2026-08-01T12:00:00Z".to_string(),
            updated_at: "2026-08-01T12:00:00Z".to_string(),
            ..Default::default()
        };
        self.issues.lock().unwrap().insert(id.clone(), issue);
        Ok(id)
    }

    async fn update(&self, id: &str, opts: &UpdateOptions) -> Result<()> {
        self.record("update", id)?;
        let mut issues = self.issues.lock().unwrap();
        let issue = issues
            .get_mut(id)
            .ok_or_else(|| Error::store("update", format!("no issue {id}")))?;
        if let Some(title) = &opts.title {
            issue.title = title.clone();
        }
        if let Some(status) = &opts.status {
            issue.status = status.clone();
        }
        if let Some(priority) = opts.priority {
            issue.priority = i64::from(priority);
        }
        if let Some(description) = &opts.description {
            issue.description = description.clone();
        }
        if let Some(assignee) = &opts.assignee {
            issue.assignee = assignee.clone();
        }
        issue.updated_at = "2026-08-01T12:30:00Z".to_string();
        Ok(())
    }

    async fn close_with_reason(&self, id: &str, reason: &str) -> Result<()> {
        self.record("close", &format!("{id} {reason}"))?;
        let mut issues = self.issues.lock().unwrap();
        let issue = issues
            .get_mut(id)
            .ok_or_else(|| Error::store("close", format!("no issue {id}")))?;
        issue.status = "closed".to_string();
        issue.closed_at = Some("2026-08-01T13:00:00Z".to_string());
        Ok(())
    }

    async fn add_dependency(&self, id: &str, depends_on: &str) -> Result<()> {
        self.record("dep", &format!("{id} {depends_on}"))?;
        let mut issues = self.issues.lock().unwrap();
        let issue = issues
            .get_mut(id)
            .ok_or_else(|| Error::store("dep", format!("no issue {id}")))?;
        issue.blocked_by.push(depends_on.to_string());
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<()> {
        self.record("comment", &format!("{id} {text}"))
    }
}
