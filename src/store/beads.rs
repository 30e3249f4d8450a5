//! Issue store backed by the `bd` CLI
//!
//! Each operation is one synchronous subprocess call returning JSON on
//! stdout. Errors carry the operation name and the store's stderr.

use crate::error::{Error, Result};
use crate::store::{CreateOptions, Issue, IssueStore, ListOptions, UpdateOptions};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// `IssueStore` implementation shelling out to the `bd` CLI
#[derive(Debug, Clone)]
pub struct BeadsStore {
    bin: String,
    workdir: PathBuf,
}

#[derive(Deserialize)]
struct CreatedIssue {
    id: String,
}

impl BeadsStore {
    /// Create a store rooted at the given working directory.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            bin: "bd".to_string(),
            workdir: workdir.into(),
        }
    }

    async fn run(&self, op: &str, args: &[String]) -> Result<Vec<u8>> {
        debug!(op, ?args, "issue store call");
        let output = Command::new(&self.bin)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::store(op, format!("failed to run {}: {e}", self.bin)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::store(op, stderr.trim()));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl IssueStore for BeadsStore {
    async fn show(&self, id: &str) -> Result<Issue> {
        let out = self
            .run("show", &["show".to_string(), id.to_string(), "--json".to_string()])
            .await?;
        // bd show returns a single-element array
        let mut issues: Vec<Issue> = serde_json::from_slice(&out)?;
        issues
            .pop()
            .ok_or_else(|| Error::store("show", format!("no issue {id}")))
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<Issue>> {
        let mut args = vec!["list".to_string(), "--json".to_string()];
        if let Some(status) = &opts.status {
            args.push(format!("--status={status}"));
        }
        if let Some(label) = &opts.label {
            args.push(format!("--label={label}"));
        }
        if let Some(assignee) = &opts.assignee {
            args.push(format!("--assignee={assignee}"));
        }
        if let Some(parent) = &opts.parent {
            args.push(format!("--parent={parent}"));
        }
        // the CLI defaults to 50 results; always pass a limit so long
        // queues are never silently truncated
        args.push(format!("--limit={}", opts.limit.unwrap_or(0)));
        let out = self.run("list", &args).await?;
        Ok(serde_json::from_slice(&out)?)
    }

    async fn create(&self, opts: &CreateOptions) -> Result<String> {
        let mut args = vec![
            "create".to_string(),
            "--json".to_string(),
            format!("--title={}", opts.title),
            format!("--priority={}", opts.priority),
        ];
        if !opts.description.is_empty() {
            args.push(format!("--description={}", opts.description));
        }
        if !opts.issue_type.is_empty() {
            args.push(format!("--labels=gt:{}", opts.issue_type));
        }
        if let Some(parent) = &opts.parent {
            args.push(format!("--parent={parent}"));
        }
        if opts.ephemeral {
            args.push("--ephemeral".to_string());
        }
        let out = self.run("create", &args).await?;
        let created: CreatedIssue = serde_json::from_slice(&out)?;
        Ok(created.id)
    }

    async fn update(&self, id: &str, opts: &UpdateOptions) -> Result<()> {
        let mut args = vec!["update".to_string(), id.to_string()];
        if let Some(title) = &opts.title {
            args.push(format!("--title={title}"));
        }
        if let Some(status) = &opts.status {
            args.push(format!("--status={status}"));
        }
        if let Some(priority) = opts.priority {
            args.push(format!("--priority={priority}"));
        }
        if let Some(description) = &opts.description {
            args.push(format!("--description={description}"));
        }
        if let Some(assignee) = &opts.assignee {
            args.push(format!("--assignee={assignee}"));
        }
        self.run("update", &args).await?;
        Ok(())
    }

    async fn close_with_reason(&self, id: &str, reason: &str) -> Result<()> {
        let args = vec![
            "close".to_string(),
            id.to_string(),
            format!("--reason={reason}"),
        ];
        self.run("close", &args).await?;
        Ok(())
    }

    async fn add_dependency(&self, id: &str, depends_on: &str) -> Result<()> {
        let args = vec![
            "dep".to_string(),
            "add".to_string(),
            id.to_string(),
            depends_on.to_string(),
        ];
        self.run("dep add", &args).await?;
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<()> {
        let args = vec![
            "comment".to_string(),
            id.to_string(),
            format!("--message={text}"),
        ];
        self.run("comment", &args).await?;
        Ok(())
    }
}
