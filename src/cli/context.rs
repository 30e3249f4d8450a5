//! Shared command context for CLI commands
//!
//! Bundles the setup every command needs: repository root, queue policy,
//! issue store, git, and worker identity. Built once per invocation; no
//! process-wide mutable state.

use refinery::config::{self, MergeQueueConfig};
use refinery::engineer::Engineer;
use refinery::error::Result;
use refinery::git::{CliGit, GitOps};
use refinery::integration::IntegrationManager;
use refinery::notify::{LogNotifier, Notifier};
use refinery::store::{BeadsStore, IssueStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared context for CLI commands
pub struct CommandContext {
    /// Repository root the refinery operates in
    pub repo_root: PathBuf,
    /// Issue store handle
    pub store: Arc<dyn IssueStore>,
    /// Git handle rooted at the repository
    pub git: Arc<dyn GitOps>,
    /// Notification sink
    pub notifier: Arc<dyn Notifier>,
    /// Queue policy for this rig
    pub config: MergeQueueConfig,
    /// This process's worker identity
    pub worker: String,
}

impl CommandContext {
    /// Build a context rooted at the given repository (or the current
    /// directory). Loads and validates the rig settings.
    pub fn new(repo: Option<PathBuf>) -> Result<Self> {
        let repo_root = match repo {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let config = MergeQueueConfig::load(&repo_root)?;
        Ok(Self {
            store: Arc::new(BeadsStore::new(&repo_root)),
            git: Arc::new(CliGit::new(&repo_root)),
            notifier: Arc::new(LogNotifier),
            worker: config::worker_id(),
            config,
            repo_root,
        })
    }

    /// Merge processor bound to this context.
    pub fn engineer(&self) -> Engineer {
        Engineer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.git),
            Arc::clone(&self.notifier),
            self.config.clone(),
            &self.repo_root,
            self.worker.clone(),
        )
    }

    /// Integration branch manager bound to this context.
    pub fn integration(&self) -> IntegrationManager {
        let user = std::env::var("USER").unwrap_or_else(|_| "refinery".to_string());
        IntegrationManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.git),
            self.config.clone(),
            &self.repo_root,
            user,
        )
    }
}
