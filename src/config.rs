//! Merge-queue configuration
//!
//! Policy lives in a per-project settings document at
//! `.refinery/config.json` under a `merge_queue` key. A missing document
//! means built-in defaults; a malformed one is a fatal configuration
//! error, never silently defaulted.

use crate::error::{Error, Result};
use crate::gate::GateConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Settings file path relative to the repository root.
const CONFIG_FILE: &str = ".refinery/config.json";

/// Environment variable naming this worker process.
pub const WORKER_ENV: &str = "REFINERY_WORKER";

/// Default poll interval for the worker loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default lease lifetime before a claim becomes stale.
pub const DEFAULT_STALE_CLAIM_TIMEOUT: Duration = Duration::from_secs(600);

/// Default integration branch name template.
pub const DEFAULT_BRANCH_TEMPLATE: &str = "integration/{epic}";

/// What to do when a rebase or merge conflict is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Create a conflict task and dispatch a fresh worker against it
    #[default]
    AssignBack,
    /// Accepted for forward compatibility; currently routed the same as
    /// `AssignBack` because automatic resolution is not attempted
    AutoRebase,
}

impl ConflictPolicy {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "assign_back" => Ok(Self::AssignBack),
            "auto_rebase" => Ok(Self::AutoRebase),
            other => Err(Error::Config(format!(
                "invalid on_conflict policy {other:?}: expected \"assign_back\" or \"auto_rebase\""
            ))),
        }
    }
}

/// Per-project merge queue policy
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct MergeQueueConfig {
    /// Whether the queue is enabled at all
    pub enabled: bool,
    /// Worker loop poll interval
    pub poll_interval: Duration,
    /// Maximum merges processed concurrently by one worker (default 1:
    /// the queue models a single logical merge stream)
    pub max_concurrent: usize,
    /// Conflict handling policy
    pub on_conflict: ConflictPolicy,
    /// Lease lifetime before a claim becomes stale; must be positive
    pub stale_claim_timeout: Duration,
    /// Whether the test gate runs at all
    pub run_tests: bool,
    /// Test command; empty = skip
    pub test_command: String,
    /// Build command; empty = skip
    pub build_command: String,
    /// Lint command; empty = skip
    pub lint_command: String,
    /// Typecheck command; empty = skip
    pub typecheck_command: String,
    /// Setup command run before gates; empty = skip
    pub setup_command: String,
    /// Delete source branches after a successful merge
    pub delete_merged_branches: bool,
    /// Land integration branches automatically once ready
    pub integration_auto_land: bool,
    /// Serve merge requests targeting integration branches instead of
    /// the ones targeting main
    pub integration_refinery: bool,
    /// Explicit gate set; overrides the built-in command gates when non-empty
    pub gates: BTreeMap<String, GateConfig>,
    /// Run gates in parallel instead of sequential fail-fast
    pub gates_parallel: bool,
    /// Template for integration branch names ({epic}, {prefix}, {user})
    pub integration_branch_template: String,
}

impl Default for MergeQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent: 1,
            on_conflict: ConflictPolicy::AssignBack,
            stale_claim_timeout: DEFAULT_STALE_CLAIM_TIMEOUT,
            run_tests: true,
            test_command: String::new(),
            build_command: String::new(),
            lint_command: String::new(),
            typecheck_command: String::new(),
            setup_command: String::new(),
            delete_merged_branches: true,
            integration_auto_land: false,
            integration_refinery: false,
            gates: BTreeMap::new(),
            gates_parallel: false,
            integration_branch_template: DEFAULT_BRANCH_TEMPLATE.to_string(),
        }
    }
}

/// Raw gate entry as it appears in the settings document
#[derive(Debug, Clone, Deserialize)]
struct RawGate {
    #[serde(default)]
    cmd: String,
    #[serde(default)]
    timeout: Option<String>,
}

/// Raw `merge_queue` section as it appears in the settings document
#[derive(Debug, Clone, Default, Deserialize)]
struct RawMergeQueue {
    enabled: Option<bool>,
    poll_interval: Option<String>,
    max_concurrent: Option<usize>,
    on_conflict: Option<String>,
    stale_claim_timeout: Option<String>,
    run_tests: Option<bool>,
    test_command: Option<String>,
    build_command: Option<String>,
    lint_command: Option<String>,
    typecheck_command: Option<String>,
    setup_command: Option<String>,
    delete_merged_branches: Option<bool>,
    integration_auto_land: Option<bool>,
    integration_refinery: Option<bool>,
    gates: Option<BTreeMap<String, RawGate>>,
    gates_parallel: Option<bool>,
    integration_branch_template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    merge_queue: Option<RawMergeQueue>,
}

/// Parse a human duration like "30s" or "10m", rejecting zero.
fn parse_positive_duration(field: &str, value: &str) -> Result<Duration> {
    let d = humantime::parse_duration(value)
        .map_err(|e| Error::Config(format!("invalid {field} {value:?}: {e}")))?;
    if d.is_zero() {
        return Err(Error::Config(format!("{field} must be a positive duration")));
    }
    Ok(d)
}

impl MergeQueueConfig {
    /// Load queue configuration for a repository.
    ///
    /// A missing settings file yields the defaults. A present but invalid
    /// one is an error.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let raw: RawSettings = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid settings at {}: {e}", path.display())))?;
        Self::from_raw(raw.merge_queue.unwrap_or_default())
    }

    fn from_raw(raw: RawMergeQueue) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = raw.enabled {
            cfg.enabled = v;
        }
        if let Some(v) = raw.poll_interval.as_deref() {
            cfg.poll_interval = parse_positive_duration("poll_interval", v)?;
        }
        if let Some(v) = raw.max_concurrent {
            cfg.max_concurrent = v.max(1);
        }
        if let Some(v) = raw.on_conflict.as_deref() {
            cfg.on_conflict = ConflictPolicy::parse(v)?;
        }
        if let Some(v) = raw.stale_claim_timeout.as_deref() {
            cfg.stale_claim_timeout = parse_positive_duration("stale_claim_timeout", v)?;
        }
        if let Some(v) = raw.run_tests {
            cfg.run_tests = v;
        }
        if let Some(v) = raw.test_command {
            cfg.test_command = v;
        }
        if let Some(v) = raw.build_command {
            cfg.build_command = v;
        }
        if let Some(v) = raw.lint_command {
            cfg.lint_command = v;
        }
        if let Some(v) = raw.typecheck_command {
            cfg.typecheck_command = v;
        }
        if let Some(v) = raw.setup_command {
            cfg.setup_command = v;
        }
        if let Some(v) = raw.delete_merged_branches {
            cfg.delete_merged_branches = v;
        }
        if let Some(v) = raw.integration_auto_land {
            cfg.integration_auto_land = v;
        }
        if let Some(v) = raw.integration_refinery {
            cfg.integration_refinery = v;
        }
        if let Some(gates) = raw.gates {
            for (name, g) in gates {
                let timeout = match g.timeout.as_deref() {
                    Some(t) => Some(
                        humantime::parse_duration(t).map_err(|e| {
                            Error::Config(format!("invalid timeout for gate {name:?}: {e}"))
                        })?,
                    ),
                    None => None,
                };
                cfg.gates.insert(name, GateConfig { cmd: g.cmd, timeout });
            }
        }
        if let Some(v) = raw.gates_parallel {
            cfg.gates_parallel = v;
        }
        if let Some(v) = raw.integration_branch_template {
            cfg.integration_branch_template = v;
        }
        Ok(cfg)
    }

    /// Resolve the effective gate set for this rig.
    ///
    /// An explicit `gates` map wins; otherwise gates are built from the
    /// configured build/lint/test/typecheck commands (empty command =
    /// no gate). The test gate also honors `run_tests`.
    #[must_use]
    pub fn gate_set(&self) -> BTreeMap<String, GateConfig> {
        if !self.gates.is_empty() {
            return self.gates.clone();
        }
        let mut gates = BTreeMap::new();
        let mut add = |name: &str, cmd: &str| {
            if !cmd.trim().is_empty() {
                gates.insert(
                    name.to_string(),
                    GateConfig {
                        cmd: cmd.to_string(),
                        timeout: None,
                    },
                );
            }
        };
        add("build", &self.build_command);
        add("lint", &self.lint_command);
        add("typecheck", &self.typecheck_command);
        if self.run_tests {
            add("test", &self.test_command);
        }
        gates
    }
}

/// Identity of this worker process, from `REFINERY_WORKER` or the default.
#[must_use]
pub fn worker_id() -> String {
    resolve_worker_id(std::env::var(WORKER_ENV).ok())
}

fn resolve_worker_id(var: Option<String>) -> String {
    var.filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "refinery-1".to_string())
}
