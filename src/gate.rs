//! Validation gate pipeline
//!
//! Gates are named shell commands (build/lint/typecheck/test) that must
//! pass before a merge request is merged. They run either sequentially
//! (fail-fast, in name order) or in parallel (fail-together), each with
//! an optional timeout.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// A single named validation command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GateConfig {
    /// Shell command to run; empty is a definitional failure, not a skip
    pub cmd: String,
    /// Kill the command and fail the gate after this long; `None` = unbounded
    pub timeout: Option<Duration>,
}

/// Outcome of one gate
#[derive(Debug, Clone)]
pub struct GateResult {
    /// Gate name
    pub name: String,
    /// Whether the gate passed
    pub passed: bool,
    /// Failure text; `None` when the gate passed
    pub error: Option<String>,
}

impl GateResult {
    fn fail(name: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            error: Some(error.into()),
        }
    }

    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            error: None,
        }
    }
}

/// Aggregate outcome of a gate pipeline run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Overall success: AND of all gates that ran
    pub passed: bool,
    /// Combined failure text naming every failing gate; `None` on success
    pub error: Option<String>,
    /// True when a test gate was among the failures, for downstream
    /// routing (conflict vs. legitimate breakage)
    pub tests_failed: bool,
    /// Per-gate results, in the order gates completed
    pub results: Vec<GateResult>,
}

impl PipelineResult {
    fn success(results: Vec<GateResult>) -> Self {
        Self {
            passed: true,
            error: None,
            tests_failed: false,
            results,
        }
    }
}

/// How many bytes of command output to keep in a failure message.
const OUTPUT_TAIL: usize = 2048;

fn output_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.len() > OUTPUT_TAIL {
        // keep the end: compilers and test runners summarize there
        let start = trimmed.len() - OUTPUT_TAIL;
        format!("...{}", &trimmed[start..])
    } else {
        trimmed.to_string()
    }
}

fn is_test_gate(name: &str) -> bool {
    name == "test" || name == "tests" || name.starts_with("test-")
}

/// Run one gate in the given working tree.
///
/// An empty command is treated as failed, not skipped: nothing to
/// validate must never silently pass. A configured timeout kills the
/// command and yields an error text that identifies a timeout distinctly
/// from a command failure.
pub async fn run_gate(name: &str, gate: &GateConfig, workdir: &Path) -> GateResult {
    if gate.cmd.trim().is_empty() {
        return GateResult::fail(name, format!("gate {name} has no command configured"));
    }
    debug!(gate = name, cmd = %gate.cmd, "running gate");

    let child = Command::new("sh")
        .arg("-c")
        .arg(&gate.cmd)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(c) => c,
        Err(e) => return GateResult::fail(name, format!("failed to start gate {name}: {e}")),
    };

    let wait = child.wait_with_output();
    let output = match gate.timeout {
        Some(limit) if !limit.is_zero() => {
            match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    return GateResult::fail(
                        name,
                        format!(
                            "gate {name} timed out after {}",
                            humantime::format_duration(limit)
                        ),
                    );
                }
            }
        }
        _ => wait.await,
    };

    match output {
        Ok(out) if out.status.success() => GateResult::pass(name),
        Ok(out) => {
            let code = out
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let mut detail = output_tail(&out.stderr);
            if detail.is_empty() {
                detail = output_tail(&out.stdout);
            }
            if detail.is_empty() {
                GateResult::fail(name, format!("gate {name} failed (exit {code})"))
            } else {
                GateResult::fail(name, format!("gate {name} failed (exit {code}): {detail}"))
            }
        }
        Err(e) => GateResult::fail(name, format!("gate {name} did not complete: {e}")),
    }
}

/// Run a gate set in the given working tree.
///
/// Sequential mode runs gates in name order and stops at the first
/// failure; later gates do not run. Parallel mode runs every gate to
/// completion regardless of individual failures and reports them all.
/// An empty gate set is a valid no-op pipeline and succeeds.
pub async fn run_gates(
    gates: &BTreeMap<String, GateConfig>,
    parallel: bool,
    workdir: &Path,
) -> PipelineResult {
    if gates.is_empty() {
        return PipelineResult::success(Vec::new());
    }

    let results = if parallel {
        join_all(
            gates
                .iter()
                .map(|(name, gate)| run_gate(name, gate, workdir)),
        )
        .await
    } else {
        let mut results = Vec::with_capacity(gates.len());
        for (name, gate) in gates {
            let result = run_gate(name, gate, workdir).await;
            let failed = !result.passed;
            results.push(result);
            if failed {
                break;
            }
        }
        results
    };

    let failures: Vec<&GateResult> = results.iter().filter(|r| !r.passed).collect();
    if failures.is_empty() {
        return PipelineResult::success(results);
    }

    let tests_failed = failures.iter().any(|r| is_test_gate(&r.name));
    let combined = failures
        .iter()
        .filter_map(|r| r.error.as_deref())
        .collect::<Vec<_>>()
        .join("; ");
    PipelineResult {
        passed: false,
        error: Some(combined),
        tests_failed,
        results,
    }
}
