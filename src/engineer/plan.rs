//! Merge processing plans - pure functions, no I/O
//!
//! A plan describes what processing one merge request will involve,
//! for dry-run display and logging. Created here, executed by
//! `Engineer::process`.

use crate::config::MergeQueueConfig;
use crate::types::MergeRequest;

/// One step of merge-request processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStep {
    /// Run the rig's setup command first
    Setup {
        /// Command to run
        cmd: String,
    },
    /// Rebase the source branch onto the current target
    Rebase {
        /// Source branch
        branch: String,
        /// Target branch
        target: String,
    },
    /// Run the validation gate set
    Gates {
        /// Gate names in run order
        names: Vec<String>,
        /// Whether gates run concurrently
        parallel: bool,
    },
    /// Merge the source branch into the target and push
    Merge {
        /// Source branch
        branch: String,
        /// Target branch
        target: String,
    },
    /// Delete the merged source branch
    DeleteBranch {
        /// Branch to delete
        branch: String,
    },
    /// Close the merge request as merged
    Close {
        /// Merge request ID
        mr: String,
    },
}

impl std::fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup { cmd } => write!(f, "setup: {cmd}"),
            Self::Rebase { branch, target } => write!(f, "rebase {branch} onto {target}"),
            Self::Gates { names, parallel } => {
                let mode = if *parallel { "parallel" } else { "sequential" };
                write!(f, "run gates [{}] ({mode})", names.join(", "))
            }
            Self::Merge { branch, target } => write!(f, "merge {branch} into {target}"),
            Self::DeleteBranch { branch } => write!(f, "delete branch {branch}"),
            Self::Close { mr } => write!(f, "close {mr} as merged"),
        }
    }
}

/// Ordered steps for processing one merge request
#[derive(Debug, Clone)]
pub struct ProcessPlan {
    /// Steps in execution order
    pub steps: Vec<ProcessStep>,
}

/// Build the processing plan for a merge request under a rig's policy.
#[must_use]
pub fn create_process_plan(mr: &MergeRequest, config: &MergeQueueConfig) -> ProcessPlan {
    let mut steps = Vec::new();
    if !config.setup_command.trim().is_empty() {
        steps.push(ProcessStep::Setup {
            cmd: config.setup_command.clone(),
        });
    }
    steps.push(ProcessStep::Rebase {
        branch: mr.branch.clone(),
        target: mr.target.clone(),
    });
    let gates = config.gate_set();
    if !gates.is_empty() {
        steps.push(ProcessStep::Gates {
            names: gates.keys().cloned().collect(),
            parallel: config.gates_parallel,
        });
    }
    steps.push(ProcessStep::Merge {
        branch: mr.branch.clone(),
        target: mr.target.clone(),
    });
    if config.delete_merged_branches {
        steps.push(ProcessStep::DeleteBranch {
            branch: mr.branch.clone(),
        });
    }
    steps.push(ProcessStep::Close { mr: mr.id.clone() });
    ProcessPlan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fields::mr_from_issue;
    use crate::store::Issue;

    fn mr() -> MergeRequest {
        mr_from_issue(&Issue {
            id: "gt-mr-1".to_string(),
            status: "open".to_string(),
            description: "branch: feature/x\ntarget: main".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn plan_orders_rebase_gates_merge_close() {
        let config = MergeQueueConfig {
            build_command: "make".to_string(),
            ..Default::default()
        };
        let plan = create_process_plan(&mr(), &config);
        assert!(matches!(plan.steps[0], ProcessStep::Rebase { .. }));
        assert!(matches!(plan.steps[1], ProcessStep::Gates { .. }));
        assert!(matches!(plan.steps[2], ProcessStep::Merge { .. }));
        assert!(matches!(plan.steps[3], ProcessStep::DeleteBranch { .. }));
        assert!(matches!(plan.steps[4], ProcessStep::Close { .. }));
    }

    #[test]
    fn plan_honors_branch_retention() {
        let config = MergeQueueConfig {
            delete_merged_branches: false,
            ..Default::default()
        };
        let plan = create_process_plan(&mr(), &config);
        assert!(
            !plan
                .steps
                .iter()
                .any(|s| matches!(s, ProcessStep::DeleteBranch { .. }))
        );
    }

    #[test]
    fn plan_includes_setup_when_configured() {
        let config = MergeQueueConfig {
            setup_command: "./bootstrap.sh".to_string(),
            ..Default::default()
        };
        let plan = create_process_plan(&mr(), &config);
        assert_eq!(
            plan.steps[0],
            ProcessStep::Setup {
                cmd: "./bootstrap.sh".to_string()
            }
        );
    }

    #[test]
    fn empty_gate_set_has_no_gates_step() {
        let plan = create_process_plan(&mr(), &MergeQueueConfig::default());
        assert!(
            !plan
                .steps
                .iter()
                .any(|s| matches!(s, ProcessStep::Gates { .. }))
        );
    }
}
