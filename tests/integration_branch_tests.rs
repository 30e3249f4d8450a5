//! Integration branch lifecycle scenarios with mock store/git

mod common;

use common::{mr_issue, MockGit, MockStore};
use refinery::config::MergeQueueConfig;
use refinery::error::Error;
use refinery::gate::GateConfig;
use refinery::integration::{IntegrationManager, LandOptions, LandOutcome};
use refinery::store::fields::{parse_fields, set_fields};
use refinery::store::{Issue, IssueStore};
use std::sync::Arc;
use tempfile::TempDir;

const EPIC: &str = "gt-epic-9";
const BRANCH: &str = "integration/gt-epic-9";

struct Rig {
    store: Arc<MockStore>,
    git: Arc<MockGit>,
    manager: IntegrationManager,
    _workdir: TempDir,
}

fn rig_with(config: MergeQueueConfig) -> Rig {
    let store = Arc::new(MockStore::new());
    let git = Arc::new(MockGit::new());
    let workdir = TempDir::new().unwrap();
    let manager = IntegrationManager::new(
        Arc::clone(&store) as Arc<dyn IssueStore>,
        Arc::clone(&git) as Arc<dyn refinery::git::GitOps>,
        config,
        workdir.path(),
        "nux",
    );
    Rig {
        store,
        git,
        manager,
        _workdir: workdir,
    }
}

fn rig() -> Rig {
    rig_with(MergeQueueConfig::default())
}

fn epic_issue(with_branch: bool, children: &[&str]) -> Issue {
    let description = if with_branch {
        set_fields(
            "Batch the payments work.",
            &[("integration_branch", BRANCH), ("integration_base", "main")],
        )
    } else {
        "Batch the payments work.".to_string()
    };
    Issue {
        id: EPIC.to_string(),
        title: "Payments batch".to_string(),
        description,
        status: "open".to_string(),
        issue_type: "epic".to_string(),
        labels: vec!["gt:epic".to_string()],
        children: children.iter().map(|c| (*c).to_string()).collect(),
        ..Default::default()
    }
}

fn child(id: &str, status: &str) -> Issue {
    Issue {
        id: id.to_string(),
        status: status.to_string(),
        issue_type: "task".to_string(),
        ..Default::default()
    }
}

fn merged_mr(id: &str, branch: &str) -> Issue {
    let mut issue = mr_issue(id, branch, BRANCH, 2);
    issue.status = "closed".to_string();
    issue.description = set_fields(&issue.description, &[("close_reason", "merged")]);
    issue
}

#[tokio::test]
async fn land_refuses_while_mrs_are_pending() {
    // r2: one merge request still open against the integration branch
    let r = rig();
    r.store.insert(epic_issue(true, &[]));
    r.store.insert(mr_issue("gt-mr-1", "feature/x", BRANCH, 2));

    let err = r.manager.land(EPIC, LandOptions::default()).await.unwrap_err();
    let Error::Integration { detail, .. } = err else {
        panic!("expected Integration error");
    };
    assert!(detail.contains("gt-mr-1"));
    // checks come before any git activity
    assert!(r.git.calls().is_empty());
}

#[tokio::test]
async fn land_refuses_while_children_are_open() {
    let r = rig();
    r.store.insert(epic_issue(true, &["gt-c1", "gt-c2"]));
    r.store.insert(child("gt-c1", "closed"));
    r.store.insert(child("gt-c2", "open"));

    let err = r.manager.land(EPIC, LandOptions::default()).await.unwrap_err();
    let Error::Integration { detail, .. } = err else {
        panic!("expected Integration error");
    };
    assert!(detail.contains("gt-c2"));
    assert!(r.git.calls().is_empty());
}

#[tokio::test]
async fn land_merges_and_cleans_up() {
    let r = rig();
    r.store.insert(epic_issue(true, &["gt-c1"]));
    r.store.insert(child("gt-c1", "closed"));
    r.store.insert(merged_mr("gt-mr-1", "feature/x"));
    r.git.add_local_branch(BRANCH);

    let outcome = r.manager.land(EPIC, LandOptions::default()).await.unwrap();
    let LandOutcome::Landed {
        merge_commit,
        already_merged,
    } = outcome
    else {
        panic!("expected Landed");
    };
    assert!(!already_merged);
    assert_eq!(merge_commit.as_deref(), Some("sha-HEAD"));

    r.git.assert_called("fetch");
    r.git.assert_called("checkout main");
    r.git.assert_called("reset origin/main");
    r.git.assert_called(&format!("merge origin/{BRANCH}"));
    r.git.assert_called("push main");
    r.git.assert_called(&format!("delete-remote-branch {BRANCH}"));
    r.git.assert_called(&format!("delete-branch {BRANCH}"));
    assert_eq!(r.store.get(EPIC).unwrap().status, "closed");
}

#[tokio::test]
async fn force_bypasses_both_checks() {
    let r = rig();
    r.store.insert(epic_issue(true, &["gt-c1"]));
    r.store.insert(child("gt-c1", "open"));
    r.store.insert(mr_issue("gt-mr-1", "feature/x", BRANCH, 2));

    let opts = LandOptions {
        force: true,
        ..Default::default()
    };
    let outcome = r.manager.land(EPIC, opts).await.unwrap();
    assert!(matches!(outcome, LandOutcome::Landed { .. }));
    r.git.assert_called("push main");
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let r = rig();
    r.store.insert(epic_issue(true, &["gt-c1"]));
    r.store.insert(child("gt-c1", "closed"));

    let opts = LandOptions {
        dry_run: true,
        ..Default::default()
    };
    let outcome = r.manager.land(EPIC, opts).await.unwrap();
    let LandOutcome::DryRun { plan } = outcome else {
        panic!("expected DryRun");
    };
    assert!(plan.iter().any(|line| line.contains("merge")));
    assert!(plan.iter().any(|line| line.contains("close epic")));
    assert!(r.git.calls().is_empty());
    assert_eq!(r.store.get(EPIC).unwrap().status, "open");
}

#[tokio::test]
async fn landing_twice_is_cleanup_only() {
    let r = rig();
    r.store.insert(epic_issue(true, &[]));
    r.git.add_ancestor(&format!("origin/{BRANCH}"), "origin/main");

    let outcome = r.manager.land(EPIC, LandOptions::default()).await.unwrap();
    let LandOutcome::Landed {
        merge_commit,
        already_merged,
    } = outcome
    else {
        panic!("expected Landed");
    };
    assert!(already_merged);
    assert!(merge_commit.is_none());
    r.git.assert_not_called("merge");
    r.git.assert_not_called("push");
    assert_eq!(r.store.get(EPIC).unwrap().status, "closed");
}

#[tokio::test]
async fn empty_merge_is_refused() {
    let r = rig();
    r.store.insert(epic_issue(true, &[]));
    r.git.set_diff_empty(true);

    let err = r.manager.land(EPIC, LandOptions::default()).await.unwrap_err();
    let Error::Integration { detail, .. } = err else {
        panic!("expected Integration error");
    };
    assert!(detail.contains("empty"));
    r.git.assert_not_called("merge");
}

#[tokio::test]
async fn gate_failure_rolls_the_base_back() {
    let mut config = MergeQueueConfig::default();
    config.gates.insert(
        "build".to_string(),
        GateConfig {
            cmd: "false".to_string(),
            timeout: None,
        },
    );
    let r = rig_with(config);
    r.store.insert(epic_issue(true, &[]));

    let err = r.manager.land(EPIC, LandOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::GateFailure { .. }));

    // merged locally, then reset back; the base was never pushed
    let resets: Vec<_> = r
        .git
        .calls()
        .into_iter()
        .filter(|c| c == "reset origin/main")
        .collect();
    assert_eq!(resets.len(), 2);
    r.git.assert_not_called("push");
    assert_eq!(r.store.get(EPIC).unwrap().status, "open");
}

#[tokio::test]
async fn skip_tests_lands_without_gates() {
    let mut config = MergeQueueConfig::default();
    config.gates.insert(
        "build".to_string(),
        GateConfig {
            cmd: "false".to_string(),
            timeout: None,
        },
    );
    let r = rig_with(config);
    r.store.insert(epic_issue(true, &[]));

    let opts = LandOptions {
        skip_tests: true,
        ..Default::default()
    };
    let outcome = r.manager.land(EPIC, opts).await.unwrap();
    assert!(matches!(
        outcome,
        LandOutcome::Landed {
            already_merged: false,
            ..
        }
    ));
    r.git.assert_called("push main");
}

#[tokio::test]
async fn create_branches_pushes_and_records() {
    let r = rig();
    r.store.insert(epic_issue(false, &[]));

    let name = r.manager.create(EPIC, None, false).await.unwrap();
    assert_eq!(name, BRANCH);
    r.git.assert_called(&format!("branch {BRANCH} from origin/main"));
    r.git.assert_called(&format!("push {BRANCH}"));

    let fields = parse_fields(&r.store.get(EPIC).unwrap().description);
    assert_eq!(fields["integration_branch"], BRANCH);
    assert_eq!(fields["integration_base"], "main");
}

#[tokio::test]
async fn create_refuses_to_overwrite_metadata() {
    let r = rig();
    r.store.insert(epic_issue(true, &[]));

    let err = r.manager.create(EPIC, None, false).await.unwrap_err();
    assert!(matches!(err, Error::Integration { .. }));
    assert!(r.git.calls().is_empty());

    // --force replaces it
    let name = r
        .manager
        .create(EPIC, Some("{prefix}/{user}/batch"), true)
        .await
        .unwrap();
    assert_eq!(name, "gt/nux/batch");
    let fields = parse_fields(&r.store.get(EPIC).unwrap().description);
    assert_eq!(fields["integration_branch"], "gt/nux/batch");
}

#[tokio::test]
async fn create_push_failure_removes_local_branch() {
    let r = rig();
    r.store.insert(epic_issue(false, &[]));
    r.git.fail_on("push", "remote rejected");

    let err = r.manager.create(EPIC, None, false).await.unwrap_err();
    assert!(matches!(err, Error::Git { .. }));
    r.git.assert_called(&format!("delete-branch {BRANCH}"));
    // nothing was recorded on the epic
    let fields = parse_fields(&r.store.get(EPIC).unwrap().description);
    assert!(!fields.contains_key("integration_branch"));
}

#[tokio::test]
async fn create_requires_a_real_epic() {
    let r = rig();
    r.store.insert(child("gt-task-1", "open"));

    let err = r.manager.create("gt-task-1", None, false).await.unwrap_err();
    assert!(matches!(err, Error::EpicNotFound(_)));
}

#[tokio::test]
async fn status_partitions_and_reports_ready() {
    let r = rig();
    r.store.insert(epic_issue(true, &["gt-c1", "gt-c2"]));
    r.store.insert(child("gt-c1", "closed"));
    r.store.insert(child("gt-c2", "closed"));
    r.store.insert(merged_mr("gt-mr-1", "feature/x"));
    // a rejected merge request counts for neither side
    let mut rejected = mr_issue("gt-mr-2", "feature/y", BRANCH, 2);
    rejected.status = "closed".to_string();
    rejected.description =
        set_fields(&rejected.description, &[("close_reason", "rejected: dupe")]);
    r.store.insert(rejected);
    // a merge request against main is someone else's business
    r.store.insert(mr_issue("gt-mr-3", "feature/z", "main", 2));

    let status = r.manager.status(EPIC).await.unwrap();
    assert_eq!(status.branch, BRANCH);
    assert_eq!(status.base, "main");
    assert_eq!(status.commits_ahead, 1);
    assert_eq!(status.children_total, 2);
    assert_eq!(status.children_closed, 2);
    assert_eq!(status.merged.len(), 1);
    assert!(status.pending.is_empty());
    assert!(status.ready);
}

#[tokio::test]
async fn status_not_ready_with_pending_mr() {
    let r = rig();
    r.store.insert(epic_issue(true, &["gt-c1"]));
    r.store.insert(child("gt-c1", "closed"));
    r.store.insert(mr_issue("gt-mr-1", "feature/x", BRANCH, 2));

    let status = r.manager.status(EPIC).await.unwrap();
    assert_eq!(status.pending.len(), 1);
    assert!(!status.ready);
}
