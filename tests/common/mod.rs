//! Shared test doubles: in-memory issue store, recording git, and a
//! capturing notifier.

#![allow(dead_code)]

pub mod mock_git;
pub mod mock_notify;
pub mod mock_store;

pub use mock_git::MockGit;
pub use mock_notify::MockNotifier;
pub use mock_store::MockStore;

use refinery::store::Issue;

/// Build a merge-request issue the way `refinery submit` would.
pub fn mr_issue(id: &str, branch: &str, target: &str, priority: i64) -> Issue {
    Issue {
        id: id.to_string(),
        title: format!("Merge: gt-src-{id}"),
        description: refinery::store::fields::new_mr_description(
            branch,
            target,
            &format!("gt-src-{id}"),
            "nux",
            "gastown",
            None,
        ),
        status: "open".to_string(),
        priority,
        issue_type: "merge-request".to_string(),
        labels: vec!["gt:merge-request".to_string()],
        created_at: "2026-08-01T10:00:00Z".to_string(),
        updated_at: "2026-08-01T10:00:00Z".to_string(),
        ephemeral: true,
        ..Default::default()
    }
}
