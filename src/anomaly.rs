//! Queue anomaly detection
//!
//! A point-in-time scan over all open merge requests, classifying stale
//! claims, open blocking tasks, and source branches that disappeared
//! out-of-band. Purely observational: the scan never mutates anything,
//! remediation is an explicit retry/release/reject.

use crate::claim::{is_stale, open_blockers};
use crate::error::Result;
use crate::git::GitOps;
use crate::store::IssueStore;
use crate::types::{format_age, AnomalyKind, MergeRequest, QueueAnomaly, Severity};
use chrono::Utc;
use std::time::Duration;
use tracing::warn;

fn age_of(mr: &MergeRequest) -> String {
    format_age(Utc::now().signed_duration_since(mr.created_at))
}

/// Scan open merge requests for anomalies.
pub async fn scan(
    store: &dyn IssueStore,
    git: &dyn GitOps,
    rig: Option<&str>,
    stale_timeout: Duration,
) -> Result<Vec<QueueAnomaly>> {
    let mrs = crate::claim::list_queue(store, rig).await?;
    let mut anomalies = Vec::new();

    for mr in &mrs {
        let assignee = mr.claim.as_ref().map(|c| c.worker.clone());

        if let Some(claim) = &mr.claim {
            // a claim without a timestamp never ages out, so the claim
            // path will never reclaim it; surface it here
            let detail = if claim.claimed_at.is_empty() {
                Some(format!(
                    "claim by {} has no timestamp and can never expire; release it explicitly",
                    claim.worker
                ))
            } else {
                let stale = match is_stale(&claim.claimed_at, stale_timeout) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(mr = %mr.id, error = %e, "unreadable claim timestamp");
                        // surface the garbled record instead of hiding it
                        true
                    }
                };
                stale.then(|| {
                    format!(
                        "claim by {} has outlived the {} stale-claim timeout",
                        claim.worker,
                        humantime::format_duration(stale_timeout)
                    )
                })
            };
            if let Some(detail) = detail {
                anomalies.push(QueueAnomaly {
                    kind: AnomalyKind::StaleClaim,
                    severity: Severity::Warning,
                    mr_id: mr.id.clone(),
                    branch: mr.branch.clone(),
                    assignee: assignee.clone(),
                    age: age_of(mr),
                    detail,
                });
            }
        }

        let blockers = open_blockers(store, mr).await?;
        if !blockers.is_empty() {
            anomalies.push(QueueAnomaly {
                kind: AnomalyKind::Blocked,
                severity: Severity::Info,
                mr_id: mr.id.clone(),
                branch: mr.branch.clone(),
                assignee: assignee.clone(),
                age: age_of(mr),
                detail: format!("blocked by open task(s): {}", blockers.join(", ")),
            });
        }

        if !mr.branch.is_empty() {
            let local = git.branch_exists(&mr.branch).await?;
            let remote = git.remote_branch_exists(&mr.branch).await?;
            if !local && !remote {
                anomalies.push(QueueAnomaly {
                    kind: AnomalyKind::NoBranch,
                    severity: Severity::Warning,
                    mr_id: mr.id.clone(),
                    branch: mr.branch.clone(),
                    assignee,
                    age: age_of(mr),
                    detail: format!("branch {} exists neither locally nor on origin", mr.branch),
                });
            }
        }
    }

    Ok(anomalies)
}
