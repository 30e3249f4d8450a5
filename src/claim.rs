//! Claim manager: time-bounded leases on merge requests
//!
//! Multiple refinery processes compete for the same queue. Mutual
//! exclusion comes from the issue store's single-writer update semantics;
//! the store offers no compare-and-swap, so a claim is re-verified by
//! re-reading immediately after the write and treating a mismatch as a
//! claim failure. Crash recovery is time-based: a lease simply becomes
//! eligible for re-claim once it outlives the stale-claim timeout.

use crate::error::{Error, Result};
use crate::store::fields::{mr_from_issue, set_fields};
use crate::store::{IssueStore, ListOptions, UpdateOptions, MR_LABEL};
use crate::types::{MergeRequest, MrStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;
use tracing::{debug, warn};

/// Whether a claim acquired at `claimed_at` (RFC 3339) has outlived the
/// timeout, judged against the current wall clock.
///
/// An empty timestamp is treated as "not stale": it can only appear on
/// legacy records written before the timestamp field existed, and a
/// possibly-live claim must never be stolen. An unparseable non-empty
/// timestamp is an error, never a silent true or false.
pub fn is_stale(claimed_at: &str, timeout: Duration) -> Result<bool> {
    is_stale_at(claimed_at, timeout, Utc::now())
}

/// Staleness judged against an explicit clock. Stale exactly at the
/// boundary: `now - claimed_at >= timeout`.
pub fn is_stale_at(claimed_at: &str, timeout: Duration, now: DateTime<Utc>) -> Result<bool> {
    if claimed_at.is_empty() {
        return Ok(false);
    }
    let t = DateTime::parse_from_rfc3339(claimed_at)
        .map_err(|e| Error::Config(format!("invalid claim timestamp {claimed_at:?}: {e}")))?
        .with_timezone(&Utc);
    let elapsed = now.signed_duration_since(t);
    let timeout = chrono::Duration::from_std(timeout)
        .map_err(|e| Error::Config(format!("stale-claim timeout out of range: {e}")))?;
    Ok(elapsed >= timeout)
}

/// Claim a merge request for a worker.
///
/// Succeeds only when the merge request is unclaimed, already held by
/// this worker, or its existing claim is stale. On success the claim
/// and `in_progress` status are written in one store update, then the
/// record is re-read to confirm the claim stuck.
pub async fn claim(
    store: &dyn IssueStore,
    mr_id: &str,
    worker: &str,
    timeout: Duration,
) -> Result<MergeRequest> {
    let issue = store.show(mr_id).await?;
    let mr = mr_from_issue(&issue);
    if mr.status == MrStatus::Closed {
        return Err(Error::ClosedImmutable(mr_id.to_string()));
    }
    if let Some(existing) = &mr.claim {
        if existing.worker != worker && !is_stale(&existing.claimed_at, timeout)? {
            return Err(Error::AlreadyClaimed {
                mr: mr_id.to_string(),
                holder: existing.worker.clone(),
            });
        }
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let description = set_fields(&issue.description, &[("claimed_at", &now)]);
    store
        .update(
            mr_id,
            &UpdateOptions {
                assignee: Some(worker.to_string()),
                status: Some(MrStatus::InProgress.to_string()),
                description: Some(description),
                ..Default::default()
            },
        )
        .await?;

    // no CAS in the store: confirm the write won the race
    let confirmed = store.show(mr_id).await?;
    if confirmed.assignee != worker {
        return Err(Error::AlreadyClaimed {
            mr: mr_id.to_string(),
            holder: confirmed.assignee,
        });
    }
    debug!(mr = mr_id, worker, "claimed");
    Ok(mr_from_issue(&confirmed))
}

/// Release a claim, reverting the merge request to `open` so another
/// worker (or the same one) may retry. Releasing a closed merge request
/// is a no-op: closed records hold no lease.
pub async fn release(store: &dyn IssueStore, mr_id: &str) -> Result<()> {
    let issue = store.show(mr_id).await?;
    if MrStatus::parse(&issue.status) == MrStatus::Closed {
        return Ok(());
    }
    let description = set_fields(&issue.description, &[("claimed_at", "")]);
    store
        .update(
            mr_id,
            &UpdateOptions {
                assignee: Some(String::new()),
                status: Some(MrStatus::Open.to_string()),
                description: Some(description),
                ..Default::default()
            },
        )
        .await?;
    debug!(mr = mr_id, "released");
    Ok(())
}

/// List every non-closed merge request, optionally filtered by rig,
/// sorted by priority then age (oldest first).
pub async fn list_queue(
    store: &dyn IssueStore,
    rig: Option<&str>,
) -> Result<Vec<MergeRequest>> {
    let issues = store
        .list(&ListOptions {
            status: Some("all".to_string()),
            label: Some(MR_LABEL.to_string()),
            ..Default::default()
        })
        .await?;
    let mut mrs: Vec<MergeRequest> = issues
        .iter()
        .map(mr_from_issue)
        .filter(|mr| mr.status != MrStatus::Closed)
        .filter(|mr| rig.is_none_or(|r| mr.rig == r))
        .collect();
    sort_queue(&mut mrs);
    Ok(mrs)
}

/// Queue ordering: priority ascending, then oldest first.
pub fn sort_queue(mrs: &mut [MergeRequest]) {
    mrs.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

/// Merge requests with no live claim. Ignores blocking dependencies;
/// exists for diagnostics, not work selection.
pub async fn list_unclaimed(
    store: &dyn IssueStore,
    rig: Option<&str>,
    timeout: Duration,
) -> Result<Vec<MergeRequest>> {
    let mrs = list_queue(store, rig).await?;
    Ok(mrs
        .into_iter()
        .filter(|mr| !has_live_claim(mr, timeout))
        .collect())
}

/// Merge requests ready to be claimed: no live claim AND no open
/// blocking task. This is the work-selection query.
pub async fn list_ready(
    store: &dyn IssueStore,
    rig: Option<&str>,
    timeout: Duration,
) -> Result<Vec<MergeRequest>> {
    let mrs = list_queue(store, rig).await?;
    let mut ready = Vec::new();
    for mr in mrs {
        if has_live_claim(&mr, timeout) {
            continue;
        }
        if open_blockers(store, &mr).await?.is_empty() {
            ready.push(mr);
        }
    }
    Ok(ready)
}

/// Merge requests whose blocked-by task is still open, with the
/// blocking IDs.
pub async fn list_blocked(
    store: &dyn IssueStore,
    rig: Option<&str>,
) -> Result<Vec<(MergeRequest, Vec<String>)>> {
    let mrs = list_queue(store, rig).await?;
    let mut blocked = Vec::new();
    for mr in mrs {
        let blockers = open_blockers(store, &mr).await?;
        if !blockers.is_empty() {
            blocked.push((mr, blockers));
        }
    }
    Ok(blocked)
}

/// IDs from `blocked_by` whose issues are still open.
pub async fn open_blockers(store: &dyn IssueStore, mr: &MergeRequest) -> Result<Vec<String>> {
    let mut open = Vec::new();
    for dep in &mr.blocked_by {
        let issue = store.show(dep).await?;
        if MrStatus::parse(&issue.status) != MrStatus::Closed {
            open.push(dep.clone());
        }
    }
    Ok(open)
}

fn has_live_claim(mr: &MergeRequest, timeout: Duration) -> bool {
    match &mr.claim {
        None => false,
        Some(c) => match is_stale(&c.claimed_at, timeout) {
            Ok(stale) => !stale,
            Err(e) => {
                // a garbled timestamp should surface in anomaly scans,
                // not make the whole queue unlistable
                warn!(mr = %mr.id, error = %e, "unreadable claim timestamp");
                true
            }
        },
    }
}

/// Find a merge request by ID, branch, or unique prefix of either,
/// optionally restricted to one rig. With a rig given, a merge request
/// belonging to a different rig is not found, so an operator naming the
/// wrong rig cannot act on another rig's queue.
pub async fn find_mr(
    store: &dyn IssueStore,
    query: &str,
    rig: Option<&str>,
) -> Result<MergeRequest> {
    let issues = store
        .list(&ListOptions {
            status: Some("all".to_string()),
            label: Some(MR_LABEL.to_string()),
            ..Default::default()
        })
        .await?;
    let mrs: Vec<MergeRequest> = issues
        .iter()
        .map(mr_from_issue)
        .filter(|mr| rig.is_none_or(|r| mr.rig == r))
        .collect();

    if let Some(mr) = mrs.iter().find(|m| m.id == query) {
        return Ok(mr.clone());
    }
    if let Some(mr) = mrs.iter().find(|m| m.branch == query) {
        return Ok(mr.clone());
    }
    let partial: Vec<&MergeRequest> = mrs
        .iter()
        .filter(|m| m.id.starts_with(query) || m.branch.contains(query))
        .collect();
    match partial.as_slice() {
        [mr] => Ok((*mr).clone()),
        [] => Err(Error::MrNotFound(query.to_string())),
        many => Err(Error::MrNotFound(format!(
            "{query} is ambiguous ({} matches)",
            many.len()
        ))),
    }
}
