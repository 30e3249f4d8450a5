//! Structured merge-request fields inside issue descriptions
//!
//! The issue store has no schema beyond title/description/status, so a
//! merge request keeps its structured fields as `key: value` lines in the
//! description. Lines that do not look like a field pass through
//! untouched, so parse/format round-trips free-form text.

use crate::store::Issue;
use crate::types::{Claim, CloseReason, MergeRequest, MrStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Default target branch when a merge request does not name one.
pub const DEFAULT_TARGET: &str = "main";

fn is_field_line(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    let key = &line[..idx];
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    Some((key, line[idx + 1..].trim()))
}

/// Parse `key: value` lines from an issue description.
#[must_use]
pub fn parse_fields(description: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in description.lines() {
        if let Some((key, value)) = is_field_line(line) {
            fields.insert(key.to_string(), value.to_string());
        }
    }
    fields
}

/// Set fields in a description, replacing existing lines or appending
/// new ones. Non-field lines are preserved as-is.
#[must_use]
pub fn set_fields(description: &str, updates: &[(&str, &str)]) -> String {
    let mut remaining: BTreeMap<&str, &str> = updates.iter().copied().collect();
    let mut lines: Vec<String> = Vec::new();
    for line in description.lines() {
        match is_field_line(line) {
            Some((key, _)) if remaining.contains_key(key) => {
                let value = remaining.remove(key).unwrap_or_default();
                lines.push(format!("{key}: {value}"));
            }
            _ => lines.push(line.to_string()),
        }
    }
    for (key, value) in remaining {
        lines.push(format!("{key}: {value}"));
    }
    lines.join("\n")
}

fn optional(value: Option<&String>) -> Option<String> {
    match value.map(String::as_str) {
        None | Some("" | "null") => None,
        Some(v) => Some(v.to_string()),
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Build the initial description for a freshly submitted merge request.
#[must_use]
pub fn new_mr_description(
    branch: &str,
    target: &str,
    source_issue: &str,
    worker: &str,
    rig: &str,
    convoy: Option<&str>,
) -> String {
    let mut lines = vec![
        format!("branch: {branch}"),
        format!("target: {target}"),
        format!("source_issue: {source_issue}"),
        format!("worker: {worker}"),
        format!("rig: {rig}"),
    ];
    if let Some(convoy) = convoy {
        lines.push(format!("convoy: {convoy}"));
    }
    lines.push("retry_count: 0".to_string());
    lines.push("last_conflict_sha: null".to_string());
    lines.push("conflict_task_id: null".to_string());
    lines.join("\n")
}

/// Interpret an issue as a merge request.
#[must_use]
pub fn mr_from_issue(issue: &Issue) -> MergeRequest {
    let fields = parse_fields(&issue.description);
    let get = |key: &str| fields.get(key).cloned().unwrap_or_default();

    let status = MrStatus::parse(&issue.status);
    // closed MRs hold no lease, whatever the assignee field says
    let claim = if status == MrStatus::Closed || issue.assignee.is_empty() {
        None
    } else {
        Some(Claim {
            worker: issue.assignee.clone(),
            claimed_at: get("claimed_at"),
        })
    };

    let close_reason = match fields.get("close_reason").map(String::as_str) {
        Some("merged") => Some(CloseReason::Merged),
        Some("conflict") => Some(CloseReason::Conflict),
        Some("superseded") => Some(CloseReason::Superseded),
        Some(r) if r.starts_with("rejected") => Some(CloseReason::Rejected),
        _ => None,
    };

    let target = {
        let t = get("target");
        if t.is_empty() { DEFAULT_TARGET.to_string() } else { t }
    };

    MergeRequest {
        id: issue.id.clone(),
        branch: get("branch"),
        target,
        source_issue: get("source_issue"),
        submitted_by: get("worker"),
        rig: get("rig"),
        priority: u8::try_from(issue.priority.clamp(0, 4)).unwrap_or(2),
        status,
        close_reason,
        claim,
        retry_count: fields
            .get("retry_count")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        last_conflict_sha: optional(fields.get("last_conflict_sha")),
        conflict_task: optional(fields.get("conflict_task_id")),
        blocked_by: issue.blocked_by.clone(),
        error: optional(fields.get("error")),
        convoy: optional(fields.get("convoy")),
        created_at: parse_time(&issue.created_at),
        updated_at: parse_time(&issue.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mr_issue(description: &str) -> Issue {
        Issue {
            id: "gt-mr-1".to_string(),
            title: "Merge: gt-42".to_string(),
            description: description.to_string(),
            status: "open".to_string(),
            priority: 1,
            issue_type: "merge-request".to_string(),
            created_at: "2026-08-01T10:00:00Z".to_string(),
            updated_at: "2026-08-01T11:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_fields() {
        let desc = new_mr_description("feature/x", "main", "gt-42", "nux", "gastown", None);
        let fields = parse_fields(&desc);
        assert_eq!(fields["branch"], "feature/x");
        assert_eq!(fields["target"], "main");
        assert_eq!(fields["source_issue"], "gt-42");
        assert_eq!(fields["retry_count"], "0");
        assert_eq!(fields["last_conflict_sha"], "null");
    }

    #[test]
    fn set_fields_replaces_and_appends() {
        let desc = "branch: feature/x\nSome prose that stays.\nretry_count: 0";
        let updated = set_fields(desc, &[("retry_count", "1"), ("error", "gate build failed")]);
        let fields = parse_fields(&updated);
        assert_eq!(fields["retry_count"], "1");
        assert_eq!(fields["error"], "gate build failed");
        assert!(updated.contains("Some prose that stays."));
        assert_eq!(fields["branch"], "feature/x");
    }

    #[test]
    fn prose_with_colons_is_not_a_field() {
        let fields = parse_fields("Note: keep\nOwner: mayor\nbranch: b");
        assert!(!fields.contains_key("Note"));
        assert!(!fields.contains_key("Owner"));
        assert_eq!(fields["branch"], "b");
    }

    #[test]
    fn issue_to_mr_defaults() {
        let issue = mr_issue("branch: feature/x\nsource_issue: gt-42");
        let mr = mr_from_issue(&issue);
        assert_eq!(mr.branch, "feature/x");
        assert_eq!(mr.target, "main");
        assert_eq!(mr.priority, 1);
        assert_eq!(mr.retry_count, 0);
        assert!(mr.claim.is_none());
        assert!(mr.last_conflict_sha.is_none());
    }

    #[test]
    fn null_markers_parse_to_none() {
        let issue = mr_issue("branch: b\nlast_conflict_sha: null\nconflict_task_id: null");
        let mr = mr_from_issue(&issue);
        assert!(mr.last_conflict_sha.is_none());
        assert!(mr.conflict_task.is_none());
    }

    #[test]
    fn claim_derived_from_assignee() {
        let mut issue = mr_issue("branch: b\nclaimed_at: 2026-08-01T10:30:00Z");
        issue.status = "in_progress".to_string();
        issue.assignee = "refinery-2".to_string();
        let mr = mr_from_issue(&issue);
        let claim = mr.claim.unwrap();
        assert_eq!(claim.worker, "refinery-2");
        assert_eq!(claim.claimed_at, "2026-08-01T10:30:00Z");
    }

    #[test]
    fn closed_issue_has_no_claim() {
        let mut issue = mr_issue("branch: b\nclaimed_at: 2026-08-01T10:30:00Z");
        issue.status = "closed".to_string();
        issue.assignee = "refinery-2".to_string();
        let mr = mr_from_issue(&issue);
        assert_eq!(mr.status, MrStatus::Closed);
        assert!(mr.claim.is_none());
    }

    #[test]
    fn close_reason_parses() {
        let mut issue = mr_issue("branch: b\nclose_reason: rejected: known flake");
        issue.status = "closed".to_string();
        let mr = mr_from_issue(&issue);
        assert_eq!(mr.close_reason, Some(CloseReason::Rejected));
    }
}
