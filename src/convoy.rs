//! Convoy completion tracking
//!
//! A convoy is a multi-leg unit of work. After a merge closes one leg's
//! source issue, the refinery checks whether every leg is now closed and,
//! if so, notifies the convoy's owner/notify parties exactly once. The
//! whole check is best-effort from the caller's point of view: the merge
//! already happened.

use crate::error::Result;
use crate::notify::Notifier;
use crate::store::fields::{parse_fields, set_fields};
use crate::store::{IssueStore, UpdateOptions};
use crate::types::MrStatus;
use tracing::{debug, info};

/// Marker field written to a convoy description once its completion
/// notification has gone out.
const NOTIFIED_FIELD: &str = "refinery_notified";

/// Parse notification recipients from a convoy description.
///
/// Recipients come from free-text `Owner:` and `Notify:` lines; `Notify:`
/// may carry a comma-separated list. Duplicates are dropped, first
/// occurrence wins.
#[must_use]
pub fn parse_recipients(description: &str) -> Vec<String> {
    let mut recipients = Vec::new();
    for line in description.lines() {
        let trimmed = line.trim();
        let value = trimmed
            .strip_prefix("Owner:")
            .or_else(|| trimmed.strip_prefix("Notify:"));
        let Some(value) = value else { continue };
        for entry in value.split(',') {
            let entry = entry.trim();
            if !entry.is_empty() && !recipients.iter().any(|r| r == entry) {
                recipients.push(entry.to_string());
            }
        }
    }
    recipients
}

/// Check a convoy for completion and notify its parties if every leg is
/// closed. Returns whether a notification was sent.
pub async fn check_completion(
    store: &dyn IssueStore,
    notifier: &dyn Notifier,
    convoy_id: &str,
) -> Result<bool> {
    let convoy = store.show(convoy_id).await?;

    let fields = parse_fields(&convoy.description);
    if fields.contains_key(NOTIFIED_FIELD) {
        debug!(convoy = convoy_id, "convoy already notified");
        return Ok(false);
    }

    for leg in &convoy.children {
        let issue = store.show(leg).await?;
        if MrStatus::parse(&issue.status) != MrStatus::Closed {
            debug!(convoy = convoy_id, leg, "convoy leg still open");
            return Ok(false);
        }
    }

    let recipients = parse_recipients(&convoy.description);
    if recipients.is_empty() {
        debug!(convoy = convoy_id, "convoy complete but has no recipients");
    }

    // mark first: a send failing partway through the recipients must
    // not re-notify the earlier ones on the next check. A lost
    // notification beats a duplicate one.
    let description = set_fields(&convoy.description, &[(NOTIFIED_FIELD, "true")]);
    store
        .update(
            convoy_id,
            &UpdateOptions {
                description: Some(description),
                ..Default::default()
            },
        )
        .await?;

    let subject = format!("convoy complete: {}", convoy.title);
    let body = format!(
        "All {} legs of convoy {convoy_id} are closed.",
        convoy.children.len()
    );
    for to in &recipients {
        notifier.send(to, &subject, &body).await?;
    }
    info!(convoy = convoy_id, recipients = recipients.len(), "convoy completed");
    Ok(true)
}
