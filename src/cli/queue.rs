//! Queue inspection and claim commands

use crate::cli::context::CommandContext;
use crate::cli::style::{check, Stylize};
use anstream::println;
use chrono::Utc;
use refinery::anomaly;
use refinery::claim;
use refinery::error::Result;
use refinery::types::{format_age, MergeRequest};

fn render_mr(mr: &MergeRequest, flags: &[String]) -> String {
    let age = format_age(Utc::now().signed_duration_since(mr.created_at));
    let mut line = format!(
        "{}  {}  -> {}  p{}  {}",
        mr.id.emph(),
        mr.branch,
        mr.target,
        mr.priority,
        age.muted(),
    );
    if let Some(claim) = &mr.claim {
        line.push_str(&format!("  claimed by {}", claim.worker));
    }
    if !flags.is_empty() {
        line.push_str(&format!("  [{}]", flags.join(", ")).muted());
    }
    line
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `refinery claim <mr-id>`
pub async fn run_claim(ctx: &CommandContext, mr_id: &str) -> Result<()> {
    let mr = claim::claim(
        ctx.store.as_ref(),
        mr_id,
        &ctx.worker,
        ctx.config.stale_claim_timeout,
    )
    .await?;
    println!("{}", check(&format!("claimed {} ({})", mr.id.emph(), mr.branch)));
    Ok(())
}

/// `refinery release <mr-id>`
pub async fn run_release(ctx: &CommandContext, mr_id: &str) -> Result<()> {
    claim::release(ctx.store.as_ref(), mr_id).await?;
    println!("{}", check(&format!("released {}", mr_id.emph())));
    Ok(())
}

/// `refinery unclaimed [rig] [--json]`
pub async fn run_unclaimed(ctx: &CommandContext, rig: Option<&str>, json: bool) -> Result<()> {
    let mrs = claim::list_unclaimed(
        ctx.store.as_ref(),
        rig,
        ctx.config.stale_claim_timeout,
    )
    .await?;
    if json {
        return print_json(&mrs);
    }
    if mrs.is_empty() {
        println!("{}", "no unclaimed merge requests".muted());
        return Ok(());
    }
    for mr in &mrs {
        println!("{}", render_mr(mr, &[]));
    }
    Ok(())
}

/// `refinery ready [rig] [--json] [--all]`
///
/// Without `--all` this is the work-selection view: unclaimed (or
/// stale-claimed) and unblocked. With `--all` every open merge request
/// appears, annotated with why it is not ready.
pub async fn run_ready(
    ctx: &CommandContext,
    rig: Option<&str>,
    json: bool,
    all: bool,
) -> Result<()> {
    if !all {
        let mrs = claim::list_ready(
            ctx.store.as_ref(),
            rig,
            ctx.config.stale_claim_timeout,
        )
        .await?;
        if json {
            return print_json(&mrs);
        }
        if mrs.is_empty() {
            println!("{}", "queue is empty".muted());
            return Ok(());
        }
        for mr in &mrs {
            println!("{}", render_mr(mr, &[]));
        }
        return Ok(());
    }

    let mrs = claim::list_queue(ctx.store.as_ref(), rig).await?;
    if json {
        return print_json(&mrs);
    }
    if mrs.is_empty() {
        println!("{}", "queue is empty".muted());
        return Ok(());
    }
    for mr in &mrs {
        let mut flags = Vec::new();
        for blocker in claim::open_blockers(ctx.store.as_ref(), mr).await? {
            flags.push(format!("blocked-by:{blocker}"));
        }
        if !mr.branch.is_empty()
            && !ctx.git.branch_exists(&mr.branch).await?
            && !ctx.git.remote_branch_exists(&mr.branch).await?
        {
            flags.push("no-branch".to_string());
        }
        println!("{}", render_mr(mr, &flags));
    }
    Ok(())
}

/// `refinery blocked [rig] [--json]`
pub async fn run_blocked(ctx: &CommandContext, rig: Option<&str>, json: bool) -> Result<()> {
    let blocked = claim::list_blocked(ctx.store.as_ref(), rig).await?;
    if json {
        let mrs: Vec<&MergeRequest> = blocked.iter().map(|(mr, _)| mr).collect();
        return print_json(&mrs);
    }
    if blocked.is_empty() {
        println!("{}", "no blocked merge requests".muted());
        return Ok(());
    }
    for (mr, blockers) in &blocked {
        let flags: Vec<String> = blockers
            .iter()
            .map(|b| format!("blocked-by:{b}"))
            .collect();
        println!("{}", render_mr(mr, &flags));
    }
    Ok(())
}

/// `refinery anomalies [rig] [--json]`
pub async fn run_anomalies(ctx: &CommandContext, rig: Option<&str>, json: bool) -> Result<()> {
    let anomalies = anomaly::scan(
        ctx.store.as_ref(),
        ctx.git.as_ref(),
        rig,
        ctx.config.stale_claim_timeout,
    )
    .await?;
    if json {
        return print_json(&anomalies);
    }
    if anomalies.is_empty() {
        println!("{}", check("queue looks healthy"));
        return Ok(());
    }
    for a in &anomalies {
        let who = a.assignee.as_deref().unwrap_or("-");
        println!(
            "{}  {}  {}  {}  {}  {}",
            a.severity.to_string().error(),
            a.kind,
            a.mr_id.emph(),
            a.branch,
            who,
            a.detail.muted(),
        );
    }
    Ok(())
}
