//! Merge request commands: submit, retry, reject

use crate::cli::context::CommandContext;
use crate::cli::style::{check, cross, Stylize};
use anstream::println;
use refinery::claim::find_mr;
use refinery::error::Result;
use refinery::submit::{submit, SubmitOptions};
use refinery::types::short_sha;

/// `refinery submit --branch <branch> --issue <id> [...]`
pub async fn run_submit(ctx: &CommandContext, opts: SubmitOptions) -> Result<()> {
    let branch = opts.branch.clone();
    let id = submit(ctx.store.as_ref(), &opts).await?;
    println!("{}", check(&format!("queued {} for {}", id.emph(), branch)));
    Ok(())
}

/// `refinery retry <rig> <mr-id> [--now]`
pub async fn run_retry(ctx: &CommandContext, rig: &str, mr_query: &str, now: bool) -> Result<()> {
    let mr = find_mr(ctx.store.as_ref(), mr_query, Some(rig)).await?;
    let engineer = ctx.engineer();
    match engineer.retry(&mr.id, now).await? {
        Some(outcome) => {
            println!(
                "{}",
                check(&format!(
                    "merged {} ({})",
                    outcome.mr_id.emph(),
                    short_sha(&outcome.merge_commit)
                ))
            );
        }
        None => {
            println!(
                "{}",
                check(&format!(
                    "{} re-queued; the next poll cycle will pick it up",
                    mr.id.emph()
                ))
            );
        }
    }
    Ok(())
}

/// `refinery reject <rig> <mr-id-or-branch> --reason <text> [--notify]`
pub async fn run_reject(
    ctx: &CommandContext,
    rig: &str,
    mr_query: &str,
    reason: &str,
    notify: bool,
) -> Result<()> {
    let mr = find_mr(ctx.store.as_ref(), mr_query, Some(rig)).await?;
    let engineer = ctx.engineer();
    engineer.reject(&mr, reason, notify).await?;
    println!(
        "{}",
        cross(&format!("rejected {} ({}): {reason}", mr.id.emph(), mr.branch))
    );
    println!(
        "{}",
        format!("source issue {} stays open", mr.source_issue).muted()
    );
    Ok(())
}
