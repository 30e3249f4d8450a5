//! Integration branch commands: create, land, status

use crate::cli::context::CommandContext;
use crate::cli::style::{check, spinner, Stylize};
use anstream::println;
use refinery::error::Result;
use refinery::integration::{LandOptions, LandOutcome};
use refinery::types::short_sha;

/// `refinery integration create <epic-id> [--template <t>] [--force]`
pub async fn run_create(
    ctx: &CommandContext,
    epic: &str,
    template: Option<&str>,
    force: bool,
) -> Result<()> {
    let manager = ctx.integration();
    let bar = spinner(&format!("creating integration branch for {epic}"));
    let result = manager.create(epic, template, force).await;
    bar.finish_and_clear();
    let name = result?;
    println!(
        "{}",
        check(&format!("created {} for epic {}", name.emph(), epic.emph()))
    );
    Ok(())
}

/// `refinery integration land <epic-id> [--force] [--skip-tests] [--dry-run]`
pub async fn run_land(ctx: &CommandContext, epic: &str, opts: LandOptions) -> Result<()> {
    let manager = ctx.integration();
    if opts.dry_run {
        let LandOutcome::DryRun { plan } = manager.land(epic, opts).await? else {
            return Ok(());
        };
        println!("would land epic {}:", epic.emph());
        for step in plan {
            println!("  {step}");
        }
        println!("{}", "dry run: nothing was changed".muted());
        return Ok(());
    }

    let bar = spinner(&format!("landing epic {epic}"));
    let result = manager.land(epic, opts).await;
    bar.finish_and_clear();
    match result? {
        LandOutcome::Landed {
            already_merged: true,
            ..
        } => {
            println!(
                "{}",
                check(&format!("epic {} was already landed; cleaned up", epic.emph()))
            );
        }
        LandOutcome::Landed { merge_commit, .. } => {
            let commit = merge_commit
                .as_deref()
                .map_or_else(String::new, |c| format!(" ({})", short_sha(c)));
            println!("{}", check(&format!("landed epic {}{commit}", epic.emph())));
        }
        LandOutcome::DryRun { .. } => {}
    }
    Ok(())
}

/// `refinery integration status <epic-id>`
pub async fn run_status(ctx: &CommandContext, epic: &str) -> Result<()> {
    let status = ctx.integration().status(epic).await?;
    println!("epic {}", status.epic.emph());
    println!("  branch:  {} (base {})", status.branch.emph(), status.base);
    if let Some(created) = &status.created {
        println!("  created: {created}");
    }
    println!("  ahead:   {} commit(s)", status.commits_ahead);
    println!(
        "  children: {}/{} closed",
        status.children_closed, status.children_total
    );
    println!("  merged merge requests:");
    if status.merged.is_empty() {
        println!("    {}", "(none)".muted());
    }
    for mr in &status.merged {
        println!("    {}  {}", mr.id, mr.branch.muted());
    }
    println!("  pending merge requests:");
    if status.pending.is_empty() {
        println!("    {}", "(none)".muted());
    }
    for mr in &status.pending {
        println!("    {}  {}", mr.id, mr.branch.muted());
    }
    if status.ready {
        let how = if status.auto_land {
            "will land automatically"
        } else {
            "run `refinery integration land` to land it"
        };
        println!("{}", check(&format!("ready to land; {how}")));
    } else {
        println!("{}", "not ready to land".muted());
    }
    Ok(())
}
