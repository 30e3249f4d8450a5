//! refinery binary entry point

mod cli;

use clap::{Parser, Subcommand};
use cli::context::CommandContext;
use cli::style::Stylize;
use refinery::integration::LandOptions;
use refinery::submit::SubmitOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refinery", version, about = "Merge-queue scheduler for coding-agent workers")]
struct Cli {
    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Claim a merge request for this worker
    Claim {
        /// Merge request ID
        mr_id: String,
    },
    /// Release a claim, returning the merge request to the queue
    Release {
        /// Merge request ID
        mr_id: String,
    },
    /// List merge requests with no live claim (diagnostic view)
    Unclaimed {
        /// Restrict to one rig
        rig: Option<String>,
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// List merge requests ready to be claimed
    Ready {
        /// Restrict to one rig
        rig: Option<String>,
        /// Machine-readable output
        #[arg(long)]
        json: bool,
        /// Include not-ready merge requests, annotated with why
        #[arg(long)]
        all: bool,
    },
    /// List merge requests blocked by open tasks
    Blocked {
        /// Restrict to one rig
        rig: Option<String>,
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Scan the queue for stale claims, blockers, and missing branches
    Anomalies {
        /// Restrict to one rig
        rig: Option<String>,
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Submit a branch to the merge queue
    Submit {
        /// Source branch
        #[arg(long)]
        branch: String,
        /// Issue the work was done for
        #[arg(long)]
        issue: String,
        /// Target branch (defaults to main)
        #[arg(long)]
        target: Option<String>,
        /// Rig the merge request belongs to
        #[arg(long, default_value = "")]
        rig: String,
        /// Priority 0-4, lower is more urgent
        #[arg(long, default_value_t = 2)]
        priority: u8,
        /// Convoy the source issue belongs to
        #[arg(long)]
        convoy: Option<String>,
    },
    /// Retry a failed merge request
    Retry {
        /// Rig the merge request belongs to
        rig: String,
        /// Merge request ID
        mr_id: String,
        /// Process immediately instead of waiting for the next poll
        #[arg(long)]
        now: bool,
    },
    /// Reject a merge request without closing its source issue
    Reject {
        /// Rig the merge request belongs to
        rig: String,
        /// Merge request ID or branch name
        mr: String,
        /// Why the merge request is rejected
        #[arg(long, short)]
        reason: String,
        /// Notify the submitting worker
        #[arg(long)]
        notify: bool,
    },
    /// Manage epic-scoped integration branches
    Integration {
        #[command(subcommand)]
        action: IntegrationCommand,
    },
    /// Run the worker loop: poll, claim, process
    Run {
        /// Restrict to one rig
        rig: Option<String>,
    },
}

#[derive(Subcommand)]
enum IntegrationCommand {
    /// Create an integration branch for an epic
    Create {
        /// Epic ID
        epic_id: String,
        /// Branch name template override
        #[arg(long)]
        template: Option<String>,
        /// Overwrite existing integration branch metadata
        #[arg(long)]
        force: bool,
    },
    /// Merge an integration branch into its base and clean up
    Land {
        /// Epic ID
        epic_id: String,
        /// Bypass the pending-merge-request and open-children checks
        #[arg(long)]
        force: bool,
        /// Skip the gate pipeline on the merged result
        #[arg(long)]
        skip_tests: bool,
        /// Report the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Report on an epic's integration branch
    Status {
        /// Epic ID
        epic_id: String,
    },
}

async fn dispatch(cli: Cli) -> refinery::error::Result<()> {
    let ctx = CommandContext::new(cli.repo)?;
    match cli.command {
        Command::Claim { mr_id } => cli::queue::run_claim(&ctx, &mr_id).await,
        Command::Release { mr_id } => cli::queue::run_release(&ctx, &mr_id).await,
        Command::Unclaimed { rig, json } => {
            cli::queue::run_unclaimed(&ctx, rig.as_deref(), json).await
        }
        Command::Ready { rig, json, all } => {
            cli::queue::run_ready(&ctx, rig.as_deref(), json, all).await
        }
        Command::Blocked { rig, json } => {
            cli::queue::run_blocked(&ctx, rig.as_deref(), json).await
        }
        Command::Anomalies { rig, json } => {
            cli::queue::run_anomalies(&ctx, rig.as_deref(), json).await
        }
        Command::Submit {
            branch,
            issue,
            target,
            rig,
            priority,
            convoy,
        } => {
            let opts = SubmitOptions {
                branch,
                target,
                source_issue: issue,
                worker: ctx.worker.clone(),
                rig,
                priority: priority.min(4),
                convoy,
            };
            cli::mr::run_submit(&ctx, opts).await
        }
        Command::Retry { rig, mr_id, now } => cli::mr::run_retry(&ctx, &rig, &mr_id, now).await,
        Command::Reject {
            rig,
            mr,
            reason,
            notify,
        } => cli::mr::run_reject(&ctx, &rig, &mr, &reason, notify).await,
        Command::Integration { action } => match action {
            IntegrationCommand::Create {
                epic_id,
                template,
                force,
            } => cli::integration::run_create(&ctx, &epic_id, template.as_deref(), force).await,
            IntegrationCommand::Land {
                epic_id,
                force,
                skip_tests,
                dry_run,
            } => {
                let opts = LandOptions {
                    force,
                    skip_tests,
                    dry_run,
                };
                cli::integration::run_land(&ctx, &epic_id, opts).await
            }
            IntegrationCommand::Status { epic_id } => {
                cli::integration::run_status(&ctx, &epic_id).await
            }
        },
        Command::Run { rig } => cli::run::run_worker(&ctx, rig.as_deref()).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            anstream::eprintln!("{}", format!("error: {e}").error());
            ExitCode::FAILURE
        }
    }
}
