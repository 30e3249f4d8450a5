//! The worker-loop command

use crate::cli::context::CommandContext;
use refinery::daemon;
use refinery::error::Result;

/// `refinery run [rig]` - poll, claim, and process until interrupted.
pub async fn run_worker(ctx: &CommandContext, rig: Option<&str>) -> Result<()> {
    let engineer = ctx.engineer();
    daemon::run(&engineer, rig).await
}
