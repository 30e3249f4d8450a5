//! Worker loop
//!
//! Each refinery process repeats: list ready merge requests, claim one,
//! process it, release or close. Several processes may run this loop
//! against the same queue; the claim manager keeps them apart. The poll
//! interval is a safety net, not a scheduler - a cycle also runs once at
//! startup.

use crate::claim;
use crate::engineer::Engineer;
use crate::error::{Error, Result};
use crate::store::fields::DEFAULT_TARGET;
use tracing::{error, info, warn};

/// Run the worker loop until ctrl-c.
pub async fn run(engineer: &Engineer, rig: Option<&str>) -> Result<()> {
    let config = engineer.config().clone();
    if !config.enabled {
        info!("merge queue disabled for this rig");
        return Ok(());
    }
    info!(
        worker = engineer.worker(),
        poll = %humantime::format_duration(config.poll_interval),
        "refinery worker started"
    );

    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = process_cycle(engineer, rig).await {
                    error!(error = %e, "poll cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

/// One poll cycle: claim and process up to `max_concurrent` ready
/// merge requests.
///
/// A mainline refinery only takes merge requests targeting `main`;
/// with `integration_refinery` set the split flips and this worker
/// serves the integration-branch queues instead.
pub async fn process_cycle(engineer: &Engineer, rig: Option<&str>) -> Result<()> {
    let config = engineer.config();
    let ready: Vec<_> = claim::list_ready(
        engineer.store().as_ref(),
        rig,
        config.stale_claim_timeout,
    )
    .await?
    .into_iter()
    .filter(|mr| (mr.target != DEFAULT_TARGET) == config.integration_refinery)
    .collect();
    if ready.is_empty() {
        return Ok(());
    }
    info!(count = ready.len(), "ready merge requests");

    for mr in ready.into_iter().take(config.max_concurrent) {
        let claimed = match claim::claim(
            engineer.store().as_ref(),
            &mr.id,
            engineer.worker(),
            config.stale_claim_timeout,
        )
        .await
        {
            Ok(claimed) => claimed,
            Err(Error::AlreadyClaimed { mr, holder }) => {
                // another worker won the race; pick different work next cycle
                info!(mr = %mr, holder = %holder, "lost claim race");
                continue;
            }
            Err(e) => return Err(e),
        };

        match engineer.process(&claimed).await {
            Ok(outcome) => {
                info!(mr = %outcome.mr_id, commit = %outcome.merge_commit, "merged");
            }
            Err(e @ (Error::GateFailure { .. } | Error::ConflictDetected { .. })) => {
                // bookkeeping already done by the processor
                warn!(mr = %claimed.id, error = %e, "processing failed");
            }
            Err(e) => {
                error!(mr = %claimed.id, error = %e, "processing aborted");
                if let Err(rel) = claim::release(engineer.store().as_ref(), &claimed.id).await {
                    warn!(mr = %claimed.id, error = %rel, "could not release claim");
                }
            }
        }
    }
    Ok(())
}
