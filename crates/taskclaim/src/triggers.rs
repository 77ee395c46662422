//! Entry points that turn a task snapshot into a reconciliation pass.
//!
//! Two triggers exist: a delayed poll once at startup, and the `taskInfoNotify` push which
//! carries its own snapshot and claims after a short debounce.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analyzer::analyze_task_info;
use crate::error::TaskResult;
use crate::orchestrator::ClaimOrchestrator;
use crate::report::ClaimLog;
use crate::types::{ClaimableTask, PassReport, TaskInfo, LOG_CATEGORY};

pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(4_000);
pub const DEFAULT_PUSH_DEBOUNCE: Duration = Duration::from_millis(1_000);

/// How the startup pass treats a failed fetch or pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartupPolicy {
    /// Discard the failure. Nothing reaches the claim log.
    #[default]
    BestEffort,
    /// Report the failure as a warning on the claim log.
    Reported,
}

/// Fetch → analyze → claim, once.
pub async fn check_and_claim_tasks(orchestrator: &ClaimOrchestrator) -> TaskResult<PassReport> {
    let reply = orchestrator.api().get_task_info().await?;
    let Some(info) = reply.task_info else {
        debug!("task info reply carried no task_info");
        return Ok(PassReport::default());
    };

    let claimable = analyze_task_info(&info);
    if claimable.is_empty() {
        return Ok(PassReport::default());
    }

    orchestrator.log().info(
        LOG_CATEGORY,
        &format!("found {} claimable tasks", claimable.len()),
    );
    Ok(orchestrator.claim_all(&claimable).await)
}

/// Sleeps for `delay`. Returns `false` when `cancel` fires first.
async fn wait_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

/// The startup poll: waits `delay`, then runs one pass under `policy`.
///
/// Cancelling during the wait skips the pass. Once started, the pass is not interrupted by
/// `cancel`.
pub async fn startup_reconcile(
    orchestrator: &ClaimOrchestrator,
    delay: Duration,
    policy: StartupPolicy,
    cancel: &CancellationToken,
) {
    if !wait_unless_cancelled(delay, cancel).await {
        debug!("startup task check cancelled");
        return;
    }

    match check_and_claim_tasks(orchestrator).await {
        Ok(report) => debug!(
            claimed = report.claimed,
            failed = report.failed,
            skipped = report.skipped,
            "startup task check finished"
        ),
        Err(err) => match policy {
            StartupPolicy::BestEffort => debug!("startup task check dropped: {}", err),
            StartupPolicy::Reported => orchestrator
                .log()
                .warn(LOG_CATEGORY, &format!("startup task check failed: {}", err)),
        },
    }
}

/// Analyzes a pushed snapshot. Returns the candidates when there is something to claim.
pub fn on_task_info_notify(
    info: Option<&TaskInfo>,
    log: &dyn ClaimLog,
) -> Option<Vec<ClaimableTask>> {
    let claimable = analyze_task_info(info?);
    if claimable.is_empty() {
        return None;
    }

    log.info(
        LOG_CATEGORY,
        &format!("{} tasks claimable, claiming shortly", claimable.len()),
    );
    Some(claimable)
}

/// Waits out the push debounce, then claims `tasks`.
///
/// `None` when `cancel` fired during the debounce. A pass that has started claims every
/// candidate regardless of `cancel`.
pub async fn debounced_pass(
    orchestrator: &ClaimOrchestrator,
    tasks: Vec<ClaimableTask>,
    debounce: Duration,
    cancel: &CancellationToken,
) -> Option<PassReport> {
    if !wait_unless_cancelled(debounce, cancel).await {
        debug!("debounced pass of {} tasks cancelled", tasks.len());
        return None;
    }
    Some(orchestrator.claim_all(&tasks).await)
}
