use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::debug;

use crate::api::TaskApi;
use crate::error::TaskResult;
use crate::report::ClaimLog;
use crate::summary::RewardSummarizer;
use crate::types::{ClaimableTask, PassReport, LOG_CATEGORY};

pub const DEFAULT_CLAIM_INTERVAL: Duration = Duration::from_millis(300);

/// Claims candidates one at a time, pacing between attempts.
///
/// Passes started from different triggers share one dispatch lock and one in-flight set. Only
/// one claim call is ever outstanding, the pause after it is held under the same lock, and a
/// task id reserved by one pass is skipped by the others.
pub struct ClaimOrchestrator {
    api: TaskApi,
    summarizer: RewardSummarizer,
    log: Arc<dyn ClaimLog>,
    claim_interval: Duration,
    in_flight: Arc<Mutex<HashSet<u64>>>,
    dispatch: AsyncMutex<()>,
}

struct InFlightGuard {
    id: u64,
    set: Arc<Mutex<HashSet<u64>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.id);
    }
}

fn lock(set: &Mutex<HashSet<u64>>) -> MutexGuard<'_, HashSet<u64>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ClaimOrchestrator {
    pub fn new(api: TaskApi, summarizer: RewardSummarizer, log: Arc<dyn ClaimLog>) -> Self {
        Self {
            api,
            summarizer,
            log,
            claim_interval: DEFAULT_CLAIM_INTERVAL,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            dispatch: AsyncMutex::new(()),
        }
    }

    pub fn with_claim_interval(mut self, interval: Duration) -> Self {
        self.claim_interval = interval;
        self
    }

    pub fn api(&self) -> &TaskApi {
        &self.api
    }

    pub fn log(&self) -> &Arc<dyn ClaimLog> {
        &self.log
    }

    pub fn is_in_flight(&self, task_id: u64) -> bool {
        lock(&self.in_flight).contains(&task_id)
    }

    /// Runs one pass over `tasks`. Per-task failures are logged and never abort the pass.
    pub async fn claim_all(&self, tasks: &[ClaimableTask]) -> PassReport {
        let mut report = PassReport::default();

        for task in tasks {
            let Some(guard) = self.reserve(task.id) else {
                debug!("task {} already being claimed, skipping", task.id);
                report.skipped += 1;
                continue;
            };
            let turn = self.dispatch.lock().await;

            match self.claim_one(task).await {
                Ok(line) => {
                    self.log.info(LOG_CATEGORY, &line);
                    report.claimed += 1;
                }
                Err(err) => {
                    self.log
                        .warn(LOG_CATEGORY, &format!("claim failed #{}: {}", task.id, err));
                    report.failed += 1;
                }
            }
            drop(guard);

            sleep(self.claim_interval).await;
            drop(turn);
        }

        report
    }

    fn reserve(&self, task_id: u64) -> Option<InFlightGuard> {
        let mut set = lock(&self.in_flight);
        if !set.insert(task_id) {
            return None;
        }
        Some(InFlightGuard {
            id: task_id,
            set: self.in_flight.clone(),
        })
    }

    async fn claim_one(&self, task: &ClaimableTask) -> TaskResult<String> {
        let use_share = task.use_share();
        let reply = self.api.claim_task_reward(task.id, use_share).await?;
        let items = reply.items.unwrap_or_default();

        let rewards = if items.is_empty() {
            "none".to_string()
        } else {
            self.summarizer.summarize(&items)
        };
        let multiple = if use_share {
            format!(" (x{})", task.share_multiple)
        } else {
            String::new()
        };

        Ok(format!("claimed: {}{} -> {}", task.desc, multiple, rewards))
    }
}
