use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TaskApi;
use crate::config::TaskClaimConfig;
use crate::error::ConfigError;
use crate::events::{NetworkEvent, NetworkEvents};
use crate::orchestrator::ClaimOrchestrator;
use crate::report::ClaimLog;
use crate::summary::RewardSummarizer;
use crate::transport::RpcTransport;
use crate::triggers::{
    debounced_pass, on_task_info_notify, startup_reconcile, StartupPolicy, DEFAULT_PUSH_DEBOUNCE,
    DEFAULT_STARTUP_DELAY,
};
use crate::types::ClaimableTask;

#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    pub startup_delay: Duration,
    pub push_debounce: Duration,
    pub startup_policy: StartupPolicy,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            startup_delay: DEFAULT_STARTUP_DELAY,
            push_debounce: DEFAULT_PUSH_DEBOUNCE,
            startup_policy: StartupPolicy::BestEffort,
        }
    }
}

#[derive(Default)]
struct LifecycleState {
    initialized: bool,
    listener: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

type PassSet = Arc<Mutex<JoinSet<()>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the push listener and every scheduled pass of the task system.
///
/// [`TaskSystem::cleanup`] stops the listener and cancels every pass still waiting out its
/// delay, so no new pass starts after teardown. A pass already claiming finishes its candidates;
/// [`TaskSystem::drain`] waits for it.
pub struct TaskSystem {
    orchestrator: Arc<ClaimOrchestrator>,
    events: NetworkEvents,
    options: LifecycleOptions,
    state: Mutex<LifecycleState>,
    passes: PassSet,
}

impl TaskSystem {
    pub fn new(
        orchestrator: Arc<ClaimOrchestrator>,
        events: NetworkEvents,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            orchestrator,
            events,
            options,
            state: Mutex::new(LifecycleState::default()),
            passes: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn from_config(
        config: &TaskClaimConfig,
        transport: Arc<dyn RpcTransport>,
        events: NetworkEvents,
        log: Arc<dyn ClaimLog>,
    ) -> Result<Self, ConfigError> {
        let summarizer = RewardSummarizer::new(
            config.tasks.currency_item_id,
            config.tasks.experience_item_id,
            Arc::new(config.item_catalog()?),
        );
        let orchestrator = ClaimOrchestrator::new(TaskApi::new(transport), summarizer, log)
            .with_claim_interval(config.tasks.claim_interval());
        let options = LifecycleOptions {
            startup_delay: config.tasks.startup_delay(),
            push_debounce: config.tasks.push_debounce(),
            ..LifecycleOptions::default()
        };
        Ok(Self::new(Arc::new(orchestrator), events, options))
    }

    pub fn orchestrator(&self) -> &Arc<ClaimOrchestrator> {
        &self.orchestrator
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    /// Subscribes to `taskInfoNotify` and schedules the startup poll.
    ///
    /// Returns `false` when already initialized; the second call changes nothing.
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self) -> bool {
        let mut state = lock(&self.state);
        if state.initialized {
            debug!("task system already initialized");
            return false;
        }

        let cancel = CancellationToken::new();
        state.listener = Some(self.spawn_listener(cancel.clone()));

        let orchestrator = self.orchestrator.clone();
        let LifecycleOptions {
            startup_delay,
            startup_policy,
            ..
        } = self.options;
        let startup_cancel = cancel.clone();
        lock(&self.passes).spawn(async move {
            startup_reconcile(
                &orchestrator,
                startup_delay,
                startup_policy,
                &startup_cancel,
            )
            .await;
        });
        state.cancel = cancel;

        state.initialized = true;
        info!(
            "task system initialized (startup check in {}ms)",
            startup_delay.as_millis()
        );
        true
    }

    /// Unsubscribes and cancels the startup poll and every pass still in its delay.
    pub fn cleanup(&self) {
        let mut state = lock(&self.state);
        if let Some(listener) = state.listener.take() {
            listener.abort();
        }
        state.cancel.cancel();

        if state.initialized {
            info!("task system stopped");
        }
        state.initialized = false;
    }

    /// Number of passes scheduled or running, the startup poll included.
    pub fn pending_passes(&self) -> usize {
        let mut passes = lock(&self.passes);
        while passes.try_join_next().is_some() {}
        passes.len()
    }

    /// Waits for every pass scheduled so far to finish or observe its cancellation.
    pub async fn drain(&self) {
        let mut passes = std::mem::take(&mut *lock(&self.passes));
        while passes.join_next().await.is_some() {}
    }

    fn spawn_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
        // Subscribe before spawning so a push sent right after initialize() is not missed.
        let mut rx = self.events.subscribe();
        let orchestrator = self.orchestrator.clone();
        let passes = self.passes.clone();
        let debounce = self.options.push_debounce;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(NetworkEvent::TaskInfoNotify(info)) => {
                        let log = orchestrator.log().as_ref();
                        if let Some(tasks) = on_task_info_notify(info.as_ref(), log) {
                            let cancel = cancel.clone();
                            schedule_pass(&passes, orchestrator.clone(), tasks, debounce, cancel);
                        }
                    }
                    Ok(other) => debug!("ignoring {} push", other.name()),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("task listener lagged, {} pushes dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn schedule_pass(
    passes: &PassSet,
    orchestrator: Arc<ClaimOrchestrator>,
    tasks: Vec<ClaimableTask>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut passes = lock(passes);
    while passes.try_join_next().is_some() {}
    passes.spawn(async move {
        debounced_pass(&orchestrator, tasks, debounce, &cancel).await;
    });
}

// Dropping the pass set aborts passes still claiming; call `drain` first to let them finish.
impl Drop for TaskSystem {
    fn drop(&mut self) {
        self.cleanup();
    }
}
