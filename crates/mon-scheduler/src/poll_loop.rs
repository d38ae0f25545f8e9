//! Scheduler poll loop: wakes on a fixed interval, asks the store for due
//! checks, and hands them to the bus on a detached worker so a slow batch
//! never delays the next tick. Dispatch tasks are tracked in a shared
//! `JoinSet` so a caller can await in-flight batches during shutdown instead
//! of losing track of them the moment they're spawned.

use mon_bus::{Bus, ExecuteChecks};
use mon_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, error, warn};

/// Large enough that a single poll effectively never truncates the due set
/// under realistic check counts; list_due's own ordering still makes any
/// truncation deterministic if the fleet ever grows past it.
const LIST_DUE_LIMIT: u32 = 10_000;

pub struct Scheduler {
    store: Arc<dyn Store>,
    bus: Bus,
    poll_interval: Duration,
    dispatches: Arc<Mutex<JoinSet<()>>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, bus: Bus, poll_interval: Duration) -> Self {
        Self {
            store,
            bus,
            poll_interval,
            dispatches: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// A handle to the scheduler's in-flight `ExecuteChecks` dispatch tasks.
    /// Grab this before spawning `run` so shutdown can await stragglers
    /// instead of only the (near-instant) poll loop itself.
    pub fn dispatch_tasks(&self) -> Arc<Mutex<JoinSet<()>>> {
        self.dispatches.clone()
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "scheduler tick failed; backing off one interval");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("scheduler loop shutting down");
                    return;
                }
            }
        }
    }

    pub(crate) async fn tick(&self) -> mon_store::Result<()> {
        let now = chrono::Utc::now().timestamp();
        let due = self.store.list_due(now, LIST_DUE_LIMIT).await?;
        if due.is_empty() {
            return Ok(());
        }

        debug!(count = due.len(), "dispatching due checks");
        metrics::gauge!("scheduler.due_checks").set(due.len() as f64);

        let bus = self.bus.clone();
        self.dispatches.lock().await.spawn(async move {
            if let Err(e) = bus.dispatch_command(ExecuteChecks { checks: due }).await {
                warn!(error = %e, "bus rejected ExecuteChecks dispatch");
            }
        });
        Ok(())
    }
}

/// Awaits every tracked dispatch task to completion. Used during shutdown,
/// wrapped in the caller's own grace-period timeout.
pub async fn join_all_dispatches(dispatches: Arc<Mutex<JoinSet<()>>>) {
    let mut set = dispatches.lock().await;
    while set.join_next().await.is_some() {}
}
