//! Retention cleaner: deletes result rows older than `retention_period` in
//! bounded batches, yielding between batches so it never starves live
//! writers holding the same SQLite connection pool.

use mon_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info};

pub struct Cleaner {
    store: Arc<dyn Store>,
    cleanup_interval: Duration,
    retention_period: Duration,
    batch_size: u32,
}

impl Cleaner {
    pub fn new(
        store: Arc<dyn Store>,
        cleanup_interval: Duration,
        retention_period: Duration,
        batch_size: u32,
    ) -> Self {
        Self {
            store,
            cleanup_interval,
            retention_period,
            batch_size,
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.cleanup_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "cleaner sweep failed; will retry next interval");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("cleaner loop shutting down");
                    return;
                }
            }
        }
    }

    pub(crate) async fn sweep(&self) -> mon_store::Result<()> {
        let cutoff = chrono::Utc::now().timestamp() - self.retention_period.as_secs() as i64;
        let mut total_deleted = 0u64;
        loop {
            let deleted = self.store.delete_results_older_than(cutoff, self.batch_size).await?;
            total_deleted += deleted;
            if deleted < self.batch_size as u64 {
                break;
            }
            tokio::task::yield_now().await;
        }
        if total_deleted > 0 {
            info!(deleted = total_deleted, cutoff, "cleaner swept stale results");
        }
        Ok(())
    }
}
