//! Concurrent batch runner. One `tokio::spawn`ed task per due check, results
//! streamed back through a bounded channel (buffer size 100, per the
//! teacher's `GlobalBuffer` sizing convention) to a single consumer task that
//! calls the sink in delivery order. A panicking executor is caught at the
//! task-join boundary and converted into an `error` outcome for that check
//! alone; it never poisons the rest of the batch.

use async_trait::async_trait;
use mon_common::Check;
use mon_executors::{Executor, ExecutorRegistry, Outcome};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

const OUTCOME_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("outcome channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Receives each execution outcome as the runner produces it. Implementors
/// are expected to perform store I/O without blocking sibling probe tasks —
/// the consumer task that calls this is decoupled from them by the channel.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn on_outcome(&self, check: Check, outcome: Outcome);
}

pub struct Runner {
    registry: Arc<ExecutorRegistry>,
    max_concurrency: usize,
}

impl Runner {
    pub fn new(registry: Arc<ExecutorRegistry>, max_concurrency: usize) -> Self {
        Self {
            registry,
            max_concurrency,
        }
    }

    pub async fn run_batch(&self, checks: Vec<Check>, sink: Arc<dyn OutcomeSink>) -> Result<()> {
        if checks.is_empty() {
            return Ok(());
        }

        let resources = self.registry.resources_for_batch(&checks);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel::<(Check, Outcome)>(OUTCOME_CHANNEL_CAPACITY);

        let consumer = tokio::spawn(async move {
            while let Some((check, outcome)) = rx.recv().await {
                sink.on_outcome(check, outcome).await;
            }
        });

        let mut tasks = Vec::with_capacity(checks.len());
        for check in checks {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let executor = match self.registry.get(check.kind.as_str()) {
                Ok(factory) => factory.create(&resources),
                Err(e) => {
                    let tx = tx.clone();
                    let check_id = check.check_id.clone();
                    warn!(check_id = %check_id, error = %e, "unknown check kind");
                    let outcome = Outcome::error("unknown_kind", e.to_string(), serde_json::json!({}));
                    let _ = tx.send((check, outcome)).await;
                    drop(permit);
                    continue;
                }
            };

            let tx = tx.clone();
            tasks.push(tokio::spawn(run_one(executor, check, permit, tx)));
        }
        drop(tx);

        for task in tasks {
            if let Err(join_err) = task.await {
                if join_err.is_panic() {
                    warn!("executor task panicked; outcome already reported as internal_panic");
                }
            }
        }

        consumer.await.map_err(|_| RunnerError::ChannelClosed)?;
        debug!("batch finished");
        Ok(())
    }
}

/// Runs one executor call on its own nested task so a panic inside it is
/// caught at the join boundary and converted into an `internal_panic`
/// outcome, rather than silently dropping the check from the batch.
async fn run_one(
    executor: Arc<dyn Executor>,
    check: Check,
    permit: tokio::sync::OwnedSemaphorePermit,
    tx: mpsc::Sender<(Check, Outcome)>,
) {
    let check_for_exec = check.clone();
    let executor_for_exec = executor.clone();
    let exec_handle = tokio::spawn(async move { executor_for_exec.execute(&check_for_exec).await });

    let outcome = match exec_handle.await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::error("internal_panic", "executor task panicked", serde_json::json!({})),
    };

    executor.close().await;
    drop(permit);
    let _ = tx.send((check, outcome)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mon_common::{CheckKind, CheckRowStatus, ResultStatus};
    use mon_executors::ExecutorFactory;
    use mon_executors::SharedResources;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn sample_check(id: &str, kind: CheckKind) -> Check {
        Check {
            check_id: id.to_string(),
            service_id: "svc".to_string(),
            name: "probe".to_string(),
            kind,
            target: "irrelevant".to_string(),
            interval_seconds: 60,
            disabled: false,
            data: serde_json::json!({}),
            status: CheckRowStatus::Processing,
            next_check_time: 0,
            created_at: 0,
        }
    }

    struct CollectingSink {
        outcomes: Mutex<Vec<(String, Outcome)>>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self { outcomes: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl OutcomeSink for CollectingSink {
        async fn on_outcome(&self, check: Check, outcome: Outcome) {
            self.outcomes.lock().unwrap().push((check.check_id, outcome));
        }
    }

    /// Always returns a fixed outcome; used to verify the happy path.
    struct FixedExecutor(Outcome);

    #[async_trait]
    impl Executor for FixedExecutor {
        async fn execute(&self, _check: &Check) -> Outcome {
            self.0.clone()
        }
    }

    struct FixedFactory(Outcome);
    impl ExecutorFactory for FixedFactory {
        fn create(&self, _resources: &SharedResources) -> Arc<dyn Executor> {
            Arc::new(FixedExecutor(self.0.clone()))
        }
    }

    /// Always panics; used to verify panic isolation in `run_one`.
    struct PanickingExecutor;

    #[async_trait]
    impl Executor for PanickingExecutor {
        async fn execute(&self, _check: &Check) -> Outcome {
            panic!("executor blew up");
        }
    }

    struct PanickingFactory;
    impl ExecutorFactory for PanickingFactory {
        fn create(&self, _resources: &SharedResources) -> Arc<dyn Executor> {
            Arc::new(PanickingExecutor)
        }
    }

    /// Counts concurrent in-flight executions so tests can assert the
    /// semaphore actually bounds concurrency rather than just trusting it.
    struct ConcurrencyTrackingExecutor {
        current: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Executor for ConcurrencyTrackingExecutor {
        async fn execute(&self, _check: &Check) -> Outcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Outcome::ok(serde_json::json!({}))
        }
    }

    struct ConcurrencyTrackingFactory {
        current: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }
    impl ExecutorFactory for ConcurrencyTrackingFactory {
        fn create(&self, _resources: &SharedResources) -> Arc<dyn Executor> {
            Arc::new(ConcurrencyTrackingExecutor {
                current: self.current.clone(),
                max_seen: self.max_seen.clone(),
            })
        }
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let registry = Arc::new(ExecutorRegistry::with_defaults());
        let runner = Runner::new(registry, 4);
        let sink = Arc::new(CollectingSink::new());

        runner.run_batch(Vec::new(), sink.clone()).await.unwrap();
        assert!(sink.outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_due_check_yields_exactly_one_outcome() {
        let mut registry = ExecutorRegistry::with_defaults();
        registry.register("http", Box::new(FixedFactory(Outcome::ok(serde_json::json!({"n": 1})))));
        let runner = Runner::new(Arc::new(registry), 4);
        let sink = Arc::new(CollectingSink::new());

        let checks = vec![
            sample_check("c1", CheckKind::Http),
            sample_check("c2", CheckKind::Http),
            sample_check("c3", CheckKind::Http),
        ];
        runner.run_batch(checks, sink.clone()).await.unwrap();

        let outcomes = sink.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, o)| o.status == ResultStatus::Ok));
    }

    #[tokio::test]
    async fn panicking_executor_is_isolated_as_an_error_outcome() {
        let mut registry = ExecutorRegistry::with_defaults();
        registry.register("http", Box::new(PanickingFactory));
        let runner = Runner::new(Arc::new(registry), 4);
        let sink = Arc::new(CollectingSink::new());

        let checks = vec![sample_check("c1", CheckKind::Http), sample_check("c2", CheckKind::Http)];
        runner.run_batch(checks, sink.clone()).await.unwrap();

        let outcomes = sink.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        for (_, outcome) in outcomes.iter() {
            assert_eq!(outcome.status, ResultStatus::Error);
            assert_eq!(outcome.payload["error_type"], "internal_panic");
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_max_concurrency() {
        let current = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut registry = ExecutorRegistry::with_defaults();
        registry.register(
            "http",
            Box::new(ConcurrencyTrackingFactory { current: current.clone(), max_seen: max_seen.clone() }),
        );
        let runner = Runner::new(Arc::new(registry), 2);
        let sink = Arc::new(CollectingSink::new());

        let checks: Vec<_> = (0..6).map(|i| sample_check(&format!("c{i}"), CheckKind::Http)).collect();
        runner.run_batch(checks, sink.clone()).await.unwrap();

        assert_eq!(sink.outcomes.lock().unwrap().len(), 6);
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
