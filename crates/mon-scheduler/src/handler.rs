//! The `ExecuteChecks` command handler: the glue between the runner, the
//! store, and the bus. Runs each outcome through `persist_one`, recomputes
//! derived status, and emits `CheckFailed`/`ServiceStatusChanged` only on the
//! transitions the notifier actually cares about.

use async_trait::async_trait;
use mon_bus::{transitioned_into_failed, Bus, BusEvent, CommandHandler, ExecuteChecks};
use mon_common::{Check, CheckResult, DerivedCheckStatus, DerivedServiceStatus, DERIVED_STATUS_WINDOW};
use mon_executors::{ExecutorRegistry, Outcome};
use mon_runner::{OutcomeSink, Runner};
use mon_store::Store;
use std::sync::Arc;
use tracing::{error, warn};

pub struct ExecuteChecksHandler {
    store: Arc<dyn Store>,
    runner: Arc<Runner>,
}

impl ExecuteChecksHandler {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ExecutorRegistry>, max_concurrency: usize) -> Self {
        Self {
            store: store.clone(),
            runner: Arc::new(Runner::new(registry, max_concurrency)),
        }
    }
}

#[async_trait]
impl CommandHandler for ExecuteChecksHandler {
    async fn handle(&self, command: ExecuteChecks, bus: &Bus) {
        let sink: Arc<dyn OutcomeSink> = Arc::new(PersistingSink {
            store: self.store.clone(),
            bus: bus.clone(),
        });
        if let Err(e) = self.runner.run_batch(command.checks, sink).await {
            error!(error = %e, "runner batch failed");
        }
    }
}

struct PersistingSink {
    store: Arc<dyn Store>,
    bus: Bus,
}

#[async_trait]
impl OutcomeSink for PersistingSink {
    async fn on_outcome(&self, check: Check, outcome: Outcome) {
        let now = chrono::Utc::now().timestamp();
        let result = CheckResult {
            result_id: uuid::Uuid::new_v4().to_string(),
            check_id: check.check_id.clone(),
            status: outcome.status,
            payload: outcome.payload,
            created_at: now,
        };
        let next_check_time = now + check.interval_seconds;

        if let Err(e) = self.store.record_execution(&result, next_check_time).await {
            error!(check_id = %check.check_id, error = %e, "failed to persist execution; schedule not advanced");
            return;
        }

        if let Err(e) = self.recompute_and_notify(&check, &result).await {
            error!(check_id = %check.check_id, error = %e, "failed to recompute derived status");
        }
    }
}

impl PersistingSink {
    /// Reads one result past the window so the status derived *before* this
    /// result existed is recoverable without a separate in-memory cache.
    async fn recompute_and_notify(&self, check: &Check, result: &CheckResult) -> mon_store::Result<()> {
        let window = self
            .store
            .recent_results(&check.check_id, DERIVED_STATUS_WINDOW as u32 + 1)
            .await?;

        let current = DerivedCheckStatus::derive(&window[..window.len().min(DERIVED_STATUS_WINDOW)]);
        let previous = if window.len() > 1 {
            Some(DerivedCheckStatus::derive(&window[1..]))
        } else {
            None
        };

        if transitioned_into_failed(previous, current) {
            self.bus.publish_event(BusEvent::CheckFailed {
                check_id: check.check_id.clone(),
                service_id: check.service_id.clone(),
                check_name: check.name.clone(),
                kind: check.kind.as_str().to_string(),
                target: check.target.clone(),
                payload: result.payload.clone(),
                occurred_at: result.created_at,
            });
        }

        if let Some(previous) = previous {
            self.maybe_notify_service_change(check, previous, current).await?;
        }

        Ok(())
    }

    async fn maybe_notify_service_change(
        &self,
        check: &Check,
        previous_check_status: DerivedCheckStatus,
        current_check_status: DerivedCheckStatus,
    ) -> mon_store::Result<()> {
        let siblings: Vec<Check> = self
            .store
            .list_checks()
            .await?
            .into_iter()
            .filter(|c| c.service_id == check.service_id && !c.disabled)
            .collect();

        let mut previous_statuses = Vec::with_capacity(siblings.len());
        let mut current_statuses = Vec::with_capacity(siblings.len());
        for sibling in &siblings {
            if sibling.check_id == check.check_id {
                previous_statuses.push(previous_check_status);
                current_statuses.push(current_check_status);
                continue;
            }
            let recent = self
                .store
                .recent_results(&sibling.check_id, DERIVED_STATUS_WINDOW as u32)
                .await?;
            let status = DerivedCheckStatus::derive(&recent);
            previous_statuses.push(status);
            current_statuses.push(status);
        }

        let previous_service = DerivedServiceStatus::derive(&previous_statuses);
        let current_service = DerivedServiceStatus::derive(&current_statuses);
        if previous_service == current_service {
            return Ok(());
        }

        let service_name = match self.store.get_service(&check.service_id).await? {
            Some(service) => service.name,
            None => {
                warn!(service_id = %check.service_id, "service status changed but service row is missing");
                check.service_id.clone()
            }
        };

        self.bus.publish_event(BusEvent::ServiceStatusChanged {
            service_id: check.service_id.clone(),
            service_name,
            old_status: Some(previous_service),
            new_status: current_service,
            occurred_at: chrono::Utc::now().timestamp(),
        });
        Ok(())
    }
}
