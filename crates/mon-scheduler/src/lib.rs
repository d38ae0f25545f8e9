//! Drives the scheduler and cleaner loops and wires the `ExecuteChecks`
//! handler that ties the runner, store, and bus together.

pub mod cleaner;
pub mod handler;
pub mod poll_loop;

pub use cleaner::Cleaner;
pub use handler::ExecuteChecksHandler;
pub use poll_loop::{join_all_dispatches, Scheduler};

#[cfg(test)]
mod tests {
    use super::*;
    use mon_bus::Bus;
    use mon_common::{Check, CheckKind, CheckRowStatus};
    use mon_executors::ExecutorRegistry;
    use mon_store::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    fn due_check(id: &str) -> Check {
        Check {
            check_id: id.to_string(),
            service_id: "svc".to_string(),
            name: "probe".to_string(),
            kind: CheckKind::Http,
            target: "http://example.invalid".to_string(),
            interval_seconds: 60,
            disabled: false,
            data: serde_json::json!({}),
            status: CheckRowStatus::Idle,
            next_check_time: 0,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn scheduler_tick_advances_a_due_check_past_now() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.upsert_check(&due_check("c1")).await.unwrap();

        let bus = Bus::new();
        let handler = Arc::new(ExecuteChecksHandler::new(
            store.clone(),
            Arc::new(ExecutorRegistry::with_defaults()),
            4,
        ));
        bus.register_command_handler(handler);

        let scheduler = Scheduler::new(store.clone(), bus, Duration::from_secs(5));
        scheduler.tick().await.unwrap();

        // Give the detached dispatch worker a moment to run against the
        // in-memory store.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let refreshed = store.get_check("c1").await.unwrap().unwrap();
        assert_eq!(refreshed.status, CheckRowStatus::Idle);
        assert!(refreshed.next_check_time > 0);
    }

    #[tokio::test]
    async fn cleaner_sweep_is_a_no_op_on_an_empty_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cleaner = Cleaner::new(store, Duration::from_secs(1), Duration::from_secs(1), 100);
        cleaner.sweep().await.unwrap();
    }
}
