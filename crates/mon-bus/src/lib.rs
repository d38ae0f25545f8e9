//! Synchronous-semantics command/event dispatch. A [`Command`] has exactly
//! one handler; an [`Event`] fans out to zero or more listeners. Handlers may
//! enqueue further commands/events while running; those are drained FIFO
//! before the originating `dispatch_command` call returns, so a nested
//! dispatch never interleaves with a sibling top-level one.

use async_trait::async_trait;
use mon_common::{Check, DerivedCheckStatus, DerivedServiceStatus};
use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("no handler registered for ExecuteChecks")]
    UnknownCommand,
}

pub type Result<T> = std::result::Result<T, BusError>;

/// The sole command in this system: a batch of due checks ready for
/// concurrent execution.
#[derive(Debug, Clone)]
pub struct ExecuteChecks {
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone)]
pub enum BusEvent {
    CheckFailed {
        check_id: String,
        service_id: String,
        check_name: String,
        kind: String,
        target: String,
        payload: serde_json::Value,
        occurred_at: i64,
    },
    ServiceStatusChanged {
        service_id: String,
        service_name: String,
        old_status: Option<DerivedServiceStatus>,
        new_status: DerivedServiceStatus,
        occurred_at: i64,
    },
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: ExecuteChecks, bus: &Bus);
}

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle(&self, event: &BusEvent);
}

enum QueuedItem {
    Command(ExecuteChecks),
    Event(BusEvent),
}

/// In-process dispatcher. Cheap to clone (an `Arc` internally) so every
/// component that needs to publish events can hold its own handle.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    command_handler: RwLock<Option<Arc<dyn CommandHandler>>>,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    queue: Mutex<VecDeque<QueuedItem>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                command_handler: RwLock::new(None),
                listeners: RwLock::new(Vec::new()),
                queue: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn register_command_handler(&self, handler: Arc<dyn CommandHandler>) {
        *self.inner.command_handler.write().unwrap() = Some(handler);
    }

    pub fn register_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.listeners.write().unwrap().push(listener);
    }

    /// Dispatch the command, then drain any commands/events it (or their
    /// transitive listeners) enqueued, in FIFO order.
    pub async fn dispatch_command(&self, command: ExecuteChecks) -> Result<()> {
        self.enqueue(QueuedItem::Command(command));
        self.drain().await
    }

    /// Enqueue an event for delivery. Called from within a handler's
    /// execution; the event is processed once the current queue item
    /// finishes, never synchronously re-entrant.
    pub fn publish_event(&self, event: BusEvent) {
        self.enqueue(QueuedItem::Event(event));
    }

    fn enqueue(&self, item: QueuedItem) {
        self.inner.queue.lock().unwrap().push_back(item);
    }

    async fn drain(&self) -> Result<()> {
        loop {
            let item = self.inner.queue.lock().unwrap().pop_front();
            match item {
                None => return Ok(()),
                Some(QueuedItem::Command(command)) => {
                    let handler = self.inner.command_handler.read().unwrap().clone();
                    match handler {
                        Some(h) => h.handle(command, self).await,
                        None => {
                            tracing::error!("no handler registered for ExecuteChecks command");
                            return Err(BusError::UnknownCommand);
                        }
                    }
                }
                Some(QueuedItem::Event(event)) => {
                    let listeners = self.inner.listeners.read().unwrap().clone();
                    for listener in listeners {
                        listener.handle(&event).await;
                    }
                }
            }
        }
    }
}

/// Helper for handlers deciding whether a status transition warrants a
/// `CheckFailed` event: only the transition *into* `failed` is notified, not
/// every failed execution while already failed.
pub fn transitioned_into_failed(previous: Option<DerivedCheckStatus>, current: DerivedCheckStatus) -> bool {
    current == DerivedCheckStatus::Failed && previous != Some(DerivedCheckStatus::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler for RecordingHandler {
        async fn handle(&self, command: ExecuteChecks, bus: &Bus) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !command.checks.is_empty() {
                bus.publish_event(BusEvent::ServiceStatusChanged {
                    service_id: "svc".into(),
                    service_name: "svc".into(),
                    old_status: None,
                    new_status: DerivedServiceStatus::Passed,
                    occurred_at: 0,
                });
            }
        }
    }

    struct RecordingListener {
        events_seen: AtomicUsize,
    }

    #[async_trait]
    impl EventListener for RecordingListener {
        async fn handle(&self, _event: &BusEvent) {
            self.events_seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn command_dispatch_drains_enqueued_events() {
        let bus = Bus::new();
        let handler = Arc::new(RecordingHandler { calls: AtomicUsize::new(0) });
        let listener = Arc::new(RecordingListener { events_seen: AtomicUsize::new(0) });
        bus.register_command_handler(handler.clone());
        bus.register_listener(listener.clone());

        bus.dispatch_command(ExecuteChecks { checks: vec![] }).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(listener.events_seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_command_errors_without_panicking() {
        let bus = Bus::new();
        let result = bus.dispatch_command(ExecuteChecks { checks: vec![] }).await;
        assert!(matches!(result, Err(BusError::UnknownCommand)));
    }

    #[test]
    fn failed_transition_detected_only_on_entry() {
        assert!(transitioned_into_failed(Some(DerivedCheckStatus::Passed), DerivedCheckStatus::Failed));
        assert!(transitioned_into_failed(None, DerivedCheckStatus::Failed));
        assert!(!transitioned_into_failed(Some(DerivedCheckStatus::Failed), DerivedCheckStatus::Failed));
        assert!(!transitioned_into_failed(Some(DerivedCheckStatus::Passed), DerivedCheckStatus::Passed));
    }
}
