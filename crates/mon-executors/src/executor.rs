use async_trait::async_trait;
use mon_common::{Check, ResultStatus};
use serde_json::Value;

/// The raw outcome of one probe attempt, before the runner stamps it with a
/// result id and timestamp and hands it to the store.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: ResultStatus,
    pub payload: Value,
}

impl Outcome {
    pub fn ok(payload: Value) -> Self {
        Self {
            status: ResultStatus::Ok,
            payload,
        }
    }

    pub fn error(error_type: &str, error_msg: impl Into<String>, extra: Value) -> Self {
        let mut payload = serde_json::json!({
            "error_type": error_type,
            "error_msg": error_msg.into(),
        });
        if let (Value::Object(base), Value::Object(more)) = (&mut payload, extra) {
            base.extend(more);
        }
        Self {
            status: ResultStatus::Error,
            payload,
        }
    }
}

/// One probe implementation per [`mon_common::CheckKind`]. Every failure mode
/// — timeouts, connection errors, malformed configuration — is encoded as an
/// `Outcome` with `status = error`; executors never propagate a Rust error
/// across this boundary, and a panicking implementation is caught at the
/// runner's task-join boundary rather than poisoning the batch.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, check: &Check) -> Outcome;

    /// Releases any resources this executor instance holds (e.g. an open
    /// mailbox session). Called once per batch after the executor's last use.
    /// Most executors only hold cheaply-cloned shared handles and don't need
    /// to override this.
    async fn close(&self) {}
}
