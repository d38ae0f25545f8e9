//! Persistent-store trait. One implementation lives behind SQLite
//! ([`crate::sqlite::SqliteStore`]); an in-memory implementation
//! ([`crate::memory::MemoryStore`]) backs unit tests for every other crate.

use crate::error::Result;
use async_trait::async_trait;
use mon_common::{Check, CheckResult, Service};

/// Persistence boundary for checks, results, and services.
///
/// `list_due` is the sole critical section in the whole agent: it must
/// atomically select due checks and mark them `processing` so no two
/// concurrent callers (or two overlapping scheduler ticks) ever return the
/// same check.
#[async_trait]
pub trait Store: Send + Sync {
    /// Select up to `limit` due, non-disabled, non-processing checks and
    /// atomically transition them to `processing`. Ties break on ascending
    /// `next_check_time`, then `check_id`.
    async fn list_due(&self, now: i64, limit: u32) -> Result<Vec<Check>>;

    /// Append an immutable result row.
    async fn add_result(&self, result: &CheckResult) -> Result<()>;

    /// Advance a check's schedule and return it to `idle`. Expected to be
    /// called in the same logical unit as the corresponding `add_result`.
    async fn update_check_after_execution(&self, check_id: &str, next_check_time: i64) -> Result<()>;

    /// Convenience wrapper used by handlers: insert the result and advance
    /// the check's schedule as one logical step.
    async fn record_execution(
        &self,
        result: &CheckResult,
        next_check_time: i64,
    ) -> Result<()> {
        self.add_result(result).await?;
        self.update_check_after_execution(&result.check_id, next_check_time)
            .await
    }

    /// Most recent `limit` results for a check, newest first.
    async fn recent_results(&self, check_id: &str, limit: u32) -> Result<Vec<CheckResult>>;

    /// Delete results older than `cutoff`, at most `batch_limit` rows, never
    /// deleting the single newest result of any check. Returns rows deleted.
    async fn delete_results_older_than(&self, cutoff: i64, batch_limit: u32) -> Result<u64>;

    async fn get_check(&self, check_id: &str) -> Result<Option<Check>>;
    async fn list_checks(&self) -> Result<Vec<Check>>;
    async fn upsert_check(&self, check: &Check) -> Result<()>;
    async fn delete_check(&self, check_id: &str) -> Result<()>;

    async fn get_service(&self, service_id: &str) -> Result<Option<Service>>;
    async fn list_services(&self) -> Result<Vec<Service>>;
    async fn upsert_service(&self, service: &Service) -> Result<()>;

    /// Run once at startup: reset every `processing` check back to `idle`.
    /// This is the sole source of crash-safety for in-flight executions —
    /// no in-memory lock is ever relied on across a restart.
    async fn reconcile_startup(&self) -> Result<u64>;

    /// Create tables/indexes if they don't exist.
    async fn init_schema(&self) -> Result<()>;
}
