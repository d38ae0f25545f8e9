//! SQLite-backed [`Store`] implementation. Single connection pool, hand
//! written SQL, status persisted as its string discriminant rather than an
//! ORM-mapped enum.

use crate::error::{Result, StoreError};
use crate::repository::Store;
use async_trait::async_trait;
use mon_common::{Check, CheckKind, CheckResult, CheckRowStatus, ResultStatus, Service};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn build_in_clause(count: usize) -> String {
        let placeholders: Vec<&str> = (0..count).map(|_| "?").collect();
        placeholders.join(", ")
    }

    fn parse_check_row(row: &sqlx::sqlite::SqliteRow) -> Result<Check> {
        let kind_str: String = row.get("kind");
        let status_str: String = row.get("status");
        let data_str: String = row.get("data");

        Ok(Check {
            check_id: row.get("check_id"),
            service_id: row.get("service_id"),
            name: row.get("name"),
            kind: CheckKind::from_str(&kind_str)
                .map_err(StoreError::InvalidRow)?,
            target: row.get("target"),
            interval_seconds: row.get("interval_seconds"),
            disabled: row.get::<i64, _>("disabled") != 0,
            data: serde_json::from_str(&data_str)?,
            status: CheckRowStatus::from_str(&status_str)
                .map_err(StoreError::InvalidRow)?,
            next_check_time: row.get("next_check_time"),
            created_at: row.get("created_at"),
        })
    }

    fn parse_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<CheckResult> {
        let status_str: String = row.get("status");
        let payload_str: String = row.get("payload");

        Ok(CheckResult {
            result_id: row.get("result_id"),
            check_id: row.get("check_id"),
            status: ResultStatus::from_str(&status_str)
                .map_err(StoreError::InvalidRow)?,
            payload: serde_json::from_str(&payload_str)?,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_due(&self, now: i64, limit: u32) -> Result<Vec<Check>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT check_id, service_id, name, kind, target, interval_seconds, disabled, data, status, next_check_time, created_at \
             FROM checks \
             WHERE disabled = 0 AND status != 'processing' AND next_check_time <= ? \
             ORDER BY next_check_time ASC, check_id ASC LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let mut checks = Vec::with_capacity(rows.len());
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let check = Self::parse_check_row(row)?;
            ids.push(check.check_id.clone());
            checks.push(check);
        }

        let in_clause = Self::build_in_clause(ids.len());
        let query = format!("UPDATE checks SET status = 'processing' WHERE check_id IN ({in_clause})");
        let mut q = sqlx::query(&query);
        for id in &ids {
            q = q.bind(id);
        }
        q.execute(&mut *tx).await?;

        tx.commit().await?;

        for check in &mut checks {
            check.status = CheckRowStatus::Processing;
        }

        debug!(count = checks.len(), "selected due checks");
        Ok(checks)
    }

    async fn add_result(&self, result: &CheckResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO result (result_id, check_id, status, payload, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&result.result_id)
        .bind(&result.check_id)
        .bind(result.status.as_str())
        .bind(serde_json::to_string(&result.payload)?)
        .bind(result.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_check_after_execution(&self, check_id: &str, next_check_time: i64) -> Result<()> {
        sqlx::query("UPDATE checks SET status = 'idle', next_check_time = ? WHERE check_id = ?")
            .bind(next_check_time)
            .bind(check_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_execution(&self, result: &CheckResult, next_check_time: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO result (result_id, check_id, status, payload, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&result.result_id)
        .bind(&result.check_id)
        .bind(result.status.as_str())
        .bind(serde_json::to_string(&result.payload)?)
        .bind(result.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE checks SET status = 'idle', next_check_time = ? WHERE check_id = ?")
            .bind(next_check_time)
            .bind(&result.check_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn recent_results(&self, check_id: &str, limit: u32) -> Result<Vec<CheckResult>> {
        let rows = sqlx::query(
            "SELECT result_id, check_id, status, payload, created_at FROM result \
             WHERE check_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(check_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_result_row).collect()
    }

    async fn delete_results_older_than(&self, cutoff: i64, batch_limit: u32) -> Result<u64> {
        let rows = sqlx::query(
            "SELECT result_id FROM result r \
             WHERE created_at < ? \
             AND result_id != ( \
                 SELECT result_id FROM result r2 \
                 WHERE r2.check_id = r.check_id \
                 ORDER BY created_at DESC, result_id DESC LIMIT 1 \
             ) \
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(cutoff)
        .bind(batch_limit)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = rows.iter().map(|r| r.get("result_id")).collect();
        let in_clause = Self::build_in_clause(ids.len());
        let query = format!("DELETE FROM result WHERE result_id IN ({in_clause})");
        let mut q = sqlx::query(&query);
        for id in &ids {
            q = q.bind(id);
        }
        q.execute(&self.pool).await?;

        debug!(count = ids.len(), "deleted expired results");
        Ok(ids.len() as u64)
    }

    async fn get_check(&self, check_id: &str) -> Result<Option<Check>> {
        let row = sqlx::query(
            "SELECT check_id, service_id, name, kind, target, interval_seconds, disabled, data, status, next_check_time, created_at \
             FROM checks WHERE check_id = ?",
        )
        .bind(check_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_check_row).transpose()
    }

    async fn list_checks(&self) -> Result<Vec<Check>> {
        let rows = sqlx::query(
            "SELECT check_id, service_id, name, kind, target, interval_seconds, disabled, data, status, next_check_time, created_at \
             FROM checks ORDER BY check_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_check_row).collect()
    }

    async fn upsert_check(&self, check: &Check) -> Result<()> {
        sqlx::query(
            "INSERT INTO checks (check_id, service_id, name, kind, target, interval_seconds, disabled, data, status, next_check_time, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(check_id) DO UPDATE SET \
               service_id = excluded.service_id, name = excluded.name, kind = excluded.kind, \
               target = excluded.target, interval_seconds = excluded.interval_seconds, \
               disabled = excluded.disabled, data = excluded.data",
        )
        .bind(&check.check_id)
        .bind(&check.service_id)
        .bind(&check.name)
        .bind(check.kind.as_str())
        .bind(&check.target)
        .bind(check.interval_seconds)
        .bind(check.disabled as i64)
        .bind(serde_json::to_string(&check.data)?)
        .bind(check.status.as_str())
        .bind(check.next_check_time)
        .bind(check.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_check(&self, check_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM result WHERE check_id = ?")
            .bind(check_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checks WHERE check_id = ?")
            .bind(check_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_service(&self, service_id: &str) -> Result<Option<Service>> {
        let row = sqlx::query("SELECT service_id, name FROM service WHERE service_id = ?")
            .bind(service_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Service {
            service_id: r.get("service_id"),
            name: r.get("name"),
        }))
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        let rows = sqlx::query("SELECT service_id, name FROM service ORDER BY service_id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| Service {
                service_id: r.get("service_id"),
                name: r.get("name"),
            })
            .collect())
    }

    async fn upsert_service(&self, service: &Service) -> Result<()> {
        sqlx::query(
            "INSERT INTO service (service_id, name) VALUES (?, ?) \
             ON CONFLICT(service_id) DO UPDATE SET name = excluded.name",
        )
        .bind(&service.service_id)
        .bind(&service.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reconcile_startup(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE checks SET status = 'idle' WHERE status = 'processing'")
            .execute(&self.pool)
            .await?;

        let reconciled = result.rows_affected();
        if reconciled > 0 {
            info!(count = reconciled, "reconciled checks stuck in processing at startup");
        }
        Ok(reconciled)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS service (
                service_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checks (
                check_id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                target TEXT NOT NULL,
                interval_seconds INTEGER NOT NULL,
                disabled INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'idle',
                next_check_time INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_check_due ON checks(disabled, status, next_check_time)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS result (
                result_id TEXT PRIMARY KEY,
                check_id TEXT NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_result_check_created ON result(check_id, created_at DESC)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_result_created ON result(created_at)")
            .execute(&self.pool)
            .await?;

        info!("initialized sqlite store schema");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mon_common::CheckKind;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        let store = SqliteStore::new(pool);
        store.init_schema().await.expect("init schema");
        store
    }

    fn sample_check(id: &str, next_check_time: i64) -> Check {
        Check {
            check_id: id.to_string(),
            service_id: "svc1".to_string(),
            name: "probe".to_string(),
            kind: CheckKind::Http,
            target: "http://example.test".to_string(),
            interval_seconds: 60,
            disabled: false,
            data: serde_json::json!({}),
            status: CheckRowStatus::Idle,
            next_check_time,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn list_due_selects_and_claims() {
        let store = test_store().await;
        store.upsert_check(&sample_check("c1", 100)).await.unwrap();
        store.upsert_check(&sample_check("c2", 200)).await.unwrap();

        let due = store.list_due(150, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].check_id, "c1");
        assert_eq!(due[0].status, CheckRowStatus::Processing);

        let due_again = store.list_due(150, 10).await.unwrap();
        assert!(due_again.is_empty(), "processing check must not be reselected");
    }

    #[tokio::test]
    async fn disabled_checks_are_never_due() {
        let store = test_store().await;
        let mut check = sample_check("c1", 0);
        check.disabled = true;
        store.upsert_check(&check).await.unwrap();

        let due = store.list_due(1000, 10).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn record_execution_advances_schedule_and_inserts_result() {
        let store = test_store().await;
        store.upsert_check(&sample_check("c1", 0)).await.unwrap();
        store.list_due(1000, 10).await.unwrap();

        let result = CheckResult {
            result_id: "r1".to_string(),
            check_id: "c1".to_string(),
            status: ResultStatus::Ok,
            payload: serde_json::json!({}),
            created_at: 1000,
        };
        store.record_execution(&result, 1060).await.unwrap();

        let check = store.get_check("c1").await.unwrap().unwrap();
        assert_eq!(check.status, CheckRowStatus::Idle);
        assert_eq!(check.next_check_time, 1060);

        let recent = store.recent_results("c1", 5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].result_id, "r1");
    }

    #[tokio::test]
    async fn cleaner_never_deletes_the_newest_result() {
        let store = test_store().await;
        store.upsert_check(&sample_check("c1", 0)).await.unwrap();

        for i in 0..5 {
            let result = CheckResult {
                result_id: format!("r{i}"),
                check_id: "c1".to_string(),
                status: ResultStatus::Ok,
                payload: serde_json::json!({}),
                created_at: i,
            };
            store.add_result(&result).await.unwrap();
        }

        let deleted = store.delete_results_older_than(100, 1000).await.unwrap();
        assert_eq!(deleted, 4, "newest result (r4) must survive");

        let remaining = store.recent_results("c1", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].result_id, "r4");
    }

    #[tokio::test]
    async fn reconcile_startup_resets_processing_checks() {
        let store = test_store().await;
        let mut check = sample_check("c1", 0);
        check.status = CheckRowStatus::Processing;
        store.upsert_check(&check).await.unwrap();

        let reconciled = store.reconcile_startup().await.unwrap();
        assert_eq!(reconciled, 1);

        let check = store.get_check("c1").await.unwrap().unwrap();
        assert_eq!(check.status, CheckRowStatus::Idle);
    }
}
