//! In-memory [`Store`] used as a test double across every crate that depends
//! on persistence without wanting to spin up SQLite.

use crate::error::Result;
use crate::repository::Store;
use async_trait::async_trait;
use mon_common::{Check, CheckResult, CheckRowStatus, Service};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    checks: Mutex<HashMap<String, Check>>,
    results: Mutex<Vec<CheckResult>>,
    services: Mutex<HashMap<String, Service>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_due(&self, now: i64, limit: u32) -> Result<Vec<Check>> {
        let mut checks = self.checks.lock().unwrap();
        let mut due: Vec<_> = checks
            .values()
            .filter(|c| !c.disabled && c.status != CheckRowStatus::Processing && c.next_check_time <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_check_time.cmp(&b.next_check_time).then(a.check_id.cmp(&b.check_id)));
        due.truncate(limit as usize);

        for check in &due {
            if let Some(c) = checks.get_mut(&check.check_id) {
                c.status = CheckRowStatus::Processing;
            }
        }

        Ok(due
            .into_iter()
            .map(|mut c| {
                c.status = CheckRowStatus::Processing;
                c
            })
            .collect())
    }

    async fn add_result(&self, result: &CheckResult) -> Result<()> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn update_check_after_execution(&self, check_id: &str, next_check_time: i64) -> Result<()> {
        if let Some(c) = self.checks.lock().unwrap().get_mut(check_id) {
            c.status = CheckRowStatus::Idle;
            c.next_check_time = next_check_time;
        }
        Ok(())
    }

    async fn recent_results(&self, check_id: &str, limit: u32) -> Result<Vec<CheckResult>> {
        let results = self.results.lock().unwrap();
        let mut matching: Vec<_> = results.iter().filter(|r| r.check_id == check_id).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn delete_results_older_than(&self, cutoff: i64, batch_limit: u32) -> Result<u64> {
        let mut results = self.results.lock().unwrap();

        let mut newest_by_check: HashMap<String, i64> = HashMap::new();
        for r in results.iter() {
            let entry = newest_by_check.entry(r.check_id.clone()).or_insert(i64::MIN);
            if r.created_at > *entry {
                *entry = r.created_at;
            }
        }

        let mut to_delete: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.created_at < cutoff && newest_by_check.get(&r.check_id) != Some(&r.created_at))
            .map(|(i, _)| i)
            .collect();
        to_delete.truncate(batch_limit as usize);

        let deleted = to_delete.len() as u64;
        for idx in to_delete.into_iter().rev() {
            results.remove(idx);
        }
        Ok(deleted)
    }

    async fn get_check(&self, check_id: &str) -> Result<Option<Check>> {
        Ok(self.checks.lock().unwrap().get(check_id).cloned())
    }

    async fn list_checks(&self) -> Result<Vec<Check>> {
        Ok(self.checks.lock().unwrap().values().cloned().collect())
    }

    async fn upsert_check(&self, check: &Check) -> Result<()> {
        self.checks.lock().unwrap().insert(check.check_id.clone(), check.clone());
        Ok(())
    }

    async fn delete_check(&self, check_id: &str) -> Result<()> {
        self.checks.lock().unwrap().remove(check_id);
        self.results.lock().unwrap().retain(|r| r.check_id != check_id);
        Ok(())
    }

    async fn get_service(&self, service_id: &str) -> Result<Option<Service>> {
        Ok(self.services.lock().unwrap().get(service_id).cloned())
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        Ok(self.services.lock().unwrap().values().cloned().collect())
    }

    async fn upsert_service(&self, service: &Service) -> Result<()> {
        self.services
            .lock()
            .unwrap()
            .insert(service.service_id.clone(), service.clone());
        Ok(())
    }

    async fn reconcile_startup(&self) -> Result<u64> {
        let mut checks = self.checks.lock().unwrap();
        let mut count = 0u64;
        for c in checks.values_mut() {
            if c.status == CheckRowStatus::Processing {
                c.status = CheckRowStatus::Idle;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }
}
