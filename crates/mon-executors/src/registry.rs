//! Executor registry: kind name → factory. The seam for adding a new check
//! kind; no caller should ever `match` on `Check.kind` directly.

use crate::dns::DnsExecutor;
use crate::error::{ExecutorError, Result};
use crate::executor::Executor;
use crate::http::{HttpExecutor, JsonHttpExecutor, JsonMetricsExecutor};
use crate::imap::ImapExecutor;
use crate::resources::SharedResources;
use crate::smtp::SmtpExecutor;
use crate::ssh::CustomSshJsonExecutor;
use crate::tcp::TcpExecutor;
use mon_common::Check;
use std::collections::HashMap;
use std::sync::Arc;

pub trait ExecutorFactory: Send + Sync {
    fn create(&self, resources: &SharedResources) -> Arc<dyn Executor>;
    /// Whether this kind needs a shared pooled HTTP client for the batch.
    fn needs_http(&self) -> bool {
        false
    }
    /// Whether this kind needs a shared DNS resolver for the batch.
    fn needs_dns(&self) -> bool {
        false
    }
}

struct HttpFactory;
impl ExecutorFactory for HttpFactory {
    fn create(&self, resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(HttpExecutor::new(resources.http_client()))
    }
    fn needs_http(&self) -> bool {
        true
    }
}

struct JsonHttpFactory;
impl ExecutorFactory for JsonHttpFactory {
    fn create(&self, resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(JsonHttpExecutor::new(resources.http_client()))
    }
    fn needs_http(&self) -> bool {
        true
    }
}

struct JsonMetricsFactory;
impl ExecutorFactory for JsonMetricsFactory {
    fn create(&self, resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(JsonMetricsExecutor::new(resources.http_client()))
    }
    fn needs_http(&self) -> bool {
        true
    }
}

struct DnsFactory;
impl ExecutorFactory for DnsFactory {
    fn create(&self, resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(DnsExecutor::new(resources.resolver()))
    }
    fn needs_dns(&self) -> bool {
        true
    }
}

struct TcpFactory;
impl ExecutorFactory for TcpFactory {
    fn create(&self, _resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(TcpExecutor::new())
    }
}

struct SmtpFactory;
impl ExecutorFactory for SmtpFactory {
    fn create(&self, _resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(SmtpExecutor::new())
    }
}

struct ImapFactory;
impl ExecutorFactory for ImapFactory {
    fn create(&self, _resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(ImapExecutor::new())
    }
}

struct SshFactory;
impl ExecutorFactory for SshFactory {
    fn create(&self, _resources: &SharedResources) -> Arc<dyn Executor> {
        Arc::new(CustomSshJsonExecutor::new())
    }
}

pub struct ExecutorRegistry {
    factories: HashMap<&'static str, Box<dyn ExecutorFactory>>,
}

impl ExecutorRegistry {
    pub fn with_defaults() -> Self {
        let mut factories: HashMap<&'static str, Box<dyn ExecutorFactory>> = HashMap::new();
        factories.insert("http", Box::new(HttpFactory));
        factories.insert("json-http", Box::new(JsonHttpFactory));
        factories.insert("json-metrics", Box::new(JsonMetricsFactory));
        factories.insert("dns", Box::new(DnsFactory));
        factories.insert("tcp", Box::new(TcpFactory));
        factories.insert("smtp", Box::new(SmtpFactory));
        factories.insert("imap", Box::new(ImapFactory));
        factories.insert("custom-ssh-json", Box::new(SshFactory));
        Self { factories }
    }

    /// Overrides or adds a factory for a kind. Exposed mainly so callers can
    /// substitute a fake executor in tests without spinning up the real one.
    pub fn register(&mut self, kind: &'static str, factory: Box<dyn ExecutorFactory>) {
        self.factories.insert(kind, factory);
    }

    pub fn get(&self, kind: &str) -> Result<&dyn ExecutorFactory> {
        self.factories
            .get(kind)
            .map(|f| f.as_ref())
            .ok_or_else(|| ExecutorError::UnknownKind(kind.to_string()))
    }

    /// Determine which shared resources a batch needs, without instantiating
    /// per-check executors yet.
    pub fn resources_for_batch(&self, checks: &[Check]) -> SharedResources {
        let mut builder = SharedResources::builder();
        for check in checks {
            if let Ok(factory) = self.get(check.kind.as_str()) {
                if factory.needs_http() {
                    builder = builder.need_http();
                }
                if factory.needs_dns() {
                    builder = builder.need_dns();
                }
            }
        }
        builder.build()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
