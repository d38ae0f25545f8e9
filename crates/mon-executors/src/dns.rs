//! `dns` executor: resolve a name via `hickory-resolver` (the maintained
//! successor to `trust-dns-resolver`) and check the resolved set against an
//! expected list.

use crate::executor::{Executor, Outcome};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use mon_common::Check;
use serde::Deserialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

fn default_timeout_secs() -> u64 {
    5
}

fn default_query_type() -> String {
    "A".to_string()
}

fn default_retry_delay_secs() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct DnsCheckData {
    #[serde(default = "default_query_type")]
    query_type: String,
    #[serde(default)]
    expected_ips: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    dns_server: Option<String>,
    source_ip: Option<String>,
}

pub struct DnsExecutor {
    default_resolver: TokioAsyncResolver,
}

impl DnsExecutor {
    pub fn new(default_resolver: TokioAsyncResolver) -> Self {
        Self { default_resolver }
    }

    fn resolver_for(&self, data: &DnsCheckData) -> Result<TokioAsyncResolver, String> {
        let Some(server) = &data.dns_server else {
            return Ok(self.default_resolver.clone());
        };

        let server_addr: std::net::IpAddr = server
            .parse()
            .map_err(|_| format!("invalid dns_server address: {server}"))?;
        let socket_addr = SocketAddr::new(server_addr, 53);

        let bind_addr = match &data.source_ip {
            Some(ip) => Some(
                SocketAddr::from_str(&format!("{ip}:0"))
                    .map_err(|_| format!("invalid source_ip address: {ip}"))?,
            ),
            None => None,
        };

        let mut name_server = NameServerConfig::new(socket_addr, Protocol::Udp);
        name_server.bind_addr = bind_addr;

        let mut config = ResolverConfig::new();
        config.add_name_server(name_server);

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(data.timeout_secs);

        Ok(TokioAsyncResolver::tokio(config, opts))
    }
}

#[async_trait]
impl Executor for DnsExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: DnsCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        let record_type = match RecordType::from_str(&data.query_type.to_ascii_uppercase()) {
            Ok(rt) => rt,
            Err(_) => {
                return Outcome::error(
                    "configuration_error",
                    format!("unsupported query_type: {}", data.query_type),
                    serde_json::json!({}),
                )
            }
        };

        if data.expected_ips.is_empty() {
            return Outcome::error(
                "configuration_error",
                "expected_ips must be non-empty",
                serde_json::json!({}),
            );
        }

        let resolver = match self.resolver_for(&data) {
            Ok(r) => r,
            Err(e) => return Outcome::error("source_bind_failed", e, serde_json::json!({})),
        };

        let mut attempts = 0u32;
        let resolved: Vec<String> = loop {
            attempts += 1;

            let lookup = tokio::time::timeout(
                Duration::from_secs(data.timeout_secs),
                resolver.lookup(check.target.trim_end_matches('.').to_string() + ".", record_type),
            )
            .await;

            match lookup {
                Ok(Ok(l)) => break l.iter().map(|r| r.to_string()).collect(),
                Ok(Err(e)) => {
                    if e.is_nx_domain() {
                        return Outcome::error("nxdomain", e.to_string(), serde_json::json!({"attempts": attempts}));
                    }
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("no_answer", e.to_string(), serde_json::json!({"attempts": attempts}));
                }
                Err(_) => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("timeout", "dns query timed out", serde_json::json!({"attempts": attempts}));
                }
            }
        };

        let matched = resolved.iter().any(|ip| data.expected_ips.contains(ip));
        if matched {
            Outcome::ok(serde_json::json!({
                "resolved_ips": resolved,
                "dns_server": data.dns_server,
                "source_address": data.source_ip,
                "attempts": attempts,
            }))
        } else {
            Outcome::error(
                "resolution_mismatch",
                format!("resolved {resolved:?}, expected one of {:?}", data.expected_ips),
                serde_json::json!({"resolved_ips": resolved, "attempts": attempts}),
            )
        }
    }
}
