//! `tcp` executor: connect to `host:port`, optionally negotiate TLS (implicit
//! or via a STARTTLS-style plaintext upgrade command), and optionally check
//! certificate expiry.

use crate::executor::{Executor, Outcome};
use async_trait::async_trait;
use mon_common::Check;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::{rustls, TlsConnector};

fn default_timeout_secs() -> u64 {
    5
}

fn default_min_cert_days() -> i64 {
    14
}

fn default_retry_delay_secs() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct TcpCheckData {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    #[serde(default)]
    tls: bool,
    starttls_command: Option<String>,
    #[serde(default)]
    check_cert_expiry: bool,
    #[serde(default = "default_min_cert_days")]
    min_cert_days: i64,
}

pub struct TcpExecutor {
    tls_config: Arc<rustls::ClientConfig>,
}

impl TcpExecutor {
    pub fn new() -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Self {
            tls_config: Arc::new(config),
        }
    }
}

impl Default for TcpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_target(target: &str) -> Result<(&str, &str), String> {
    target
        .rsplit_once(':')
        .ok_or_else(|| format!("target must be host:port, got {target}"))
}

#[async_trait]
impl Executor for TcpExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: TcpCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        let target = check.target.trim_start_matches("tcp://");
        let (host, _port) = match parse_target(target) {
            Ok(hp) => hp,
            Err(e) => return Outcome::error("configuration_error", e, serde_json::json!({})),
        };

        let mut attempts = 0u32;
        let stream = loop {
            attempts += 1;
            let connect = TcpStream::connect(target);
            match tokio::time::timeout(Duration::from_secs(data.timeout_secs), connect).await {
                Ok(Ok(s)) => break s,
                Ok(Err(e)) => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("connection_error", e.to_string(), serde_json::json!({"attempts": attempts}));
                }
                Err(_) => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("timeout", "connection timed out", serde_json::json!({"attempts": attempts}));
                }
            }
        };

        if !data.tls {
            return Outcome::ok(serde_json::json!({"connected": true}));
        }

        let mut plain = stream;
        if let Some(cmd) = &data.starttls_command {
            if let Err(e) = plain.write_all(cmd.as_bytes()).await {
                return Outcome::error("connection_error", e.to_string(), serde_json::json!({}));
            }
            let mut buf = [0u8; 512];
            if let Err(e) = plain.read(&mut buf).await {
                return Outcome::error("connection_error", e.to_string(), serde_json::json!({}));
            }
        }

        let connector = TlsConnector::from(self.tls_config.clone());
        let server_name = match rustls::pki_types::ServerName::try_from(host.to_string()) {
            Ok(name) => name,
            Err(e) => return Outcome::error("tls_handshake_error", e.to_string(), serde_json::json!({})),
        };

        let tls_stream = match tokio::time::timeout(
            Duration::from_secs(data.timeout_secs),
            connector.connect(server_name, plain),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Outcome::error("tls_handshake_error", e.to_string(), serde_json::json!({})),
            Err(_) => return Outcome::error("timeout", "tls handshake timed out", serde_json::json!({})),
        };

        if !data.check_cert_expiry {
            return Outcome::ok(serde_json::json!({"connected": true, "tls": true}));
        }

        let (_, session) = tls_stream.get_ref();
        let Some(certs) = session.peer_certificates() else {
            return Outcome::error("tls_handshake_error", "no peer certificate presented", serde_json::json!({}));
        };
        let Some(leaf) = certs.first() else {
            return Outcome::error("tls_handshake_error", "empty certificate chain", serde_json::json!({}));
        };

        match x509_parser::parse_x509_certificate(leaf.as_ref()) {
            Ok((_, cert)) => {
                let not_after = cert.validity().not_after.timestamp();
                let now = chrono::Utc::now().timestamp();
                let remaining_days = (not_after - now) / 86_400;

                if remaining_days < data.min_cert_days {
                    Outcome {
                        status: mon_common::ResultStatus::Ok,
                        payload: serde_json::json!({
                            "connected": true,
                            "tls": true,
                            "error_type": "cert_expiry",
                            "remaining_days": remaining_days,
                            "severity": "warning",
                        }),
                    }
                } else {
                    Outcome::ok(serde_json::json!({"connected": true, "tls": true, "remaining_days": remaining_days}))
                }
            }
            Err(e) => Outcome::error("tls_handshake_error", e.to_string(), serde_json::json!({})),
        }
    }
}
