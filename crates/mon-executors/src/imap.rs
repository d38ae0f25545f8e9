//! `imap` executor: verify a recent probe message has arrived in a mailbox,
//! the receiving half of the round-trip that the `smtp` executor's probe
//! message starts. No teacher or pack example performs IMAP; this executor
//! and its `async-imap` dependency are a deliberate addition, documented in
//! DESIGN.md.

use crate::executor::{Executor, Outcome};
use async_imap::types::Fetch;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use mon_common::Check;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::{rustls, TlsConnector};

fn default_timeout_secs() -> u64 {
    10
}

fn default_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_max_age_minutes() -> i64 {
    30
}

fn default_retry_delay_secs() -> u64 {
    1
}

fn is_transient_error_type(error_type: &str) -> bool {
    matches!(error_type, "connection_error" | "timeout")
}

#[derive(Debug, Deserialize)]
struct ImapCheckData {
    #[serde(default = "default_port")]
    port: u16,
    username: String,
    password: String,
    #[serde(default = "default_folder")]
    folder: String,
    search_subject: String,
    #[serde(default = "default_max_age_minutes")]
    max_age_minutes: i64,
    #[serde(default)]
    delete_after_check: bool,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
}

/// Quote a search string per the IMAP `SEARCH` quoted-string grammar: escape
/// backslash and double-quote, wrap in double quotes.
fn quote_search_term(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

pub struct ImapExecutor {
    tls_config: std::sync::Arc<rustls::ClientConfig>,
}

impl ImapExecutor {
    pub fn new() -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Self {
            tls_config: std::sync::Arc::new(config),
        }
    }
}

impl Default for ImapExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for ImapExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: ImapCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let outcome = match tokio::time::timeout(Duration::from_secs(data.timeout_secs), self.run(check, &data)).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::error("timeout", "imap check timed out", serde_json::json!({})),
            };

            if outcome.status == mon_common::ResultStatus::Error
                && is_transient_error_type(outcome.payload["error_type"].as_str().unwrap_or(""))
                && attempts <= data.retries
            {
                tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                continue;
            }

            return outcome;
        }
    }
}

impl ImapExecutor {
    async fn run(&self, check: &Check, data: &ImapCheckData) -> Outcome {
        let addr = format!("{}:{}", check.target, data.port);
        let tcp = match TcpStream::connect(&addr).await {
            Ok(s) => s,
            Err(e) => return Outcome::error("connection_error", e.to_string(), serde_json::json!({})),
        };

        let server_name = match rustls::pki_types::ServerName::try_from(check.target.clone()) {
            Ok(n) => n,
            Err(e) => return Outcome::error("tls_handshake_error", e.to_string(), serde_json::json!({})),
        };
        let connector = TlsConnector::from(self.tls_config.clone());
        let tls = match connector.connect(server_name, tcp).await {
            Ok(s) => s,
            Err(e) => return Outcome::error("tls_handshake_error", e.to_string(), serde_json::json!({})),
        };

        let client = async_imap::Client::new(tls);
        let mut session = match client.login(&data.username, &data.password).await {
            Ok(s) => s,
            Err((e, _)) => return Outcome::error("auth_error", e.to_string(), serde_json::json!({})),
        };

        if let Err(e) = session.select(&data.folder).await {
            return Outcome::error("mailbox_error", e.to_string(), serde_json::json!({}));
        }

        let query = format!("UNDELETED SUBJECT {}", quote_search_term(&data.search_subject));
        let uids = match session.uid_search(&query).await {
            Ok(set) => set,
            Err(e) => return Outcome::error("search_error", e.to_string(), serde_json::json!({})),
        };

        if uids.is_empty() {
            let _ = session.logout().await;
            return Outcome::error("no_recent_message", "no matching message found", serde_json::json!({}));
        }

        let uid_set = uids.iter().map(|u| u.to_string()).collect::<Vec<_>>().join(",");
        let cutoff = Utc::now() - chrono::Duration::minutes(data.max_age_minutes);

        let mut matched_uids = Vec::new();
        let mut latest_internaldate = None;

        {
            let mut stream = match session.uid_fetch(&uid_set, "INTERNALDATE").await {
                Ok(s) => s,
                Err(e) => return Outcome::error("search_error", e.to_string(), serde_json::json!({})),
            };

            while let Some(fetch) = stream.next().await {
                let fetch: Fetch = match fetch {
                    Ok(f) => f,
                    Err(_) => continue,
                };
                if let Some(internal_date) = fetch.internal_date() {
                    let internal_date: chrono::DateTime<Utc> = internal_date.with_timezone(&Utc);
                    if internal_date >= cutoff {
                        if let Some(uid) = fetch.uid {
                            matched_uids.push(uid);
                        }
                        latest_internaldate = Some(latest_internaldate.map_or(internal_date, |d: chrono::DateTime<Utc>| d.max(internal_date)));
                    }
                }
            }
        }

        if matched_uids.is_empty() {
            let _ = session.logout().await;
            return Outcome::error(
                "no_recent_message",
                format!("no message newer than {} minutes", data.max_age_minutes),
                serde_json::json!({}),
            );
        }

        if data.delete_after_check {
            let delete_set = matched_uids.iter().map(|u| u.to_string()).collect::<Vec<_>>().join(",");
            if let Err(e) = session.uid_store(&delete_set, "+FLAGS (\\Deleted)").await {
                return Outcome::error("mailbox_error", e.to_string(), serde_json::json!({}));
            }
            if let Err(e) = session.expunge().await {
                return Outcome::error("mailbox_error", e.to_string(), serde_json::json!({}));
            }
        }

        let _ = session.logout().await;

        Outcome::ok(serde_json::json!({
            "matched_uids": matched_uids,
            "latest_internaldate": latest_internaldate.map(|d| d.to_rfc3339()),
        }))
    }
}
