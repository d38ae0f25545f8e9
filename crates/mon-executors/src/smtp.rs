//! `smtp` executor: send one probe message through the target relay and
//! report the correlation token used, so an external mailbox-reader can
//! confirm delivery independently.

use crate::executor::{Executor, Outcome};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mon_common::Check;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

fn default_timeout_secs() -> u64 {
    10
}

fn default_subject_prefix() -> String {
    "monitor-agent".to_string()
}

#[derive(Debug, Deserialize)]
struct SmtpCredentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SmtpCheckData {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    retry_delay_secs: u64,
    port: Option<u16>,
    from: String,
    to: String,
    #[serde(default = "default_subject_prefix")]
    subject_prefix: String,
    credentials: Option<SmtpCredentials>,
    #[serde(default)]
    implicit_tls: bool,
}

fn random_token() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    (0..6).map(|_| CHARS[rng.random_range(0..CHARS.len())] as char).collect()
}

pub struct SmtpExecutor;

impl SmtpExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SmtpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for SmtpExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: SmtpCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        let token = random_token();
        let subject = format!("{} {} {}", data.subject_prefix, chrono::Utc::now().to_rfc3339(), token);

        let message = match Message::builder()
            .from(match data.from.parse() {
                Ok(addr) => addr,
                Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
            })
            .to(match data.to.parse() {
                Ok(addr) => addr,
                Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
            })
            .subject(subject)
            .body(format!("monitoring probe token={token}"))
        {
            Ok(m) => m,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let mut builder = if data.implicit_tls {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&check.target)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&check.target)
            };

            builder = builder.map(|b| b.timeout(Some(Duration::from_secs(data.timeout_secs))));
            if let Some(port) = data.port {
                builder = builder.map(|b| b.port(port));
            }
            if let Some(creds) = &data.credentials {
                builder = builder.map(|b| b.credentials(Credentials::new(creds.username.clone(), creds.password.clone())));
            }

            let transport = match builder {
                Ok(b) => b.build(),
                Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
            };

            match transport.send(message.clone()).await {
                Ok(_) => {
                    return Outcome::ok(serde_json::json!({"attempts": attempts, "token": token}));
                }
                Err(e) => {
                    let transient = e.is_transient();
                    if transient && attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    let error_type = if e.is_timeout() {
                        "timeout"
                    } else if transient {
                        "transient_smtp_error"
                    } else {
                        "smtp_error"
                    };
                    return Outcome::error(error_type, e.to_string(), serde_json::json!({"attempts": attempts}));
                }
            }
        }
    }
}
