//! `http`, `json-http`, and `json-metrics` executors. All three share one
//! pooled [`reqwest::Client`] per batch and the same retry-with-backoff loop;
//! `json-http`/`json-metrics` additionally run the document through the
//! threshold rule engine.

use crate::executor::{Executor, Outcome};
use crate::threshold::{self, ThresholdRule};
use async_trait::async_trait;
use mon_common::Check;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_delay_secs() -> u64 {
    1
}

fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 429
}

#[derive(Debug, Deserialize)]
struct HttpCheckData {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    expected_status: Option<u16>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: HttpCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let started = Instant::now();

            let mut builder = self
                .client
                .get(&check.target)
                .timeout(Duration::from_secs(data.timeout_secs));
            for (key, value) in &data.headers {
                builder = builder.header(key, value);
            }

            let outcome = match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let matches_expected = match data.expected_status {
                        Some(expected) => status == expected,
                        None => status < 400,
                    };

                    if matches_expected {
                        Ok(Outcome::ok(serde_json::json!({
                            "status_code": status,
                            "latency_ms": latency_ms,
                            "attempts": attempts,
                        })))
                    } else {
                        Err((
                            is_transient_status(status),
                            Outcome::error(
                                "http_status",
                                format!("unexpected status {status}"),
                                serde_json::json!({"status_code": status, "attempts": attempts}),
                            ),
                        ))
                    }
                }
                Err(e) if e.is_timeout() => Err((
                    true,
                    Outcome::error("timeout", e.to_string(), serde_json::json!({"attempts": attempts})),
                )),
                Err(e) => Err((
                    true,
                    Outcome::error("request_error", e.to_string(), serde_json::json!({"attempts": attempts})),
                )),
            };

            match outcome {
                Ok(ok) => return ok,
                Err((transient, failure)) => {
                    if transient && attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return failure;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BasicAuth {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct JsonHttpCheckData {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    #[serde(default)]
    headers: HashMap<String, String>,
    basic_auth: Option<BasicAuth>,
    #[serde(default)]
    rules: Vec<ThresholdRule>,
}

pub struct JsonHttpExecutor {
    client: Client,
}

impl JsonHttpExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for JsonHttpExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: JsonHttpCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let mut builder = self
                .client
                .get(&check.target)
                .timeout(Duration::from_secs(data.timeout_secs));
            for (key, value) in &data.headers {
                builder = builder.header(key, value);
            }
            if let Some(auth) = &data.basic_auth {
                builder = builder.basic_auth(&auth.username, Some(&auth.password));
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<serde_json::Value>().await {
                        Ok(document) => {
                            let failures = threshold::evaluate(&document, &data.rules);
                            let critical: Vec<_> = failures
                                .iter()
                                .filter(|f| matches!(f.severity, crate::threshold::Severity::Critical))
                                .collect();

                            if critical.is_empty() {
                                let warnings: Vec<_> = failures
                                    .iter()
                                    .map(|f| serde_json::json!({"path": f.path, "actual": f.actual}))
                                    .collect();
                                return Outcome::ok(serde_json::json!({
                                    "attempts": attempts,
                                    "warnings": warnings,
                                }));
                            }

                            let details: Vec<_> = critical
                                .iter()
                                .map(|f| serde_json::json!({"path": f.path, "expected": f.expected, "actual": f.actual}))
                                .collect();
                            return Outcome::error(
                                "threshold_failed",
                                "one or more critical threshold rules failed",
                                serde_json::json!({"attempts": attempts, "failures": details}),
                            );
                        }
                        Err(e) => return Outcome::error("json_error", e.to_string(), serde_json::json!({"attempts": attempts})),
                    }
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    if is_transient_status(status) && attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error(
                        "http_status",
                        format!("unexpected status {status}"),
                        serde_json::json!({"status_code": status, "attempts": attempts}),
                    );
                }
                Err(e) if e.is_timeout() => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("timeout", e.to_string(), serde_json::json!({"attempts": attempts}));
                }
                Err(e) => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("request_error", e.to_string(), serde_json::json!({"attempts": attempts}));
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonMetricsCheckData {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    #[serde(default)]
    rules: Vec<ThresholdRule>,
}

/// `json-metrics` is `json-http` without auth, modeling an unauthenticated
/// metrics document rather than a general HTTP+JSON health surface.
pub struct JsonMetricsExecutor {
    client: Client,
}

impl JsonMetricsExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for JsonMetricsExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: JsonMetricsCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        if data.rules.is_empty() {
            return Outcome::error(
                "configuration_error",
                "json-metrics check requires at least one threshold rule",
                serde_json::json!({}),
            );
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let response = match self
                .client
                .get(&check.target)
                .timeout(Duration::from_secs(data.timeout_secs))
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("timeout", e.to_string(), serde_json::json!({"attempts": attempts}));
                }
                Err(e) => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("request_error", e.to_string(), serde_json::json!({"attempts": attempts}));
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                if is_transient_status(status) && attempts <= data.retries {
                    tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                    continue;
                }
                return Outcome::error(
                    "http_status",
                    format!("unexpected status {status}"),
                    serde_json::json!({"status_code": status, "attempts": attempts}),
                );
            }

            let document = match response.json::<serde_json::Value>().await {
                Ok(d) => d,
                Err(e) => return Outcome::error("json_error", e.to_string(), serde_json::json!({"attempts": attempts})),
            };

            let failures = threshold::evaluate(&document, &data.rules);
            let critical: Vec<_> = failures
                .iter()
                .filter(|f| matches!(f.severity, crate::threshold::Severity::Critical))
                .collect();

            return if critical.is_empty() {
                Outcome::ok(serde_json::json!({"attempts": attempts}))
            } else {
                let details: Vec<_> = critical
                    .iter()
                    .map(|f| serde_json::json!({"path": f.path, "expected": f.expected, "actual": f.actual}))
                    .collect();
                Outcome::error(
                    "threshold_failed",
                    "one or more critical threshold rules failed",
                    serde_json::json!({"attempts": attempts, "failures": details}),
                )
            };
        }
    }
}
