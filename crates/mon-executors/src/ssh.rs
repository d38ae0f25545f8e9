//! `custom-ssh-json` executor: run a remote command over `ssh` and treat its
//! stdout as a JSON document subject to the same threshold rule engine as
//! `json-http`.

use crate::executor::{Executor, Outcome};
use crate::threshold::{self, ThresholdRule};
use async_trait::async_trait;
use mon_common::Check;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

fn default_timeout_secs() -> u64 {
    15
}

fn default_ssh_args() -> Vec<String> {
    vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ConnectTimeout=5".to_string(),
    ]
}

fn default_retry_delay_secs() -> u64 {
    1
}

/// `command` accepts either a single shell string or an argv list; an argv
/// list is shell-quoted and joined before being handed to the remote shell,
/// since `ssh` itself always takes one command string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    fn render(&self) -> String {
        match self {
            CommandSpec::Shell(s) => s.clone(),
            CommandSpec::Argv(parts) => parts.iter().map(|p| shell_quote(p)).collect::<Vec<_>>().join(" "),
        }
    }
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':')) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[derive(Debug, Deserialize)]
struct SshCheckData {
    command: CommandSpec,
    #[serde(default = "default_ssh_args")]
    ssh_args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    #[serde(default)]
    rules: Vec<ThresholdRule>,
}

pub struct CustomSshJsonExecutor;

impl CustomSshJsonExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CustomSshJsonExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for CustomSshJsonExecutor {
    async fn execute(&self, check: &Check) -> Outcome {
        let data: SshCheckData = match serde_json::from_value(check.data.clone()) {
            Ok(d) => d,
            Err(e) => return Outcome::error("configuration_error", e.to_string(), serde_json::json!({})),
        };

        if data.rules.is_empty() {
            return Outcome::error(
                "configuration_error",
                "custom-ssh-json check requires at least one threshold rule",
                serde_json::json!({}),
            );
        }

        let command = data.command.render();
        let mut attempts = 0u32;
        let output = loop {
            attempts += 1;

            let mut cmd = Command::new("ssh");
            cmd.args(&data.ssh_args).arg(&check.target).arg(&command);
            cmd.kill_on_drop(true);

            match tokio::time::timeout(Duration::from_secs(data.timeout_secs), cmd.output()).await {
                Ok(Ok(o)) => break o,
                Ok(Err(e)) => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("ssh_error", e.to_string(), serde_json::json!({"attempts": attempts}));
                }
                Err(_) => {
                    if attempts <= data.retries {
                        tokio::time::sleep(Duration::from_secs(data.retry_delay_secs)).await;
                        continue;
                    }
                    return Outcome::error("timeout", "ssh command timed out", serde_json::json!({"attempts": attempts}));
                }
            }
        };

        if !output.status.success() {
            return Outcome::error(
                "ssh_error",
                format!("ssh exited with status {}", output.status),
                serde_json::json!({"stderr": String::from_utf8_lossy(&output.stderr), "attempts": attempts}),
            );
        }

        let document: serde_json::Value = match serde_json::from_slice(&output.stdout) {
            Ok(v) => v,
            Err(e) => return Outcome::error("json_error", e.to_string(), serde_json::json!({"attempts": attempts})),
        };

        let failures = threshold::evaluate(&document, &data.rules);
        let critical: Vec<_> = failures
            .iter()
            .filter(|f| matches!(f.severity, crate::threshold::Severity::Critical))
            .collect();

        if critical.is_empty() {
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
        }
    }
}
