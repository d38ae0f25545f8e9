//! Core domain types shared by every component: the persisted entities
//! (`Check`, `CheckResult`, `Service`) and the derived status algorithms
//! computed from a check's recent result window.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of probe a [`Check`] performs. Drives executor registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    Http,
    JsonHttp,
    Dns,
    Tcp,
    Smtp,
    Imap,
    JsonMetrics,
    CustomSshJson,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Http => "http",
            CheckKind::JsonHttp => "json-http",
            CheckKind::Dns => "dns",
            CheckKind::Tcp => "tcp",
            CheckKind::Smtp => "smtp",
            CheckKind::Imap => "imap",
            CheckKind::JsonMetrics => "json-metrics",
            CheckKind::CustomSshJson => "custom-ssh-json",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "http" => Ok(CheckKind::Http),
            "json-http" => Ok(CheckKind::JsonHttp),
            "dns" => Ok(CheckKind::Dns),
            "tcp" => Ok(CheckKind::Tcp),
            "smtp" => Ok(CheckKind::Smtp),
            "imap" => Ok(CheckKind::Imap),
            "json-metrics" => Ok(CheckKind::JsonMetrics),
            "custom-ssh-json" => Ok(CheckKind::CustomSshJson),
            other => Err(format!("unknown check kind: {other}")),
        }
    }
}

/// Lifecycle status of a [`Check`] row, tracked by the store to enforce
/// at-most-once selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckRowStatus {
    Idle,
    Processing,
}

impl CheckRowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckRowStatus::Idle => "idle",
            CheckRowStatus::Processing => "processing",
        }
    }
}

impl std::str::FromStr for CheckRowStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "idle" => Ok(CheckRowStatus::Idle),
            "processing" => Ok(CheckRowStatus::Processing),
            other => Err(format!("unknown check row status: {other}")),
        }
    }
}

/// A probe definition, owned by the external UI and executed by this agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub check_id: String,
    pub service_id: String,
    pub name: String,
    pub kind: CheckKind,
    pub target: String,
    pub interval_seconds: i64,
    pub disabled: bool,
    /// Executor-owned configuration, kept opaque here.
    pub data: serde_json::Value,
    pub status: CheckRowStatus,
    pub next_check_time: i64,
    pub created_at: i64,
}

/// The outcome of a single [`Check`] execution. Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Ok => "ok",
            ResultStatus::Error => "error",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResultStatus::Ok)
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ok" => Ok(ResultStatus::Ok),
            "error" => Ok(ResultStatus::Error),
            other => Err(format!("unknown result status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub result_id: String,
    pub check_id: String,
    pub status: ResultStatus,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    pub name: String,
}

/// Number of most-recent results considered when deriving a check's status.
pub const DERIVED_STATUS_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedCheckStatus {
    Passed,
    Failed,
    Warning,
    Recovering,
    Unknown,
}

impl DerivedCheckStatus {
    /// Compute the derived status from a check's recent results, newest first.
    /// Callers are expected to pass at most [`DERIVED_STATUS_WINDOW`] results.
    pub fn derive(results_newest_first: &[CheckResult]) -> Self {
        let Some(newest) = results_newest_first.first() else {
            return DerivedCheckStatus::Unknown;
        };

        if !newest.status.is_ok() {
            return DerivedCheckStatus::Failed;
        }

        let older = &results_newest_first[1..];
        let any_older_error = older.iter().any(|r| !r.status.is_ok());
        if any_older_error {
            return DerivedCheckStatus::Recovering;
        }

        if results_newest_first.iter().all(|r| r.status.is_ok()) {
            DerivedCheckStatus::Passed
        } else {
            DerivedCheckStatus::Warning
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedServiceStatus {
    Passed,
    Failed,
    Warning,
    Unknown,
}

impl DerivedServiceStatus {
    pub fn derive(check_statuses: &[DerivedCheckStatus]) -> Self {
        if check_statuses.is_empty() {
            return DerivedServiceStatus::Unknown;
        }
        if check_statuses
            .iter()
            .any(|s| matches!(s, DerivedCheckStatus::Failed))
        {
            return DerivedServiceStatus::Failed;
        }
        if check_statuses
            .iter()
            .any(|s| matches!(s, DerivedCheckStatus::Warning | DerivedCheckStatus::Recovering))
        {
            return DerivedServiceStatus::Warning;
        }
        if check_statuses
            .iter()
            .all(|s| matches!(s, DerivedCheckStatus::Passed))
        {
            return DerivedServiceStatus::Passed;
        }
        DerivedServiceStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result(created_at: i64) -> CheckResult {
        CheckResult {
            result_id: format!("r{created_at}"),
            check_id: "c1".into(),
            status: ResultStatus::Ok,
            payload: serde_json::json!({}),
            created_at,
        }
    }

    fn err_result(created_at: i64) -> CheckResult {
        CheckResult {
            status: ResultStatus::Error,
            ..ok_result(created_at)
        }
    }

    #[test]
    fn no_results_is_unknown() {
        assert_eq!(DerivedCheckStatus::derive(&[]), DerivedCheckStatus::Unknown);
    }

    #[test]
    fn all_ok_is_passed() {
        let results = vec![ok_result(3), ok_result(2), ok_result(1)];
        assert_eq!(DerivedCheckStatus::derive(&results), DerivedCheckStatus::Passed);
    }

    #[test]
    fn newest_error_is_failed() {
        let results = vec![err_result(3), ok_result(2), ok_result(1)];
        assert_eq!(DerivedCheckStatus::derive(&results), DerivedCheckStatus::Failed);
    }

    #[test]
    fn ok_after_error_is_recovering() {
        let results = vec![ok_result(3), err_result(2), ok_result(1)];
        assert_eq!(DerivedCheckStatus::derive(&results), DerivedCheckStatus::Recovering);
    }

    #[test]
    fn service_status_is_worst_of_its_checks() {
        let statuses = vec![DerivedCheckStatus::Passed, DerivedCheckStatus::Recovering];
        assert_eq!(DerivedServiceStatus::derive(&statuses), DerivedServiceStatus::Warning);

        let statuses = vec![DerivedCheckStatus::Passed, DerivedCheckStatus::Failed];
        assert_eq!(DerivedServiceStatus::derive(&statuses), DerivedServiceStatus::Failed);

        let statuses = vec![DerivedCheckStatus::Passed, DerivedCheckStatus::Passed];
        assert_eq!(DerivedServiceStatus::derive(&statuses), DerivedServiceStatus::Passed);
    }
}
