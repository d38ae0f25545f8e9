//! Notifier: a stateless [`EventListener`] that turns bus events into
//! operator-facing messages. The logging sink is always active; the
//! Telegram sink is an optional addition over a shared [`reqwest::Client`],
//! gated by explicit configuration rather than silently doing nothing when
//! unconfigured.

use async_trait::async_trait;
use mon_bus::{BusEvent, EventListener};
use mon_common::DerivedServiceStatus;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingBotToken,
    #[error("TELEGRAM_CHAT_ID is not set")]
    MissingChatId,
    #[error("telegram request failed: {0}")]
    Request(#[from] reqwest::Error),
}

fn format_check_failed(
    check_name: &str,
    kind: &str,
    target: &str,
    payload: &serde_json::Value,
    occurred_at: i64,
) -> String {
    format!(
        "check failed: {check_name} ({kind} -> {target}) at {occurred_at}\n{}",
        serde_json::to_string(payload).unwrap_or_else(|_| "<unserializable payload>".to_string())
    )
}

fn format_service_status_changed(
    service_name: &str,
    old_status: Option<DerivedServiceStatus>,
    new_status: DerivedServiceStatus,
    occurred_at: i64,
) -> String {
    let old = old_status.map(|s| format!("{s:?}")).unwrap_or_else(|| "unknown".to_string());
    format!("service {service_name} status changed: {old} -> {new_status:?} at {occurred_at}")
}

/// Always-on sink. Every other sink is additive; this one is never disabled
/// because it is the notifier of last resort when delivery elsewhere fails.
pub struct LoggingSink;

#[async_trait]
impl EventListener for LoggingSink {
    async fn handle(&self, event: &BusEvent) {
        match event {
            BusEvent::CheckFailed { check_name, kind, target, payload, occurred_at, .. } => {
                warn!(check_name, kind, target, occurred_at, "{}", format_check_failed(check_name, kind, target, payload, *occurred_at));
            }
            BusEvent::ServiceStatusChanged { service_name, old_status, new_status, occurred_at, .. } => {
                warn!(
                    service_name,
                    occurred_at,
                    "{}",
                    format_service_status_changed(service_name, *old_status, *new_status, *occurred_at)
                );
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// Reads `TELEGRAM_BOT_TOKEN`/`TELEGRAM_CHAT_ID`. Called only when
    /// `--enable-telegram` is set; missing variables are a startup error, not
    /// a silently-disabled sink.
    pub fn from_env() -> Result<Self, NotifierError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").map_err(|_| NotifierError::MissingBotToken)?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").map_err(|_| NotifierError::MissingChatId)?;
        Ok(Self { bot_token, chat_id })
    }
}

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramSink {
    client: reqwest::Client,
    config: TelegramConfig,
    api_base: String,
}

impl TelegramSink {
    pub fn new(client: reqwest::Client, config: TelegramConfig) -> Self {
        Self { client, config, api_base: TELEGRAM_API_BASE.to_string() }
    }

    #[cfg(test)]
    fn with_api_base(client: reqwest::Client, config: TelegramConfig, api_base: String) -> Self {
        Self { client, config, api_base }
    }

    async fn send(&self, text: String) -> Result<(), NotifierError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.config.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": self.config.chat_id, "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "telegram notification rejected");
        }
        Ok(())
    }
}

#[async_trait]
impl EventListener for TelegramSink {
    async fn handle(&self, event: &BusEvent) {
        let text = match event {
            BusEvent::CheckFailed { check_name, kind, target, payload, occurred_at, .. } => {
                format_check_failed(check_name, kind, target, payload, *occurred_at)
            }
            BusEvent::ServiceStatusChanged { service_name, old_status, new_status, occurred_at, .. } => {
                format_service_status_changed(service_name, *old_status, *new_status, *occurred_at)
            }
        };

        if let Err(e) = self.send(text).await {
            error!(error = %e, "failed to deliver telegram notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn logging_sink_never_panics_on_either_event_variant() {
        let sink = LoggingSink;
        sink.handle(&BusEvent::CheckFailed {
            check_id: "c1".into(),
            service_id: "s1".into(),
            check_name: "probe".into(),
            kind: "http".into(),
            target: "http://x".into(),
            payload: serde_json::json!({"error_type": "timeout"}),
            occurred_at: 0,
        })
        .await;
        sink.handle(&BusEvent::ServiceStatusChanged {
            service_id: "s1".into(),
            service_name: "svc".into(),
            old_status: Some(DerivedServiceStatus::Passed),
            new_status: DerivedServiceStatus::Failed,
            occurred_at: 0,
        })
        .await;
    }

    #[tokio::test]
    async fn telegram_sink_posts_to_send_message() {
        let server = MockServer::start().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();

        Mock::given(method("POST"))
            .and(path_regex(r"^/bot.*/sendMessage$"))
            .respond_with(move |_: &wiremock::Request| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200)
            })
            .mount(&server)
            .await;

        let sink = TelegramSink::with_api_base(
            reqwest::Client::new(),
            TelegramConfig { bot_token: "fake".into(), chat_id: "1".into() },
            server.uri(),
        );

        sink.handle(&BusEvent::CheckFailed {
            check_id: "c1".into(),
            service_id: "s1".into(),
            check_name: "probe".into(),
            kind: "http".into(),
            target: "http://x".into(),
            payload: serde_json::json!({}),
            occurred_at: 0,
        })
        .await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_env_vars_are_startup_errors() {
        std::env::remove_var("TELEGRAM_BOT_TOKEN");
        std::env::remove_var("TELEGRAM_CHAT_ID");
        assert!(matches!(TelegramConfig::from_env(), Err(NotifierError::MissingBotToken)));
    }
}
