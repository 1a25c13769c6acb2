//! Telegram alert delivery.
//!
//! Optional integration: when the bot token or chat id is missing the
//! notifier stays configured-but-inactive and every send is a cheap no-op,
//! so the monitor never has to care whether alerting is wired up. Failures
//! are logged and counted, not propagated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Retries for a failed send before giving up on the message.
const MAX_RETRIES: u32 = 3;

/// Initial backoff between retries (milliseconds), doubled each attempt.
const INITIAL_BACKOFF_MS: u64 = 1000;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    /// Bot API token; notifications are disabled when absent.
    pub bot_token: Option<String>,
    /// Destination chat; notifications are disabled when absent.
    pub chat_id: Option<String>,
    pub enabled: bool,
}

impl TelegramConfig {
    pub fn from_env() -> Self {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .ok()
            .filter(|s| !s.is_empty());
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(bot_token.is_some());

        Self {
            bot_token,
            chat_id,
            enabled,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.bot_token.is_some() && self.chat_id.is_some()
    }
}

pub type TelegramResult<T> = Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bot API returned error status: {0}")]
    Api(String),

    #[error("Max retries exceeded")]
    MaxRetriesExceeded,
}

#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
        }
    }

    pub fn from_env() -> Self {
        Self::new(TelegramConfig::from_env())
    }

    pub fn is_active(&self) -> bool {
        self.config.is_active()
    }

    /// (sent, failed) counters.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.messages_sent.load(Ordering::Relaxed),
            self.messages_failed.load(Ordering::Relaxed),
        )
    }

    /// Deliver one plain-text alert. Inactive configuration is a silent
    /// no-op; delivery failure is logged after the retries run out.
    pub async fn send_text(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (&self.config.bot_token, &self.config.chat_id) else {
            debug!("telegram not configured, alert dropped");
            return;
        };
        if !self.config.enabled {
            debug!("telegram disabled, alert dropped");
            return;
        }

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let payload = SendMessagePayload { chat_id, text };

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        for attempt in 1..=MAX_RETRIES {
            match self.send_once(&url, &payload).await {
                Ok(()) => {
                    self.messages_sent.fetch_add(1, Ordering::Relaxed);
                    debug!("telegram message sent");
                    return;
                }
                Err(err) if attempt < MAX_RETRIES => {
                    warn!(attempt, error = %err, "telegram send failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
                Err(err) => {
                    self.messages_failed.fetch_add(1, Ordering::Relaxed);
                    error!(error = %err, "telegram send failed, alert dropped");
                    return;
                }
            }
        }
    }

    async fn send_once(&self, url: &str, payload: &SendMessagePayload<'_>) -> TelegramResult<()> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TelegramError::Api(format!("status {status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_inactive() {
        let config = TelegramConfig::default();
        assert!(!config.is_active());
    }

    #[test]
    fn active_requires_token_chat_and_enabled() {
        let mut config = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: Some("42".to_string()),
            enabled: true,
        };
        assert!(config.is_active());

        config.enabled = false;
        assert!(!config.is_active());

        config.enabled = true;
        config.chat_id = None;
        assert!(!config.is_active());
    }

    #[tokio::test]
    async fn unconfigured_send_is_a_noop() {
        let notifier = TelegramNotifier::new(TelegramConfig::default());
        notifier.send_text("hello").await;
        assert_eq!(notifier.stats(), (0, 0));
    }
}
