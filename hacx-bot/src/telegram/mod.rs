//! Telegram channel adapter.
//!
//! Long-polls the Bot API for text messages and sends replies with
//! Markdown formatting, falling back to plain text when Telegram rejects
//! the markup.

use crate::message::ChannelMessage;
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use hacx_common::util::{sanitize_for_log, truncate_with_ellipsis};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default Bot API host.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
    poll_backoff: Duration,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
            client: reqwest::Client::builder()
                // Must outlive the long-poll window.
                .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            poll_backoff: POLL_BACKOFF,
        }
    }

    /// Point the channel at another Bot API host (local Bot API server, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the pause after a failed poll.
    pub fn with_poll_backoff(mut self, backoff: Duration) -> Self {
        self.poll_backoff = backoff;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    async fn post_message(&self, body: &Value) -> ChannelResult<reqwest::Response> {
        self.client
            .post(self.api_url("sendMessage"))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(sanitize_for_log(&e.to_string())))
    }

    /// Map a failed Bot API response to a channel error.
    fn send_error(status: u16, body: &str) -> ChannelError {
        if status == 429 {
            let retry_after_secs = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.pointer("/parameters/retry_after").and_then(Value::as_u64))
                .unwrap_or(1);
            return ChannelError::RateLimited { retry_after_secs };
        }
        if status == 401 {
            return ChannelError::Auth(body.to_string());
        }
        ChannelError::SendFailed(format!("Telegram sendMessage failed ({status}): {body}"))
    }

    async fn sleep_backoff(&self) {
        tokio::time::sleep(self.poll_backoff).await;
    }
}

/// Whether a `sendMessage` rejection was caused by invalid Markdown.
fn is_markup_rejection(status: u16, body: &str) -> bool {
    status == 400 && body.contains("can't parse entities")
}

/// Convert one `getUpdates` entry into a message, skipping non-text updates.
fn parse_update(update: &Value) -> Option<ChannelMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;

    let from = message.get("from");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();
    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .map(String::from);

    let id = message
        .get("message_id")
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let timestamp = message
        .get("date")
        .and_then(Value::as_i64)
        .map(|secs| secs * 1000)
        .unwrap_or_else(crate::session::now_millis);

    Some(ChannelMessage {
        id,
        chat_id: chat_id.to_string(),
        user_id,
        first_name,
        text: text.to_string(),
        timestamp,
    })
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        // Verify bot token by calling getMe
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(sanitize_for_log(&e.to_string())))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;
        let username = data
            .pointer("/result/username")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        tracing::info!(bot = %username, "Telegram channel initialized");
        Ok(())
    }

    async fn send(&self, chat_id: &str, text: &str) -> ChannelResult<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true
        });

        let resp = self.post_message(&body).await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status().as_u16();
        let error_text = resp.text().await.unwrap_or_default();

        if !is_markup_rejection(status, &error_text) {
            return Err(Self::send_error(status, &error_text));
        }

        tracing::warn!(
            chat_id = %chat_id,
            error = %error_text,
            "Telegram rejected Markdown, resending as plain text"
        );

        let body_plain = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true
        });

        let resp_plain = self.post_message(&body_plain).await?;
        if resp_plain.status().is_success() {
            return Ok(());
        }

        let status = resp_plain.status().as_u16();
        let plain_error = resp_plain.text().await.unwrap_or_default();
        Err(Self::send_error(status, &plain_error))
    }

    async fn send_typing(&self, chat_id: &str) -> ChannelResult<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing"
        });

        let resp = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(sanitize_for_log(&e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "Telegram sendChatAction failed ({status}): {err}"
            )));
        }
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %sanitize_for_log(&e.to_string()), "Telegram poll error");
                    self.sleep_backoff().await;
                    continue;
                }
            };

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let err = resp.text().await.unwrap_or_default();
                tracing::warn!(status, error = %err, "Telegram poll rejected");
                self.sleep_backoff().await;
                continue;
            }

            let data: Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram parse error");
                    self.sleep_backoff().await;
                    continue;
                }
            };

            let Some(results) = data.get("result").and_then(Value::as_array) else {
                tracing::warn!(
                    body = %truncate_with_ellipsis(&data.to_string(), 200),
                    "Telegram poll returned no result array"
                );
                self.sleep_backoff().await;
                continue;
            };

            for update in results {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(uid + 1);
                }

                let Some(msg) = parse_update(update) else {
                    continue;
                };

                tracing::info!(
                    channel = "telegram",
                    message_id = %msg.id,
                    chat_id = %msg.chat_id,
                    user_id = %msg.user_id,
                    text_chars = msg.text.chars().count(),
                    "Telegram message received"
                );

                if tx.send(msg).await.is_err() {
                    tracing::info!("Message receiver closed, Telegram listener stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(sanitize_for_log(&e.to_string())))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }
}
