//! Telegram Transport Module
//!
//! The messaging seam the fan-out talks to, and its Bot API implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{BotError, Result};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const TEXT_LIMIT: usize = 4096;
pub const CAPTION_LIMIT: usize = 1024;

/// Identifies a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

// == Keyboard ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// Inline keyboard attached to review notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl ReviewKeyboard {
    /// Approve / reject row for one submission.
    pub fn for_submission(submission_id: i64) -> Self {
        Self {
            inline_keyboard: vec![vec![
                InlineButton {
                    text: "✅ Approve".to_string(),
                    callback_data: format!("approve_{}", submission_id),
                },
                InlineButton {
                    text: "❌ Reject".to_string(),
                    callback_data: format!("reject_{}", submission_id),
                },
            ]],
        }
    }
}

// == Transport Trait ==
/// Outbound messaging. Every call returns `Err` on failure and a handle on
/// success; callers decide whether to retry.
#[async_trait]
pub trait BotTransport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&ReviewKeyboard>,
    ) -> Result<MessageHandle>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&ReviewKeyboard>,
    ) -> Result<MessageHandle>;

    async fn send_video(
        &self,
        chat_id: i64,
        video: &str,
        caption: &str,
        keyboard: Option<&ReviewKeyboard>,
    ) -> Result<MessageHandle>;
}

// == Bot API ==
pub struct TelegramBotApi {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramBotApi {
    pub fn new(token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: TELEGRAM_API_URL.to_string(),
            token: token.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(
        &self,
        method: &str,
        chat_id: i64,
        mut body: Value,
        keyboard: Option<&ReviewKeyboard>,
    ) -> Result<MessageHandle> {
        if self.token.is_empty() {
            return Err(BotError::Transport("bot token is not configured".to_string()));
        }
        body["chat_id"] = json!(chat_id);
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = json!(keyboard);
        }

        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let response_body: Value = response.json().await?;

        if status.is_success() && response_body["ok"].as_bool() == Some(true) {
            let message_id = response_body["result"]["message_id"]
                .as_i64()
                .unwrap_or_default();
            debug!(method, chat_id, message_id, "Telegram message delivered");
            Ok(MessageHandle { chat_id, message_id })
        } else {
            let description = response_body["description"]
                .as_str()
                .unwrap_or("Unknown error")
                .to_string();
            Err(BotError::Transport(description))
        }
    }
}

#[async_trait]
impl BotTransport for TelegramBotApi {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&ReviewKeyboard>,
    ) -> Result<MessageHandle> {
        let body = json!({ "text": truncate_chars(text, TEXT_LIMIT) });
        self.call("sendMessage", chat_id, body, keyboard).await
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&ReviewKeyboard>,
    ) -> Result<MessageHandle> {
        let body = json!({ "photo": photo, "caption": truncate_chars(caption, CAPTION_LIMIT) });
        self.call("sendPhoto", chat_id, body, keyboard).await
    }

    async fn send_video(
        &self,
        chat_id: i64,
        video: &str,
        caption: &str,
        keyboard: Option<&ReviewKeyboard>,
    ) -> Result<MessageHandle> {
        let body = json!({ "video": video, "caption": truncate_chars(caption, CAPTION_LIMIT) });
        self.call("sendVideo", chat_id, body, keyboard).await
    }
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
