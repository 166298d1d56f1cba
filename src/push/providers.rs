//! Push Provider Module
//!
//! HTTP clients for the PushPlus and WxPusher notification services and the
//! message templates the bot sends through them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{BotError, Result};

const PUSHPLUS_BASE_URL: &str = "http://www.pushplus.plus";
const WXPUSHER_BASE_URL: &str = "http://wxpusher.zjiecode.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PUSHPLUS_TITLE_LIMIT: usize = 100;
const WXPUSHER_SUMMARY_LIMIT: usize = 96;

// == Push Sender ==
/// A delivery channel the push queue can drain into.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Delivers one notification. Any `Err` counts as a failed attempt.
    async fn send(&self, title: &str, content: &str, uids: Option<&[String]>) -> Result<()>;

    fn name(&self) -> &'static str;
}

// == Retry Policy ==
/// In-call retries for network errors and non-200 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Providers reject empty bodies, so blank content becomes a single space.
fn non_blank(content: &str) -> &str {
    if content.trim().is_empty() {
        " "
    } else {
        content
    }
}

/// POSTs `body` and returns the parsed JSON reply of the first HTTP 200.
async fn post_json(
    http: &Client,
    url: &str,
    body: &Value,
    retry: RetryPolicy,
    provider: &'static str,
) -> Result<Value> {
    let attempts = retry.attempts.max(1);
    let mut last_error = BotError::Push(format!("{provider}: no attempt made"));

    for attempt in 1..=attempts {
        match http
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => {
                return response.json::<Value>().await.map_err(|e| {
                    error!(provider, error = %e, "Provider returned invalid JSON");
                    BotError::Push(format!("{provider} returned invalid JSON: {e}"))
                });
            }
            Ok(response) => {
                let status = response.status();
                warn!(provider, %status, attempt, "Provider responded with unexpected status");
                last_error = BotError::Push(format!("{provider} responded with HTTP {status}"));
            }
            Err(e) => {
                warn!(provider, error = %e, attempt, attempts, "Provider request failed");
                last_error = BotError::Transport(format!("{provider}: {e}"));
                if attempt < attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }

    Err(last_error)
}

// == PushPlus ==
/// Client for the PushPlus `send` API.
#[derive(Debug, Clone)]
pub struct PushPlusClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    topic: Option<String>,
    retry: RetryPolicy,
}

impl PushPlusClient {
    pub fn new(token: Option<String>, topic: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: PUSHPLUS_BASE_URL.to_string(),
            token: token.filter(|t| !t.is_empty()),
            topic: topic.filter(|t| !t.is_empty()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Sends a plain-text notification to the configured token or topic.
    ///
    /// Succeeds only when the service answers with `code == 200`.
    pub async fn send_notification(&self, title: &str, content: &str) -> Result<()> {
        let Some(token) = self.token.as_deref() else {
            warn!("PushPlus token not configured, skipping notification");
            return Err(BotError::PushNotConfigured("pushplus"));
        };

        let mut body = json!({
            "token": token,
            "title": truncate_chars(title, PUSHPLUS_TITLE_LIMIT),
            "content": non_blank(content),
            "template": "txt",
        });
        if let Some(topic) = &self.topic {
            body["topic"] = json!(topic);
        }

        let url = format!("{}/send", self.base_url);
        let reply = post_json(&self.http, &url, &body, self.retry, "pushplus").await?;
        debug!(reply = %reply, "PushPlus reply");

        if reply["code"].as_i64() == Some(200) {
            info!(title = %title, "PushPlus notification sent");
            Ok(())
        } else {
            let msg = reply["msg"].as_str().unwrap_or("unknown error");
            error!(title = %title, error = %msg, "PushPlus notification rejected");
            Err(BotError::Push(format!("pushplus rejected notification: {msg}")))
        }
    }

    pub async fn send_template(&self, template: &PushTemplate) -> Result<()> {
        self.send_notification(&template.title(), &template.content())
            .await
    }
}

#[async_trait]
impl PushSender for PushPlusClient {
    async fn send(&self, title: &str, content: &str, _uids: Option<&[String]>) -> Result<()> {
        self.send_notification(title, content).await
    }

    fn name(&self) -> &'static str {
        "pushplus"
    }
}

// == WxPusher ==
/// Client for the WxPusher `send/message` API.
#[derive(Debug, Clone)]
pub struct WxPusherClient {
    http: Client,
    base_url: String,
    app_token: Option<String>,
    retry: RetryPolicy,
}

impl WxPusherClient {
    pub fn new(app_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: WXPUSHER_BASE_URL.to_string(),
            app_token: app_token.filter(|t| !t.is_empty()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.app_token.is_some()
    }

    /// Sends a markdown notification to `uids`.
    ///
    /// Succeeds only when the service answers `code == 1000` and every
    /// per-UID result carries `code == 1001`.
    pub async fn send_notification(
        &self,
        title: &str,
        content: &str,
        uids: Option<&[String]>,
    ) -> Result<()> {
        let Some(app_token) = self.app_token.as_deref() else {
            warn!("WxPusher token not configured, skipping notification");
            return Err(BotError::PushNotConfigured("wxpusher"));
        };

        let mut body = json!({
            "appToken": app_token,
            "content": non_blank(content),
            "summary": truncate_chars(title, WXPUSHER_SUMMARY_LIMIT),
            "contentType": 3,
        });
        if let Some(uids) = uids.filter(|u| !u.is_empty()) {
            body["uids"] = json!(uids);
        }

        let url = format!("{}/api/send/message", self.base_url);
        let reply = post_json(&self.http, &url, &body, self.retry, "wxpusher").await?;
        debug!(reply = %reply, "WxPusher reply");

        if reply["code"].as_i64() != Some(1000) {
            let msg = reply["msg"].as_str().unwrap_or("unknown error");
            error!(title = %title, error = %msg, "WxPusher notification rejected");
            return Err(BotError::Push(format!("wxpusher rejected notification: {msg}")));
        }

        let results = reply["data"].as_array().map(Vec::as_slice).unwrap_or_default();
        let failed: Vec<&Value> = results
            .iter()
            .filter(|item| item["code"].as_i64() != Some(1001))
            .collect();

        if failed.is_empty() {
            info!(title = %title, recipients = results.len(), "WxPusher notification sent");
            Ok(())
        } else {
            for item in &failed {
                warn!(
                    uid = %item["uid"].as_str().unwrap_or("unknown"),
                    status = %item["status"].as_str().unwrap_or("unknown error"),
                    "WxPusher delivery to UID failed"
                );
            }
            Err(BotError::Push(format!(
                "wxpusher delivered to {} of {} recipients",
                results.len() - failed.len(),
                results.len()
            )))
        }
    }

    pub async fn send_template(
        &self,
        template: &PushTemplate,
        uids: Option<&[String]>,
    ) -> Result<()> {
        self.send_notification(&template.title(), &template.content(), uids)
            .await
    }
}

#[async_trait]
impl PushSender for WxPusherClient {
    async fn send(&self, title: &str, content: &str, uids: Option<&[String]>) -> Result<()> {
        self.send_notification(title, content, uids).await
    }

    fn name(&self) -> &'static str {
        "wxpusher"
    }
}

// == Templates ==
/// Notices the bot pushes to reviewers' phones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTemplate {
    NewSubmission { submission_id: i64 },
    BusinessRequest { submission_id: i64 },
    Urge { submission_id: i64, username: String },
}

impl PushTemplate {
    pub fn title(&self) -> String {
        match self {
            PushTemplate::NewSubmission { submission_id } => format!("📬 Submission #{submission_id}"),
            PushTemplate::BusinessRequest { submission_id } => format!("🤝 Business #{submission_id}"),
            PushTemplate::Urge { submission_id, .. } => format!("⏰ Review reminder #{submission_id}"),
        }
    }

    pub fn content(&self) -> String {
        match self {
            PushTemplate::NewSubmission { submission_id } => {
                format!("New submission awaiting review\nID: #{submission_id}")
            }
            PushTemplate::BusinessRequest { submission_id } => {
                format!("New business cooperation request\nID: #{submission_id}")
            }
            PushTemplate::Urge {
                submission_id,
                username,
            } => format!(
                "User @{username} asked for a review of submission #{submission_id}\nPlease handle it soon!"
            ),
        }
    }
}
