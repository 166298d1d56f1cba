//! Push Message Module
//!
//! Outbound push notification and its delivery state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

// == Push Status ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    Pending,
    Sent,
    Failed,
}

// == Push Message ==
/// A push notification travelling through the queue.
///
/// Lives only in memory; queued messages do not survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// Recipient UIDs; None sends to the provider's default audience
    pub uids: Option<Vec<String>>,
    pub max_retries: u32,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub status: PushStatus,
    pub error_message: Option<String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            uids: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt: None,
            status: PushStatus::Pending,
            error_message: None,
        }
    }

    pub fn with_uids(mut self, uids: Option<Vec<String>>) -> Self {
        self.uids = uids.filter(|u| !u.is_empty());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub(crate) fn mark_attempt(&mut self) {
        self.last_attempt = Some(Utc::now());
    }

    pub(crate) fn mark_sent(&mut self) {
        self.status = PushStatus::Sent;
        self.error_message = None;
    }

    /// Records a failed attempt. Returns true while retries remain.
    pub(crate) fn record_failure(&mut self, error: impl Into<String>) -> bool {
        self.retry_count += 1;
        self.error_message = Some(error.into());
        if self.retry_count < self.max_retries {
            true
        } else {
            self.status = PushStatus::Failed;
            false
        }
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = PushStatus::Failed;
        self.error_message = Some(error.into());
    }

    pub fn is_finished(&self) -> bool {
        self.status != PushStatus::Pending
    }
}
