//! Typed rows of the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    Text,
    Photo,
    Video,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Text => "text",
            SubmissionKind::Photo => "photo",
            SubmissionKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionCategory {
    Submission,
    Business,
}

// == Submission ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    #[serde(rename = "type")]
    pub kind: SubmissionKind,
    pub content: String,
    /// Single media file
    pub file_id: Option<String>,
    /// Media group files, cover first
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: SubmissionStatus,
    pub category: SubmissionCategory,
    #[serde(default)]
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// A pending text submission; tests and fixtures adjust the rest.
    pub fn new(
        id: i64,
        user_id: i64,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            username: username.into(),
            kind: SubmissionKind::Text,
            content: content.into(),
            file_id: None,
            file_ids: Vec::new(),
            tags: Vec::new(),
            status: SubmissionStatus::Pending,
            category: SubmissionCategory::Submission,
            anonymous: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_business(&self) -> bool {
        self.category == SubmissionCategory::Business
    }
}

// == User ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// WxPusher UID for phone notifications
    pub wxpusher_uid: Option<String>,
    #[serde(default)]
    pub bot_blocked: bool,
}

impl User {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            wxpusher_uid: None,
            bot_blocked: false,
        }
    }

    pub fn with_wxpusher_uid(mut self, uid: impl Into<String>) -> Self {
        self.wxpusher_uid = Some(uid.into());
        self
    }
}

// == Reviewer Application ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerApplication {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub status: ApplicationStatus,
}

// == Aggregates ==
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// One chat that receives review notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub chat_id: i64,
    pub is_admin: bool,
    pub wxpusher_uid: Option<String>,
}
