//! Request DTOs for the operations API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

const MAX_TITLE_CHARS: usize = 200;

/// Request body for POST /cache/invalidate
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Substring matched against db cache keys
    pub pattern: String,
}

impl InvalidateRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.pattern.trim().is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}

/// Request body for POST /push
#[derive(Debug, Clone, Deserialize)]
pub struct PushRequest {
    pub title: String,
    pub content: String,
    /// WxPusher UIDs; omitted sends to the app's default audience
    #[serde(default)]
    pub uids: Option<Vec<String>>,
    /// Overrides the configured retry budget
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl PushRequest {
    pub fn validate(&self) -> Option<String> {
        if self.title.trim().is_empty() {
            return Some("Title cannot be empty".to_string());
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Some(format!(
                "Title exceeds maximum length of {} characters",
                MAX_TITLE_CHARS
            ));
        }
        if let Some(uids) = &self.uids {
            if uids.iter().any(|uid| uid.trim().is_empty()) {
                return Some("UIDs cannot be blank".to_string());
            }
        }
        None
    }
}

/// Request body for POST /submissions/:id/urge
#[derive(Debug, Clone, Deserialize)]
pub struct UrgeRequest {
    /// Telegram username of the author asking for a review
    pub username: String,
}

impl UrgeRequest {
    pub fn validate(&self) -> Option<String> {
        if self.username.trim().is_empty() {
            return Some("Username cannot be empty".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urge_request_validate() {
        let req: UrgeRequest = serde_json::from_str(r#"{"username": "alice"}"#).unwrap();
        assert!(req.validate().is_none());

        let blank = UrgeRequest {
            username: "  ".to_string(),
        };
        assert_eq!(blank.validate().as_deref(), Some("Username cannot be empty"));
    }

    #[test]
    fn test_push_request_deserialize() {
        let json = r#"{"title": "Hi", "content": "body"}"#;
        let req: PushRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.title, "Hi");
        assert!(req.uids.is_none());
        assert!(req.max_retries.is_none());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_push_request_with_uids() {
        let json = r#"{"title": "Hi", "content": "", "uids": ["UID_1"], "max_retries": 1}"#;
        let req: PushRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.uids, Some(vec!["UID_1".to_string()]));
        assert_eq!(req.max_retries, Some(1));
    }

    #[test]
    fn test_validate_rejects_blank_title_and_uids() {
        let req = PushRequest {
            title: " ".to_string(),
            content: "x".to_string(),
            uids: None,
            max_retries: None,
        };
        assert!(req.validate().is_some());

        let req = PushRequest {
            title: "ok".to_string(),
            content: "x".to_string(),
            uids: Some(vec!["".to_string()]),
            max_retries: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_empty_pattern() {
        let req = InvalidateRequest {
            pattern: "".to_string(),
        };
        assert!(req.validate().is_some());

        let req = InvalidateRequest {
            pattern: "pending".to_string(),
        };
        assert!(req.validate().is_none());
    }
}
