//! Error types for the bot core
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Bot Error Enum ==
/// Unified error type for the bot core.
#[derive(Error, Debug)]
pub enum BotError {
    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Relational store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Messaging transport (Bot API) failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// External push provider failure
    #[error("Push error: {0}")]
    Push(String),

    /// Push provider has no credentials configured
    #[error("Push provider not configured: {0}")]
    PushNotConfigured(&'static str),

    /// Push queue is at capacity
    #[error("Push queue is full")]
    QueueFull,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for BotError {
    fn into_response(self) -> Response {
        let status = match &self {
            BotError::NotFound(_) => StatusCode::NOT_FOUND,
            BotError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            BotError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            BotError::PushNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            BotError::Transport(_) | BotError::Push(_) => StatusCode::BAD_GATEWAY,
            BotError::Store(_) | BotError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Transport(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the bot core.
pub type Result<T> = std::result::Result<T, BotError>;
