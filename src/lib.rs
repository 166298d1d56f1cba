//! Submission Bot Core
//!
//! Caching, push delivery and review-notification fan-out for a Telegram
//! submission bot, plus a small operations HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod notify;
pub mod push;
pub mod store;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use context::AppContext;
pub use error::{BotError, Result};
