//! Notify Module
//!
//! Telegram delivery of review notices to admins and reviewers.

mod fanout;
mod transport;

pub use fanout::{FanoutReport, Media, Notifier, SubmissionPayload};
pub use transport::{
    BotTransport, InlineButton, MessageHandle, ReviewKeyboard, TelegramBotApi, CAPTION_LIMIT,
    TEXT_LIMIT,
};
