//! Push Module
//!
//! Outbound push notifications: provider clients and the retrying queue
//! that feeds them.

mod message;
mod providers;
mod queue;

pub use message::{PushMessage, PushStatus, DEFAULT_MAX_RETRIES};
pub use providers::{PushPlusClient, PushSender, PushTemplate, RetryPolicy, WxPusherClient};
pub use queue::{PushQueue, PushQueueConfig, PushQueueStats};
