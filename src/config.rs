//! Configuration Module
//!
//! Loads bot and service settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheManagerConfig, PersistMode};
use crate::push::PushQueueConfig;

/// Service configuration.
///
/// Every value can be set through an environment variable; anything missing
/// or unparsable falls back to its default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub bot_token: String,
    /// Bot API base URL
    pub telegram_api_url: String,
    /// Chats that always receive review notices
    pub admin_ids: Vec<i64>,
    /// Review group that also receives business requests
    pub management_group_id: Option<i64>,
    /// Channels approved submissions are published to
    pub channel_ids: Vec<i64>,
    /// Groups approved submissions are published to
    pub group_ids: Vec<i64>,
    /// Operations HTTP port
    pub server_port: u16,
    pub cache_dir: PathBuf,
    pub cache_persistence: bool,
    /// Seconds between deferred persistence flushes; 0 writes through
    pub cache_persist_debounce: u64,
    /// Cache cleanup period in seconds
    pub cleanup_interval: u64,
    /// Smart-cache optimization period in seconds
    pub optimizer_interval: u64,
    pub adaptive_cache: bool,
    pub push_queue_capacity: usize,
    pub push_max_retries: u32,
    /// Send WxPusher fan-out through the push queue
    pub queue_wxpusher: bool,
    pub pushplus_token: Option<String>,
    pub pushplus_topic: Option<String>,
    pub wxpusher_token: Option<String>,
    /// Provider base URL overrides
    pub pushplus_api_url: Option<String>,
    pub wxpusher_api_url: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `BOT_TOKEN` - Telegram bot token (default: empty)
    /// - `TELEGRAM_API_URL` - Bot API base URL (default: https://api.telegram.org)
    /// - `ADMIN_IDS` - Comma-separated admin chat ids (default: none)
    /// - `MANAGEMENT_GROUP_ID` - Review group chat id (default: unset)
    /// - `CHANNEL_IDS`, `GROUP_IDS` - Comma-separated publish targets (default: none)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_DIR` - Persistence directory (default: ./cache)
    /// - `CACHE_PERSISTENCE` - Mirror caches to disk (default: true)
    /// - `CACHE_PERSIST_DEBOUNCE` - Deferred flush seconds, 0 = write-through (default: 0)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 300)
    /// - `OPTIMIZER_INTERVAL` - Optimizer frequency in seconds (default: 300)
    /// - `ADAPTIVE_CACHE` - Run the smart-cache optimizer (default: true)
    /// - `PUSH_QUEUE_CAPACITY` - Push queue bound (default: 1000)
    /// - `PUSH_MAX_RETRIES` - Retries per queued push (default: 3)
    /// - `QUEUE_WXPUSHER` - Queue WxPusher fan-out (default: false)
    /// - `PUSHPLUS_TOKEN`, `PUSHPLUS_TOPIC`, `WXPUSHER_TOKEN` - Push credentials
    /// - `PUSHPLUS_API_URL`, `WXPUSHER_API_URL` - Provider base URLs (default: public endpoints)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bot_token: env::var("BOT_TOKEN").unwrap_or(defaults.bot_token),
            telegram_api_url: non_empty_var("TELEGRAM_API_URL")
                .unwrap_or(defaults.telegram_api_url),
            admin_ids: env::var("ADMIN_IDS")
                .map(|v| parse_id_list(&v))
                .unwrap_or(defaults.admin_ids),
            management_group_id: parsed_var("MANAGEMENT_GROUP_ID"),
            channel_ids: env::var("CHANNEL_IDS")
                .map(|v| parse_id_list(&v))
                .unwrap_or(defaults.channel_ids),
            group_ids: env::var("GROUP_IDS")
                .map(|v| parse_id_list(&v))
                .unwrap_or(defaults.group_ids),
            server_port: parsed_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cache_dir: non_empty_var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_persistence: env::var("CACHE_PERSISTENCE")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.cache_persistence),
            cache_persist_debounce: parsed_var("CACHE_PERSIST_DEBOUNCE")
                .unwrap_or(defaults.cache_persist_debounce),
            cleanup_interval: parsed_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            optimizer_interval: parsed_var("OPTIMIZER_INTERVAL")
                .unwrap_or(defaults.optimizer_interval),
            adaptive_cache: env::var("ADAPTIVE_CACHE")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.adaptive_cache),
            push_queue_capacity: parsed_var("PUSH_QUEUE_CAPACITY")
                .unwrap_or(defaults.push_queue_capacity),
            push_max_retries: parsed_var("PUSH_MAX_RETRIES").unwrap_or(defaults.push_max_retries),
            queue_wxpusher: env::var("QUEUE_WXPUSHER")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.queue_wxpusher),
            pushplus_token: non_empty_var("PUSHPLUS_TOKEN"),
            pushplus_topic: non_empty_var("PUSHPLUS_TOPIC"),
            wxpusher_token: non_empty_var("WXPUSHER_TOKEN"),
            pushplus_api_url: non_empty_var("PUSHPLUS_API_URL"),
            wxpusher_api_url: non_empty_var("WXPUSHER_API_URL"),
        }
    }

    /// Cache manager settings derived from the persistence options.
    pub fn cache_manager_config(&self) -> CacheManagerConfig {
        CacheManagerConfig {
            persistence_dir: self.cache_persistence.then(|| self.cache_dir.clone()),
            persist_mode: if self.cache_persist_debounce > 0 {
                PersistMode::Deferred
            } else {
                PersistMode::WriteThrough
            },
        }
    }

    pub fn push_queue_config(&self) -> PushQueueConfig {
        PushQueueConfig {
            capacity: self.push_queue_capacity,
            max_retries: self.push_max_retries,
            ..PushQueueConfig::default()
        }
    }

    /// Period of the cleanup task; deferred persistence flushes at least as
    /// often as the debounce asks.
    pub fn cleanup_period(&self) -> Duration {
        let secs = match self.cache_persist_debounce {
            0 => self.cleanup_interval,
            debounce => debounce.min(self.cleanup_interval),
        };
        Duration::from_secs(secs.max(1))
    }

    pub fn optimizer_period(&self) -> Duration {
        Duration::from_secs(self.optimizer_interval.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            telegram_api_url: "https://api.telegram.org".to_string(),
            admin_ids: Vec::new(),
            management_group_id: None,
            channel_ids: Vec::new(),
            group_ids: Vec::new(),
            server_port: 3000,
            cache_dir: PathBuf::from("./cache"),
            cache_persistence: true,
            cache_persist_debounce: 0,
            cleanup_interval: 300,
            optimizer_interval: 300,
            adaptive_cache: true,
            push_queue_capacity: 1000,
            push_max_retries: 3,
            queue_wxpusher: false,
            pushplus_token: None,
            pushplus_topic: None,
            wxpusher_token: None,
            pushplus_api_url: None,
            wxpusher_api_url: None,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated ids; items that do not parse are skipped.
fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|item| item.trim().parse().ok())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
