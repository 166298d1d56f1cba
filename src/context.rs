//! Process Context Module
//!
//! Owns every long-lived component and the background tasks that serve
//! them. Built once at startup and torn down explicitly at shutdown.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::{AdaptiveSettings, CacheManager, SmartCache};
use crate::config::Config;
use crate::notify::{BotTransport, Notifier};
use crate::push::{PushPlusClient, PushQueue, WxPusherClient};
use crate::store::{store_prefetcher, CachedStore, SubmissionStore};
use crate::tasks::{spawn_cleanup_task, spawn_optimizer_task};

pub struct AppContext {
    pub config: Config,
    pub caches: Arc<CacheManager>,
    pub smart: Arc<SmartCache>,
    pub store: Arc<CachedStore>,
    pub push_queue: Arc<PushQueue>,
    pub pushplus: Arc<PushPlusClient>,
    pub wxpusher: Arc<WxPusherClient>,
    pub notifier: Arc<Notifier>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// Builds all components on top of `store` and `transport` and spawns
    /// the background tasks. Must be called inside a tokio runtime.
    pub fn start(
        config: Config,
        store: Arc<dyn SubmissionStore>,
        transport: Arc<dyn BotTransport>,
    ) -> Self {
        let caches = Arc::new(CacheManager::new(&config.cache_manager_config()));
        let smart = Arc::new(SmartCache::new(
            caches.clone(),
            Arc::new(store_prefetcher(store.clone())),
            AdaptiveSettings::default(),
        ));
        let mut cached = CachedStore::new(store, caches.clone());
        if config.adaptive_cache {
            cached = cached.with_smart(smart.clone());
        }
        let store = Arc::new(cached);

        let mut pushplus =
            PushPlusClient::new(config.pushplus_token.clone(), config.pushplus_topic.clone());
        if let Some(url) = &config.pushplus_api_url {
            pushplus = pushplus.with_base_url(url.as_str());
        }
        let pushplus = Arc::new(pushplus);

        let mut wxpusher = WxPusherClient::new(config.wxpusher_token.clone());
        if let Some(url) = &config.wxpusher_api_url {
            wxpusher = wxpusher.with_base_url(url.as_str());
        }
        let wxpusher = Arc::new(wxpusher);
        let push_queue = Arc::new(PushQueue::start(wxpusher.clone(), config.push_queue_config()));

        let notifier = Arc::new(
            Notifier::new(store.clone(), transport, config.admin_ids.clone())
                .with_management_group(config.management_group_id)
                .with_publish_targets(&config.channel_ids, &config.group_ids)
                .with_pushplus(pushplus.clone())
                .with_wxpusher(wxpusher.clone())
                .with_push_queue(push_queue.clone(), config.queue_wxpusher),
        );

        let cancel = CancellationToken::new();
        let mut tasks = vec![spawn_cleanup_task(
            caches.clone(),
            config.cleanup_period(),
            cancel.child_token(),
        )];
        if config.adaptive_cache {
            tasks.push(spawn_optimizer_task(
                smart.clone(),
                config.optimizer_period(),
                cancel.child_token(),
            ));
        }

        info!(
            admins = config.admin_ids.len(),
            pushplus = pushplus.is_configured(),
            wxpusher = wxpusher.is_configured(),
            adaptive_cache = config.adaptive_cache,
            "Application context started"
        );

        Self {
            config,
            caches,
            smart,
            store,
            push_queue,
            pushplus,
            wxpusher,
            notifier,
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    /// Stops background tasks, drains the push queue and flushes caches.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task ended abnormally");
            }
        }

        self.push_queue.shutdown().await;
        let flushed = self.caches.flush_all();
        info!(flushed, "Application context stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
