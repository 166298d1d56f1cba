//! Push Queue Module
//!
//! Bounded FIFO of push notifications drained by a single worker task.
//! Failed deliveries back off exponentially and rejoin the back of the queue
//! until their retry budget is spent. Shutdown gives every message still
//! queued one final attempt before the worker exits.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{BotError, Result};
use crate::push::{PushMessage, PushSender, PushStatus, DEFAULT_MAX_RETRIES};

// == Config ==
#[derive(Debug, Clone)]
pub struct PushQueueConfig {
    /// Maximum number of queued messages
    pub capacity: usize,
    /// Retry `n` waits `backoff_base * 2^n`
    pub backoff_base: Duration,
    /// Default retry budget for `queue_push`
    pub max_retries: u32,
    /// Finished messages kept for `outcome` lookups
    pub history_limit: usize,
}

impl Default for PushQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            backoff_base: Duration::from_secs(1),
            max_retries: DEFAULT_MAX_RETRIES,
            history_limit: 1000,
        }
    }
}

// == Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushQueueStats {
    /// Messages accepted by `add_message`
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
    /// Attempts that failed and were scheduled again
    pub retried: u64,
    /// Messages refused because the queue was full or closed
    pub rejected: u64,
    /// Messages currently waiting in the channel
    pub depth: usize,
}

#[derive(Debug)]
struct Shared {
    stats: Mutex<PushQueueStats>,
    history: Mutex<VecDeque<PushMessage>>,
    history_limit: usize,
}

impl Shared {
    fn stats(&self) -> MutexGuard<'_, PushQueueStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish(&self, message: PushMessage) {
        {
            let mut stats = self.stats();
            match message.status {
                PushStatus::Sent => stats.sent += 1,
                _ => stats.failed += 1,
            }
        }

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(message);
    }
}

// == Push Queue ==
/// Handle to the queue and its worker.
pub struct PushQueue {
    tx: mpsc::Sender<PushMessage>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    default_max_retries: u32,
}

impl std::fmt::Debug for PushQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushQueue")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl PushQueue {
    /// Creates the queue and spawns its worker on the current runtime.
    pub fn start(sender: Arc<dyn PushSender>, config: PushQueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let shared = Arc::new(Shared {
            stats: Mutex::new(PushQueueStats::default()),
            history: Mutex::new(VecDeque::new()),
            history_limit: config.history_limit.max(1),
        });
        let cancel = CancellationToken::new();

        let worker = Worker {
            rx,
            tx: tx.clone(),
            sender,
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
            backoff_base: config.backoff_base,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            tx,
            shared,
            cancel,
            worker: Mutex::new(Some(handle)),
            default_max_retries: config.max_retries,
        }
    }

    // == Enqueue ==
    /// Enqueues without waiting. Returns false when the queue is full or
    /// already shut down.
    pub fn add_message(&self, message: PushMessage) -> bool {
        let id = message.id;
        match self.tx.try_send(message) {
            Ok(()) => {
                self.shared.stats().queued += 1;
                info!(message_id = %id, "Push message queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                self.shared.stats().rejected += 1;
                warn!(message_id = %id, "Push queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.shared.stats().rejected += 1;
                warn!(message_id = %id, "Push queue stopped, message dropped");
                false
            }
        }
    }

    /// Builds and enqueues a message, returning its id.
    pub fn queue_push(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        uids: Option<Vec<String>>,
        max_retries: Option<u32>,
    ) -> Result<Uuid> {
        let message = PushMessage::new(title, content)
            .with_uids(uids)
            .with_max_retries(max_retries.unwrap_or(self.default_max_retries));
        let id = message.id;

        if self.add_message(message) {
            Ok(id)
        } else {
            Err(BotError::QueueFull)
        }
    }

    // == Observability ==
    pub fn stats(&self) -> PushQueueStats {
        let mut stats = self.shared.stats().clone();
        stats.depth = self.tx.max_capacity() - self.tx.capacity();
        stats
    }

    /// Final state of a recently finished message.
    pub fn outcome(&self, id: Uuid) -> Option<PushMessage> {
        self.shared
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|m| m.id == id)
            .cloned()
    }

    // == Shutdown ==
    /// Stops the worker after one final attempt for every queued message.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Push queue worker ended abnormally");
            }
        }
    }
}

/// The worker holds its own sender, so the channel never closes on its
/// own; dropping the handle cancels the worker instead.
impl Drop for PushQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// == Worker ==
struct Worker {
    rx: mpsc::Receiver<PushMessage>,
    /// Used to put retried messages back at the tail
    tx: mpsc::Sender<PushMessage>,
    sender: Arc<dyn PushSender>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    backoff_base: Duration,
}

impl Worker {
    async fn run(mut self) {
        info!(provider = self.sender.name(), "Push queue worker started");

        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(message) => message,
                    None => break,
                },
            };
            self.process(message).await;
        }

        self.rx.close();
        let mut drained = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.final_attempt(message).await;
            drained += 1;
        }
        info!(drained, "Push queue worker stopped");
    }

    async fn process(&self, mut message: PushMessage) {
        message.mark_attempt();
        let error = match self.deliver(&message).await {
            Ok(()) => {
                message.mark_sent();
                info!(message_id = %message.id, "Push message sent");
                self.shared.finish(message);
                return;
            }
            Err(e) => e,
        };

        if !message.record_failure(error.to_string()) {
            error!(
                message_id = %message.id,
                retries = message.retry_count,
                error = %error,
                "Push message failed, retries exhausted"
            );
            self.shared.finish(message);
            return;
        }

        self.shared.stats().retried += 1;
        let delay = self.backoff(message.retry_count);
        warn!(
            message_id = %message.id,
            retry_count = message.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Push message failed, will retry"
        );

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.final_attempt(message).await;
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(mut message)) | Err(TrySendError::Closed(mut message)) => {
                error!(message_id = %message.id, "Push queue full, retry dropped");
                message.mark_failed("push queue full on retry");
                self.shared.finish(message);
            }
        }
    }

    /// One last delivery during shutdown; a failure is terminal.
    async fn final_attempt(&self, mut message: PushMessage) {
        message.mark_attempt();
        match self.deliver(&message).await {
            Ok(()) => {
                message.mark_sent();
                info!(message_id = %message.id, "Push message sent during shutdown");
            }
            Err(e) => {
                message.retry_count += 1;
                message.mark_failed(e.to_string());
                warn!(message_id = %message.id, error = %e, "Push message failed during shutdown");
            }
        }
        self.shared.finish(message);
    }

    async fn deliver(&self, message: &PushMessage) -> Result<()> {
        self.sender
            .send(&message.title, &message.content, message.uids.as_deref())
            .await
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(retry_count))
    }
}
