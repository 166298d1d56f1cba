//! Cache Cleanup Task
//!
//! Background task that periodically removes expired entries from every
//! managed cache and flushes deferred persistence writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::CacheManager;

/// Spawns the cleanup loop.
///
/// Each tick sweeps expired entries and flushes dirty persistence files.
/// On cancellation the loop performs one last flush and exits, so awaiting
/// the returned handle guarantees nothing is left unwritten.
pub fn spawn_cleanup_task(
    caches: Arc<CacheManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "Starting cache cleanup task");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let report = caches.cleanup_all_expired();
            let removed = report.total();
            if removed > 0 {
                info!(removed, details = ?report.removed, "Cache cleanup removed expired entries");
            } else {
                debug!("Cache cleanup: no expired entries found");
            }

            let flushed = caches.flush_all();
            if flushed > 0 {
                debug!(flushed, "Flushed deferred cache writes");
            }
        }

        caches.flush_all();
        info!("Cache cleanup task stopped");
    })
}
