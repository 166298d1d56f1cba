//! Smart Cache Optimizer Task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{current_timestamp, SmartCache};

/// Spawns the loop that runs one optimization cycle per `interval`.
pub fn spawn_optimizer_task(
    smart: Arc<SmartCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "Starting smart cache optimizer");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let cycle = smart.run_optimization_cycle(current_timestamp());
            debug!(
                hot = cycle.hot_keys.len(),
                cold = cycle.cold_keys.len(),
                "Access pattern analysis"
            );
        }

        info!("Smart cache optimizer stopped");
    })
}
