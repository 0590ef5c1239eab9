//! Background maintenance loops: compaction and the object-count poll.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::ObjectStore;
use crate::config::BackendConfig;

/// Spawns the maintenance loops configured in `config`. Each loop runs until
/// `cancel` fires. Compaction is skipped entirely when the configured
/// interval is zero.
pub fn spawn_maintenance(
    store: &Arc<ObjectStore>,
    config: &BackendConfig,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    if let Some(every) = config.compaction_interval() {
        handles.push(tokio::spawn(run_compaction_loop(
            Arc::clone(store),
            every,
            cancel.clone(),
        )));
    }
    handles.push(tokio::spawn(run_count_poll_loop(
        Arc::clone(store),
        config.count_poll_period(),
        cancel.clone(),
    )));
    handles
}

/// Periodically asks the backend to sweep expired entries.
pub async fn run_compaction_loop(
    store: Arc<ObjectStore>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match store.compact().await {
                    Ok(0) => {}
                    Ok(pruned) => debug!("compaction pruned {} expired entries", pruned),
                    Err(e) => warn!("compaction failed: {:?}", e),
                }
            }
        }
    }
    debug!("compaction loop for {} stopped", store.prefix());
}

/// Periodically feeds the live object count into the stored-objects metric.
pub async fn run_count_poll_loop(
    store: Arc<ObjectStore>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                store.feed_object_count().await;
            }
        }
    }
    debug!("count poll loop for {} stopped", store.prefix());
}
