//! Background flush and reconciliation task.

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::SyncEngine;
use crate::transport::Transport;

/// Spawn the task that flushes debounced edits every `debounce_interval` and
/// runs a sync cycle every `sync_interval`. Cancel the returned token to stop
/// it.
pub fn spawn_background<T: Transport + 'static>(engine: Arc<SyncEngine<T>>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        run_background_loop(engine, token).await;
    });
    cancel
}

async fn run_background_loop<T: Transport>(engine: Arc<SyncEngine<T>>, cancel: CancellationToken) {
    let mut debounce = interval(engine.config().debounce_interval);
    debounce.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sync = interval(engine.config().sync_interval);
    sync.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        debounce_ms = engine.config().debounce_interval.as_millis() as u64,
        sync_ms = engine.config().sync_interval.as_millis() as u64,
        "sync background task started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("sync background task shutting down");
                break;
            }
            _ = debounce.tick() => {
                engine.flush_debounced();
            }
            _ = sync.tick() => {
                if let Err(e) = engine.sync().await {
                    warn!(error = %e, "sync cycle failed");
                }
            }
        }
    }
}
