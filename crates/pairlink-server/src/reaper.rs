//! Background task that closes idle lobbies.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::Registry;

/// Every `interval`, close lobbies idle for at least `max_idle`.
///
/// Stops when `cancel` fires.
pub fn spawn_lobby_reaper(
    registry: Arc<Registry>,
    interval: Duration,
    max_idle: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick is immediate.
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = registry.reap_idle_lobbies(max_idle);
                    if reaped > 0 {
                        info!(reaped, remaining = registry.lobby_count(), "reaped idle lobbies");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
        debug!("lobby reaper stopped");
    })
}
