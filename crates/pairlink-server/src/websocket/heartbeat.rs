//! Heartbeat liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::registry::Session;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No inbound frame for the whole timeout window.
    TimedOut,
    /// The connection ended first.
    Cancelled,
}

/// Watch a session's alive flag until it goes quiet or `cancel` fires.
///
/// Every `interval` the flag is checked and reset. After `timeout / interval`
/// consecutive quiet ticks (at least one) the session is considered dead.
pub async fn run_heartbeat(
    session: Arc<Session>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    let _ = ticker.tick().await;
    let interval_ms = interval.as_millis().max(1);
    let max_missed = (timeout.as_millis() / interval_ms).max(1);
    let mut missed: u128 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if session.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}
