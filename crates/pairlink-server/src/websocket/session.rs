//! One client connection, from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge};
use pairlink_core::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use super::handler::handle_text;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::dispatch::Delivery;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use crate::registry::Registry;

/// How long the writer gets to flush queued frames and send Close after the
/// reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a connected client until either side hangs up.
///
/// 1. Registers a session and enqueues `Connected` as the first frame
/// 2. Spawns the writer, which drains the outbound queue and sends pings
/// 3. Spawns the heartbeat, which cancels the connection when it goes quiet
/// 4. Reads frames and hands text to the handler, one at a time
/// 5. Cancels everything and removes the session on any exit path
#[instrument(skip_all, fields(session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let (guard, mut outbound_rx) = registry.register(cancel.clone());
    let session = Arc::clone(guard.session());
    let _ = tracing::Span::current().record("session_id", session.id().as_str());

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let connected = Delivery::to(
        &session,
        ServerMessage::Connected {
            player: session.view(),
        },
    );
    if let Err(err) = connected.deliver() {
        error!(error = %err, "failed to encode Connected");
    }

    let (ws_tx, mut ws_rx) = ws.split();

    let ping_interval = config.heartbeat_interval();
    let mut writer = tokio::spawn(
        run_writer(ws_tx, outbound_rx, ping_interval, cancel.clone()).in_current_span(),
    );

    let heartbeat_session = session.clone();
    let heartbeat_cancel = cancel.clone();
    let (interval, timeout) = (config.heartbeat_interval(), config.heartbeat_timeout());
    let heartbeat = tokio::spawn(
        async move {
            let result =
                run_heartbeat(heartbeat_session, interval, timeout, heartbeat_cancel.clone()).await;
            if result == HeartbeatResult::TimedOut {
                warn!(?timeout, "client unresponsive, disconnecting");
                heartbeat_cancel.cancel();
            }
        }
        .in_current_span(),
    );

    loop {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            () = cancel.cancelled() => break,
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                debug!(error = %err, "websocket read failed");
                break;
            }
            None => break,
        };

        session.mark_alive();
        match msg {
            Message::Text(text) => {
                let _ = handle_text(text.as_str(), &session, &registry);
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = handle_text(text, &session, &registry);
                }
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    cancel.cancel();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    let _ = heartbeat.await;
    drop(guard);

    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(
        duration_secs = started.elapsed().as_secs(),
        dropped_frames = session.drop_count(),
        "client disconnected"
    );
}

/// Drain the outbound queue onto the socket and ping every `ping_interval`.
///
/// On cancel, frames already queued are flushed before Close. A failed send
/// cancels the connection.
async fn run_writer<S>(
    mut sink: S,
    mut outbound_rx: mpsc::Receiver<Arc<str>>,
    ping_interval: Duration,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_interval);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            () = cancel.cancelled() => {
                while let Ok(frame) = outbound_rx.try_recv() {
                    if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    // A dead socket stops the reader too.
    cancel.cancel();
}
