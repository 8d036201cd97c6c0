//! Per-client session state and its bounded outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use metrics::counter;
use pairlink_core::{LobbyCode, PlayerProfile, PlayerView, SessionId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::BackpressurePolicy;
use crate::metrics::OUTBOUND_DROPS_TOTAL;

#[derive(Debug, Default)]
struct Profile {
    nickname: String,
    avatar_index: u32,
    is_host: bool,
}

/// One connected client.
///
/// The registry holds it for lookup; the connection's writer loop owns the
/// receiving end of its queue.
pub struct Session {
    id: SessionId,
    profile: Mutex<Profile>,
    /// Lobby this session belongs to. Only written while that lobby's lock is held.
    lobby: Mutex<Option<LobbyCode>>,
    tx: mpsc::Sender<Arc<str>>,
    policy: BackpressurePolicy,
    cancel: CancellationToken,
    is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl Session {
    /// Create a session with an outbound queue of `capacity` frames.
    ///
    /// `cancel` is the connection's token: it is cancelled when the
    /// `Disconnect` policy trips.
    pub fn channel(
        id: SessionId,
        capacity: usize,
        policy: BackpressurePolicy,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            id,
            profile: Mutex::new(Profile::default()),
            lobby: Mutex::new(None),
            tx,
            policy,
            cancel,
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        };
        (Arc::new(session), rx)
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Stamp display attributes from a lobby action.
    pub fn stamp(&self, profile: &PlayerProfile, is_host: bool) {
        let mut p = self.profile.lock();
        p.nickname.clone_from(&profile.nickname);
        p.avatar_index = profile.avatar_index;
        p.is_host = is_host;
    }

    /// Whether this session created the lobby it belongs to.
    pub fn is_host(&self) -> bool {
        self.profile.lock().is_host
    }

    /// Public attributes as sent to clients.
    pub fn view(&self) -> PlayerView {
        let p = self.profile.lock();
        PlayerView {
            id: self.id.clone(),
            nickname: p.nickname.clone(),
            avatar_index: p.avatar_index,
            is_host: p.is_host,
        }
    }

    /// Lobby this session currently belongs to.
    pub fn lobby(&self) -> Option<LobbyCode> {
        self.lobby.lock().clone()
    }

    pub(crate) fn set_lobby(&self, code: Option<LobbyCode>) {
        *self.lobby.lock() = code;
    }

    /// Leave the current lobby and drop the host flag with it.
    pub(crate) fn detach(&self) {
        self.set_lobby(None);
        self.profile.lock().is_host = false;
    }

    /// Enqueue a serialized frame without blocking.
    ///
    /// Returns `false` if the frame was not queued. A full queue counts a
    /// drop and, under [`BackpressurePolicy::Disconnect`], cancels the
    /// connection.
    pub fn send(&self, frame: Arc<str>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                counter!(OUTBOUND_DROPS_TOTAL).increment(1);
                match self.policy {
                    BackpressurePolicy::Disconnect => {
                        warn!(
                            session_id = %self.id,
                            frame_len = frame.len(),
                            "outbound queue full, disconnecting session"
                        );
                        self.cancel.cancel();
                    }
                    BackpressurePolicy::DropNewest => {
                        warn!(
                            session_id = %self.id,
                            frame_len = frame.len(),
                            "outbound queue full, dropping frame"
                        );
                    }
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Total frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// The connection's cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the client was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("lobby", &self.lobby())
            .finish_non_exhaustive()
    }
}
