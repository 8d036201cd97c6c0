//! Session and lobby directory.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `session` | Per-client attributes and bounded outbound queue |
//! | `lobby` | Capacity-2 member list with its own lock and teardown rules |
//! | `codes` | Candidate join-code generation |
//!
//! ## Locking
//!
//! The registry mutex guards both maps. A lobby's mutex guards its member
//! list. The registry lock may be held while taking a lobby lock, never the
//! reverse; the join path releases the registry lock before taking the lobby
//! lock. Session mutexes are leaves. No lock is held across an `.await`.
//!
//! Operations on one session are serialized by that connection's reader, so
//! a session is never created into, joined, and removed concurrently with
//! itself.

pub mod codes;
pub mod lobby;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pairlink_core::{LobbyCode, LobbyError, LobbyView, PlayerProfile, SessionId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{BackpressurePolicy, ServerConfig};
use crate::metrics::{LOBBIES_CREATED_TOTAL, LOBBIES_REAPED_TOTAL};

pub use codes::{CodeSource, RandomCodes};
pub use lobby::{Departure, LOBBY_CAPACITY, Lobby};
pub use session::Session;

/// Candidates tried before `create_lobby` gives up.
pub const MAX_CODE_ATTEMPTS: usize = 64;

/// Per-session settings applied at registration.
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig {
    /// Outbound queue capacity.
    pub outbound_queue_capacity: usize,
    /// Full-queue policy.
    pub backpressure: BackpressurePolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for RegistryConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            outbound_queue_capacity: config.outbound_queue_capacity,
            backpressure: config.backpressure,
        }
    }
}

/// Result of a successful join.
#[derive(Debug)]
pub struct JoinedLobby {
    /// The complete lobby.
    pub lobby: LobbyView,
    /// Every member at the moment of the join, host first.
    pub members: Vec<Arc<Session>>,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Arc<Session>>,
    lobbies: HashMap<LobbyCode, Arc<Lobby>>,
}

/// Directory of active sessions and lobbies.
pub struct Registry {
    state: Mutex<RegistryState>,
    codes: Box<dyn CodeSource>,
    config: RegistryConfig,
}

impl Registry {
    /// Create an empty registry with random lobby codes.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_code_source(config, Box::new(RandomCodes))
    }

    /// Create an empty registry drawing codes from `codes`.
    pub fn with_code_source(config: RegistryConfig, codes: Box<dyn CodeSource>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            codes,
            config,
        }
    }

    /// Register a new session.
    ///
    /// The returned guard removes the session again when dropped, so any
    /// exit path of the connection releases it.
    pub fn register(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> (SessionGuard, mpsc::Receiver<Arc<str>>) {
        let (session, rx) = Session::channel(
            SessionId::new(),
            self.config.outbound_queue_capacity,
            self.config.backpressure,
            cancel,
        );
        let _ = self
            .state
            .lock()
            .sessions
            .insert(session.id().clone(), session.clone());
        debug!(session_id = %session.id(), "session registered");
        let guard = SessionGuard {
            registry: Arc::clone(self),
            session,
        };
        (guard, rx)
    }

    /// Create a lobby with `session` as host.
    pub fn create_lobby(
        &self,
        session: &Arc<Session>,
        profile: &PlayerProfile,
    ) -> Result<LobbyView, LobbyError> {
        let mut state = self.state.lock();
        Self::check_free(&state, session)?;
        let code = self.fresh_code(&state.lobbies)?;
        session.stamp(profile, true);

        let lobby = Arc::new(Lobby::with_host(code.clone(), session.clone()));
        let view = lobby.view();
        let _ = state.lobbies.insert(code.clone(), lobby);
        drop(state);

        counter!(LOBBIES_CREATED_TOTAL).increment(1);
        info!(session_id = %session.id(), lobby = %code, "lobby created");
        Ok(view)
    }

    /// Add `session` to the lobby identified by `code`.
    ///
    /// Neither failure mode mutates any lobby.
    pub fn join_lobby(
        &self,
        session: &Arc<Session>,
        profile: &PlayerProfile,
        code: &LobbyCode,
    ) -> Result<JoinedLobby, LobbyError> {
        let lobby = {
            let state = self.state.lock();
            Self::check_free(&state, session)?;
            session.stamp(profile, false);
            state.lobbies.get(code).cloned()
        };
        let Some(lobby) = lobby else {
            return Err(LobbyError::LobbyNotFound { code: code.clone() });
        };

        let (view, members) = lobby.try_join(session.clone())?;
        info!(session_id = %session.id(), lobby = %code, "lobby joined");
        Ok(JoinedLobby {
            lobby: view,
            members,
        })
    }

    /// Deregister a session and leave its lobby. Idempotent.
    ///
    /// A host leaving closes the lobby; a guest leaving reopens it.
    pub fn remove_session(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut state = self.state.lock();
        let session = state.sessions.remove(id)?;

        if let Some(code) = session.lobby() {
            if let Some(lobby) = state.lobbies.get(&code).cloned() {
                match lobby.remove_member(id) {
                    Departure::Closed { detached } => {
                        let _ = state.lobbies.remove(&code);
                        info!(
                            session_id = %id,
                            lobby = %code,
                            detached = detached.len(),
                            "lobby closed"
                        );
                    }
                    Departure::Reopened => {
                        debug!(session_id = %id, lobby = %code, "guest left, lobby reopened");
                    }
                    Departure::NotMember => {}
                }
            }
        }
        debug!(session_id = %id, "session removed");
        Some(session)
    }

    /// Close lobbies with no joins or departures for at least `max_idle`.
    pub fn reap_idle_lobbies(&self, max_idle: Duration) -> usize {
        let mut state = self.state.lock();
        let idle: Vec<LobbyCode> = state
            .lobbies
            .iter()
            .filter(|(_, lobby)| lobby.idle_for() >= max_idle)
            .map(|(code, _)| code.clone())
            .collect();

        for code in &idle {
            if let Some(lobby) = state.lobbies.remove(code) {
                let detached = lobby.close();
                info!(lobby = %code, detached = detached.len(), "idle lobby reaped");
            }
        }
        counter!(LOBBIES_REAPED_TOTAL).increment(idle.len() as u64);
        idle.len()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of active lobbies.
    pub fn lobby_count(&self) -> usize {
        self.state.lock().lobbies.len()
    }

    /// Look up a session.
    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.state.lock().sessions.get(id).cloned()
    }

    /// Look up a lobby.
    pub fn lobby(&self, code: &LobbyCode) -> Option<Arc<Lobby>> {
        self.state.lock().lobbies.get(code).cloned()
    }

    fn check_free(state: &RegistryState, session: &Session) -> Result<(), LobbyError> {
        if !state.sessions.contains_key(session.id()) {
            return Err(LobbyError::SessionNotRegistered(session.id().clone()));
        }
        if let Some(code) = session.lobby() {
            return Err(LobbyError::AlreadyInLobby { code });
        }
        Ok(())
    }

    fn fresh_code(
        &self,
        lobbies: &HashMap<LobbyCode, Arc<Lobby>>,
    ) -> Result<LobbyCode, LobbyError> {
        for attempt in 0..MAX_CODE_ATTEMPTS {
            let code = self.codes.next_code();
            if !lobbies.contains_key(&code) {
                return Ok(code);
            }
            debug!(lobby = %code, attempt, "lobby code collision");
        }
        Err(LobbyError::CodeSpaceExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Registry entry for one connection, released on drop.
pub struct SessionGuard {
    registry: Arc<Registry>,
    session: Arc<Session>,
}

impl SessionGuard {
    /// The guarded session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.remove_session(self.session.id()).is_some() {
            debug!(session_id = %self.session.id(), "session reaped on teardown");
        }
    }
}
