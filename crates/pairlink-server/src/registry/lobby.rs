//! Capacity-2 lobby.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pairlink_core::{LobbyCode, LobbyError, LobbyView, SessionId};
use parking_lot::Mutex;

use super::session::Session;

/// Maximum number of members in a lobby.
pub const LOBBY_CAPACITY: usize = 2;

struct LobbyState {
    /// Join order; index 0 is the host.
    members: Vec<Arc<Session>>,
    /// Set once the lobby is torn down; a closed lobby accepts no joins.
    closed: bool,
    last_activity: Instant,
}

/// What happened to a lobby when a member left.
#[derive(Debug)]
pub enum Departure {
    /// The host left or the lobby emptied: the lobby is closed and the
    /// remaining members were detached.
    Closed {
        /// Members detached by the teardown.
        detached: Vec<Arc<Session>>,
    },
    /// A guest left; the lobby has its host only and is joinable again.
    Reopened,
    /// The session was not a member.
    NotMember,
}

/// A two-player group identified by a short code.
///
/// The member list has its own lock so a join never holds the registry-wide
/// lock while appending.
pub struct Lobby {
    code: LobbyCode,
    state: Mutex<LobbyState>,
}

impl Lobby {
    pub(crate) fn with_host(code: LobbyCode, host: Arc<Session>) -> Self {
        host.set_lobby(Some(code.clone()));
        Self {
            code,
            state: Mutex::new(LobbyState {
                members: vec![host],
                closed: false,
                last_activity: Instant::now(),
            }),
        }
    }

    /// Append `session` if there is room.
    ///
    /// On success returns the complete view and the members to notify, both
    /// taken under the same lock acquisition.
    pub(crate) fn try_join(
        &self,
        session: Arc<Session>,
    ) -> Result<(LobbyView, Vec<Arc<Session>>), LobbyError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LobbyError::LobbyNotFound {
                code: self.code.clone(),
            });
        }
        if state.members.len() >= LOBBY_CAPACITY {
            return Err(LobbyError::LobbyFull {
                code: self.code.clone(),
            });
        }
        session.set_lobby(Some(self.code.clone()));
        state.members.push(session);
        state.last_activity = Instant::now();
        Ok((self.view_locked(&state), state.members.clone()))
    }

    /// Remove a member and apply teardown rules.
    pub(crate) fn remove_member(&self, id: &SessionId) -> Departure {
        let mut state = self.state.lock();
        let Some(index) = state.members.iter().position(|m| m.id() == id) else {
            return Departure::NotMember;
        };
        let leaving = state.members.remove(index);
        leaving.detach();
        state.last_activity = Instant::now();

        if index == 0 || state.members.is_empty() {
            Departure::Closed {
                detached: Self::close_locked(&mut state),
            }
        } else {
            Departure::Reopened
        }
    }

    /// Close the lobby and detach every member.
    pub(crate) fn close(&self) -> Vec<Arc<Session>> {
        Self::close_locked(&mut self.state.lock())
    }

    fn close_locked(state: &mut LobbyState) -> Vec<Arc<Session>> {
        state.closed = true;
        let detached: Vec<_> = state.members.drain(..).collect();
        for member in &detached {
            member.detach();
        }
        detached
    }

    fn view_locked(&self, state: &LobbyState) -> LobbyView {
        LobbyView {
            id: self.code.clone(),
            players: state.members.iter().map(|m| m.view()).collect(),
        }
    }

    /// Current view.
    pub fn view(&self) -> LobbyView {
        self.view_locked(&self.state.lock())
    }

    /// Current members in join order.
    pub fn members(&self) -> Vec<Arc<Session>> {
        self.state.lock().members.clone()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.state.lock().members.len()
    }

    /// Whether the lobby has no members (only true once closed).
    pub fn is_empty(&self) -> bool {
        self.state.lock().members.is_empty()
    }

    /// Time since the last join or departure.
    pub fn idle_for(&self) -> Duration {
        self.state.lock().last_activity.elapsed()
    }
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("code", &self.code)
            .field("members", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackpressurePolicy;
    use assert_matches::assert_matches;
    use pairlink_core::PlayerProfile;
    use tokio_util::sync::CancellationToken;

    fn session(nickname: &str, is_host: bool) -> Arc<Session> {
        let (s, _rx) = Session::channel(
            SessionId::new(),
            8,
            BackpressurePolicy::Disconnect,
            CancellationToken::new(),
        );
        s.stamp(
            &PlayerProfile {
                nickname: nickname.into(),
                avatar_index: 0,
            },
            is_host,
        );
        s
    }

    fn code() -> LobbyCode {
        LobbyCode::from("ABCDEF")
    }

    #[test]
    fn created_with_host_only() {
        let host = session("A", true);
        let lobby = Lobby::with_host(code(), host.clone());
        assert_eq!(lobby.len(), 1);
        assert_eq!(host.lobby(), Some(code()));
        assert_eq!(lobby.view().players[0].nickname, "A");
    }

    #[test]
    fn join_appends_in_order() {
        let host = session("A", true);
        let guest = session("B", false);
        let lobby = Lobby::with_host(code(), host);
        let (view, recipients) = lobby.try_join(guest.clone()).unwrap();
        assert_eq!(view.players.len(), 2);
        assert!(view.players[0].is_host);
        assert!(!view.players[1].is_host);
        assert_eq!(recipients.len(), 2);
        assert_eq!(guest.lobby(), Some(code()));
    }

    #[test]
    fn third_member_is_rejected() {
        let lobby = Lobby::with_host(code(), session("A", true));
        let _ = lobby.try_join(session("B", false)).unwrap();
        let third = session("C", false);
        assert_matches!(
            lobby.try_join(third.clone()),
            Err(LobbyError::LobbyFull { .. })
        );
        assert_eq!(lobby.len(), 2);
        assert!(third.lobby().is_none());
    }

    #[test]
    fn closed_lobby_rejects_join_as_not_found() {
        let lobby = Lobby::with_host(code(), session("A", true));
        let _ = lobby.close();
        assert_matches!(
            lobby.try_join(session("B", false)),
            Err(LobbyError::LobbyNotFound { .. })
        );
    }

    #[test]
    fn host_departure_closes_and_detaches_guest() {
        let host = session("A", true);
        let guest = session("B", false);
        let lobby = Lobby::with_host(code(), host.clone());
        let _ = lobby.try_join(guest.clone()).unwrap();

        let departure = lobby.remove_member(host.id());
        assert_matches!(departure, Departure::Closed { detached } if detached.len() == 1);
        assert!(lobby.is_empty());
        assert!(host.lobby().is_none());
        assert!(guest.lobby().is_none());
        assert!(!host.is_host());
        assert_matches!(
            lobby.try_join(session("C", false)),
            Err(LobbyError::LobbyNotFound { .. })
        );
    }

    #[test]
    fn guest_departure_reopens() {
        let host = session("A", true);
        let guest = session("B", false);
        let lobby = Lobby::with_host(code(), host.clone());
        let _ = lobby.try_join(guest.clone()).unwrap();

        assert_matches!(lobby.remove_member(guest.id()), Departure::Reopened);
        assert_eq!(lobby.len(), 1);
        assert!(guest.lobby().is_none());
        assert_eq!(host.lobby(), Some(code()));
        assert!(host.is_host());

        assert!(lobby.try_join(session("C", false)).is_ok());
    }

    #[test]
    fn close_clears_host_flag() {
        let host = session("A", true);
        let lobby = Lobby::with_host(code(), host.clone());
        let detached = lobby.close();
        assert_eq!(detached.len(), 1);
        assert!(!host.is_host());
        assert!(host.lobby().is_none());
    }

    #[test]
    fn removing_stranger_is_not_member() {
        let lobby = Lobby::with_host(code(), session("A", true));
        let stranger = session("Z", false);
        assert_matches!(lobby.remove_member(stranger.id()), Departure::NotMember);
        assert_eq!(lobby.len(), 1);
    }

    #[test]
    fn idle_time_resets_on_join() {
        let lobby = Lobby::with_host(code(), session("A", true));
        std::thread::sleep(Duration::from_millis(10));
        let before = lobby.idle_for();
        let _ = lobby.try_join(session("B", false)).unwrap();
        assert!(lobby.idle_for() < before);
    }
}
