//! Routes decoded client messages to registry operations.
//!
//! Every registry call returns the resulting state or a domain error. That
//! result is turned into an outbound [`ServerMessage`] and the list of
//! sessions that should receive it.

use std::sync::Arc;

use metrics::counter;
use pairlink_core::{ClientMessage, LobbyError, ProtocolError, ServerMessage};
use tracing::{debug, info};

use crate::metrics::{LOBBY_JOIN_FAILURES_TOTAL, LOBBY_JOINS_TOTAL};
use crate::registry::{Registry, Session};

/// An outbound message and its recipients.
#[derive(Debug)]
pub struct Delivery {
    /// Sessions to enqueue the message on.
    pub recipients: Vec<Arc<Session>>,
    /// The message itself.
    pub message: ServerMessage,
}

impl Delivery {
    /// Address `message` to a single session.
    pub fn to(session: &Arc<Session>, message: ServerMessage) -> Self {
        Self {
            recipients: vec![Arc::clone(session)],
            message,
        }
    }

    /// Encode once and enqueue on every recipient.
    ///
    /// Returns how many recipients accepted the frame.
    pub fn deliver(&self) -> Result<usize, ProtocolError> {
        let frame: Arc<str> = Arc::from(self.message.encode()?);
        let accepted = self
            .recipients
            .iter()
            .filter(|session| session.send(Arc::clone(&frame)))
            .count();
        debug!(
            kind = %self.message.kind(),
            recipients = self.recipients.len(),
            accepted,
            "message delivered"
        );
        Ok(accepted)
    }
}

/// Apply `message` from `session` and return what to send, if anything.
pub fn route(registry: &Registry, session: &Arc<Session>, message: ClientMessage) -> Option<Delivery> {
    match message {
        ClientMessage::CreateLobby { profile } => Some(
            match registry.create_lobby(session, &profile) {
                Ok(lobby) => Delivery::to(session, ServerMessage::LobbyCreated { lobby }),
                Err(err) => failure(session, &err),
            },
        ),
        ClientMessage::JoinLobby { profile, code } => Some(
            match registry.join_lobby(session, &profile, &code) {
                Ok(joined) => {
                    counter!(LOBBY_JOINS_TOTAL).increment(1);
                    Delivery {
                        recipients: joined.members,
                        message: ServerMessage::LobbyJoined {
                            lobby: joined.lobby,
                        },
                    }
                }
                Err(err) => failure(session, &err),
            },
        ),
        ClientMessage::PlayerQuit => {
            if registry.remove_session(session.id()).is_some() {
                info!(session_id = %session.id(), "player quit");
            }
            None
        }
    }
}

fn failure(session: &Arc<Session>, err: &LobbyError) -> Delivery {
    counter!(LOBBY_JOIN_FAILURES_TOTAL, "reason" => reason(err)).increment(1);
    debug!(session_id = %session.id(), error = %err, "lobby action rejected");
    Delivery::to(session, ServerMessage::error(err))
}

fn reason(err: &LobbyError) -> &'static str {
    match err {
        LobbyError::LobbyNotFound { .. } => "not_found",
        LobbyError::LobbyFull { .. } => "full",
        LobbyError::AlreadyInLobby { .. } => "already_in_lobby",
        LobbyError::SessionNotRegistered(_) => "not_registered",
        LobbyError::CodeSpaceExhausted { .. } => "code_space_exhausted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pairlink_core::{LobbyCode, PlayerProfile};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::registry::SessionGuard;

    fn connect(registry: &Arc<Registry>) -> (SessionGuard, mpsc::Receiver<Arc<str>>) {
        registry.register(CancellationToken::new())
    }

    fn profile(nickname: &str) -> PlayerProfile {
        PlayerProfile {
            nickname: nickname.into(),
            avatar_index: 0,
        }
    }

    fn next(rx: &mut mpsc::Receiver<Arc<str>>) -> ServerMessage {
        let frame = rx.try_recv().expect("frame queued");
        serde_json::from_str(&frame).unwrap()
    }

    fn create(registry: &Arc<Registry>, host: &SessionGuard) -> LobbyCode {
        let delivery = route(
            registry,
            host.session(),
            ClientMessage::CreateLobby {
                profile: profile("A"),
            },
        )
        .unwrap();
        let ServerMessage::LobbyCreated { lobby } = &delivery.message else {
            panic!("expected LobbyCreated, got {:?}", delivery.message);
        };
        let code = lobby.id.clone();
        assert_eq!(delivery.deliver().unwrap(), 1);
        code
    }

    #[test]
    fn create_replies_to_host_only() {
        let registry = Arc::new(Registry::default());
        let (a, mut ra) = connect(&registry);
        let (_b, mut rb) = connect(&registry);

        let code = create(&registry, &a);
        assert_matches!(next(&mut ra), ServerMessage::LobbyCreated { lobby } if lobby.id == code);
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn join_notifies_both_members_with_same_state() {
        let registry = Arc::new(Registry::default());
        let (a, mut ra) = connect(&registry);
        let (b, mut rb) = connect(&registry);
        let (_c, mut rc) = connect(&registry);
        let code = create(&registry, &a);
        let _ = next(&mut ra);

        let delivery = route(
            &registry,
            b.session(),
            ClientMessage::JoinLobby {
                profile: profile("B"),
                code: code.clone(),
            },
        )
        .unwrap();
        assert_eq!(delivery.deliver().unwrap(), 2);

        let to_host = next(&mut ra);
        let to_guest = next(&mut rb);
        assert_eq!(to_host, to_guest);
        assert_matches!(to_host, ServerMessage::LobbyJoined { lobby } => {
            assert_eq!(lobby.id, code);
            assert_eq!(lobby.players.len(), 2);
            assert!(lobby.players[0].is_host);
            assert_eq!(lobby.players[1].nickname, "B");
        });
        assert!(ra.try_recv().is_err());
        assert!(rb.try_recv().is_err());
        assert!(rc.try_recv().is_err());
    }

    #[test]
    fn join_failure_goes_to_joiner_only() {
        let registry = Arc::new(Registry::default());
        let (a, mut ra) = connect(&registry);
        let (b, _rb) = connect(&registry);
        let (c, mut rc) = connect(&registry);
        let code = create(&registry, &a);
        let _ = next(&mut ra);
        let _ = route(
            &registry,
            b.session(),
            ClientMessage::JoinLobby {
                profile: profile("B"),
                code: code.clone(),
            },
        )
        .unwrap()
        .deliver()
        .unwrap();
        let _ = next(&mut ra);

        let delivery = route(
            &registry,
            c.session(),
            ClientMessage::JoinLobby {
                profile: profile("C"),
                code: code.clone(),
            },
        )
        .unwrap();
        assert_eq!(delivery.recipients.len(), 1);
        let _ = delivery.deliver().unwrap();

        assert_eq!(
            next(&mut rc),
            ServerMessage::Error {
                message: format!("lobby with id {code} is already full"),
            }
        );
        assert!(ra.try_recv().is_err());
    }

    #[test]
    fn unknown_code_is_reported() {
        let registry = Arc::new(Registry::default());
        let (a, mut ra) = connect(&registry);
        let _ = route(
            &registry,
            a.session(),
            ClientMessage::JoinLobby {
                profile: profile("A"),
                code: LobbyCode::from("QQQQQQ"),
            },
        )
        .unwrap()
        .deliver()
        .unwrap();
        assert_eq!(
            next(&mut ra),
            ServerMessage::Error {
                message: "lobby with id QQQQQQ not found".into(),
            }
        );
    }

    #[test]
    fn quit_deregisters_without_reply() {
        let registry = Arc::new(Registry::default());
        let (a, mut ra) = connect(&registry);
        assert!(route(&registry, a.session(), ClientMessage::PlayerQuit).is_none());
        assert_eq!(registry.session_count(), 0);
        assert!(ra.try_recv().is_err());

        // Lobby actions after quitting are rejected.
        let delivery = route(
            &registry,
            a.session(),
            ClientMessage::CreateLobby {
                profile: profile("A"),
            },
        )
        .unwrap();
        assert_matches!(delivery.message, ServerMessage::Error { ref message } if message.contains("not registered"));
        assert_eq!(registry.lobby_count(), 0);
    }

    #[test]
    fn host_quit_closes_lobby() {
        let registry = Arc::new(Registry::default());
        let (a, _ra) = connect(&registry);
        let code = create(&registry, &a);
        let _ = route(&registry, a.session(), ClientMessage::PlayerQuit);
        assert!(registry.lobby(&code).is_none());
    }
}
