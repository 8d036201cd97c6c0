//! Inbound frame handling: decode, route, deliver.

use std::sync::Arc;

use metrics::counter;
use pairlink_core::{ClientMessage, MessageType};
use tracing::{debug, error, instrument, warn};

use crate::dispatch;
use crate::metrics::MALFORMED_FRAMES_TOTAL;
use crate::registry::{Registry, Session};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A reply was enqueued on `accepted` recipients.
    Delivered {
        /// Type of the reply.
        kind: MessageType,
        /// Recipients whose queue took the frame.
        accepted: usize,
    },
    /// Handled; nothing to send.
    NoReply,
    /// The frame did not decode and was dropped.
    Discarded,
    /// The reply could not be encoded.
    EncodeFailed,
}

/// Handle one text frame from `session`.
///
/// Undecodable frames are logged and dropped; the sender gets no reply and
/// the connection stays open.
#[instrument(skip_all, fields(session_id = %session.id()))]
pub fn handle_text(text: &str, session: &Arc<Session>, registry: &Registry) -> HandleOutcome {
    let message = match ClientMessage::decode(text) {
        Ok(message) => message,
        Err(err) => {
            counter!(MALFORMED_FRAMES_TOTAL).increment(1);
            warn!(error = %err, len = text.len(), "discarding undecodable frame");
            return HandleOutcome::Discarded;
        }
    };
    debug!(kind = %message.kind(), "dispatching message");

    let Some(delivery) = dispatch::route(registry, session, message) else {
        return HandleOutcome::NoReply;
    };
    match delivery.deliver() {
        Ok(accepted) => HandleOutcome::Delivered {
            kind: delivery.message.kind(),
            accepted,
        },
        Err(err) => {
            error!(error = %err, "failed to encode reply");
            HandleOutcome::EncodeFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<Registry>, crate::registry::SessionGuard, tokio::sync::mpsc::Receiver<Arc<str>>) {
        let registry = Arc::new(Registry::default());
        let (guard, rx) = registry.register(CancellationToken::new());
        (registry, guard, rx)
    }

    #[test]
    fn create_lobby_frame_is_delivered() {
        let (registry, guard, mut rx) = setup();
        let frame = r#"{"type":"CreateLobby","payload":{"player":{"nickname":"A","avatarIdx":0}}}"#;
        assert_eq!(
            handle_text(frame, guard.session(), &registry),
            HandleOutcome::Delivered {
                kind: MessageType::LobbyCreated,
                accepted: 1
            }
        );
        let reply: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(reply["type"], "LobbyCreated");
        assert_eq!(reply["payload"]["lobby"]["players"][0]["nickname"], "A");
        assert_eq!(reply["payload"]["lobby"]["players"][0]["isHost"], true);
    }

    #[test]
    fn garbage_is_discarded_silently() {
        let (registry, guard, mut rx) = setup();
        for frame in ["not json", "[1,2]", r#"{"payload":{}}"#, r#"{"type":"Nope"}"#] {
            assert_eq!(
                handle_text(frame, guard.session(), &registry),
                HandleOutcome::Discarded
            );
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn outbound_type_from_client_is_discarded() {
        let (registry, guard, mut rx) = setup();
        let frame = r#"{"type":"LobbyCreated","payload":{"lobby":{"id":"ABCDEF","players":[]}}}"#;
        assert_eq!(
            handle_text(frame, guard.session(), &registry),
            HandleOutcome::Discarded
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.lobby_count(), 0);
    }

    #[test]
    fn join_with_lowercase_code_matches() {
        let (registry, host, _rh) = setup();
        let (guest, mut rg) = registry.register(CancellationToken::new());
        let code = registry
            .create_lobby(host.session(), &pairlink_core::PlayerProfile::default())
            .unwrap()
            .id;

        let frame = format!(
            r#"{{"type":"JoinLobby","payload":{{"player":{{"nickname":"B","avatarIdx":3}},"lobby":{{"id":" {} "}}}}}}"#,
            code.as_str().to_ascii_lowercase()
        );
        assert_eq!(
            handle_text(&frame, guest.session(), &registry),
            HandleOutcome::Delivered {
                kind: MessageType::LobbyJoined,
                accepted: 2
            }
        );
        let reply: serde_json::Value = serde_json::from_str(&rg.try_recv().unwrap()).unwrap();
        assert_eq!(reply["payload"]["lobby"]["id"], code.as_str());
        assert_eq!(reply["payload"]["lobby"]["players"][1]["avatarIdx"], 3);
    }

    #[test]
    fn player_quit_has_no_reply() {
        let (registry, guard, mut rx) = setup();
        assert_eq!(
            handle_text(r#"{"type":"PlayerQuit"}"#, guard.session(), &registry),
            HandleOutcome::NoReply
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.session_count(), 0);
    }
}
