//! Protocol and lobby error types.

use thiserror::Error;

use crate::ids::{LobbyCode, SessionId};
use crate::protocol::MessageType;

/// A frame that could not be turned into a [`ClientMessage`](crate::ClientMessage).
///
/// These are logged and dropped by the connection; they never reach the
/// sender and never close the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object with a string `type` field.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// The `type` field names no inbound message.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The payload does not match the shape required by its `type`.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Message type whose payload failed to decode.
        kind: MessageType,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// An outbound message could not be serialized.
    #[error("failed to encode {kind} message: {source}")]
    Encode {
        /// Message type that failed to encode.
        kind: MessageType,
        /// Underlying encode error.
        #[source]
        source: serde_json::Error,
    },
}

/// Domain failure surfaced to the requesting client as an `Error` message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// No active lobby has this code.
    #[error("lobby with id {code} not found")]
    LobbyNotFound {
        /// Code the client asked for.
        code: LobbyCode,
    },

    /// The lobby already has two members.
    #[error("lobby with id {code} is already full")]
    LobbyFull {
        /// Code of the full lobby.
        code: LobbyCode,
    },

    /// The session is already a member of a lobby.
    #[error("session already belongs to lobby {code}")]
    AlreadyInLobby {
        /// Lobby the session currently belongs to.
        code: LobbyCode,
    },

    /// The session quit and is no longer in the registry.
    #[error("session {0} is not registered")]
    SessionNotRegistered(SessionId),

    /// Every generated candidate collided with an active lobby.
    #[error("no free lobby code after {attempts} attempts")]
    CodeSpaceExhausted {
        /// Number of candidates tried.
        attempts: usize,
    },
}
