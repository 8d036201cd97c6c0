//! Message protocol.
//!
//! Every frame is a UTF-8 JSON object `{"type": <string>, "payload": <object>}`.
//! The payload shape is determined solely by `type`. Inbound frames decode
//! into [`ClientMessage`], outbound frames are produced from [`ServerMessage`];
//! both are closed sum types so routing over them is exhaustive.
//!
//! Field names (`id`, `players`, `avatarIdx`, `isHost`) follow the wire format
//! existing clients already speak.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{LobbyCode, SessionId};

/// Every `type` value the protocol knows, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client asks to open a new lobby.
    CreateLobby,
    /// Client asks to join a lobby by code.
    JoinLobby,
    /// Client leaves the broker.
    PlayerQuit,
    /// Server greets a new connection.
    Connected,
    /// Server confirms a lobby was created.
    LobbyCreated,
    /// Server announces a lobby is complete.
    LobbyJoined,
    /// Server reports a failed request.
    Error,
}

impl MessageType {
    /// Wire representation of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateLobby => "CreateLobby",
            Self::JoinLobby => "JoinLobby",
            Self::PlayerQuit => "PlayerQuit",
            Self::Connected => "Connected",
            Self::LobbyCreated => "LobbyCreated",
            Self::LobbyJoined => "LobbyJoined",
            Self::Error => "Error",
        }
    }

    /// Parse an inbound `type` value. Outbound-only types are not accepted.
    pub fn inbound(raw: &str) -> Option<Self> {
        match raw {
            "CreateLobby" => Some(Self::CreateLobby),
            "JoinLobby" => Some(Self::JoinLobby),
            "PlayerQuit" => Some(Self::PlayerQuit),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display attributes a client supplies when creating or joining a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Name shown to the other player.
    pub nickname: String,
    /// Index into the client's avatar set.
    #[serde(rename = "avatarIdx", default)]
    pub avatar_index: u32,
}

/// Public view of a session, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Session identifier.
    pub id: SessionId,
    /// Nickname (empty until the first lobby action).
    pub nickname: String,
    /// Avatar index.
    #[serde(rename = "avatarIdx")]
    pub avatar_index: u32,
    /// Whether this player created the lobby it belongs to.
    #[serde(rename = "isHost")]
    pub is_host: bool,
}

/// Public view of a lobby: its code and members in join order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyView {
    /// Join code.
    pub id: LobbyCode,
    /// Members, host first.
    pub players: Vec<PlayerView>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Open a new lobby with the sender as host.
    CreateLobby {
        /// Sender's display attributes.
        profile: PlayerProfile,
    },
    /// Join the lobby identified by `code`.
    JoinLobby {
        /// Sender's display attributes.
        profile: PlayerProfile,
        /// Normalized join code.
        code: LobbyCode,
    },
    /// Leave the broker.
    PlayerQuit,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct CreateLobbyPayload {
    player: PlayerProfile,
}

#[derive(Deserialize)]
struct JoinLobbyPayload {
    player: PlayerProfile,
    lobby: LobbyRef,
}

#[derive(Deserialize)]
struct LobbyRef {
    id: String,
}

fn payload<T: for<'de> Deserialize<'de>>(kind: MessageType, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

impl ClientMessage {
    /// Decode one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;

        match MessageType::inbound(&raw.kind) {
            Some(kind @ MessageType::CreateLobby) => {
                let p: CreateLobbyPayload = payload(kind, raw.payload)?;
                Ok(Self::CreateLobby { profile: p.player })
            }
            Some(kind @ MessageType::JoinLobby) => {
                let p: JoinLobbyPayload = payload(kind, raw.payload)?;
                Ok(Self::JoinLobby {
                    profile: p.player,
                    code: LobbyCode::from_input(&p.lobby.id),
                })
            }
            Some(MessageType::PlayerQuit) => Ok(Self::PlayerQuit),
            _ => Err(ProtocolError::UnknownType(raw.kind)),
        }
    }

    /// The `type` this message was decoded from.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::CreateLobby { .. } => MessageType::CreateLobby,
            Self::JoinLobby { .. } => MessageType::JoinLobby,
            Self::PlayerQuit => MessageType::PlayerQuit,
        }
    }
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// First frame on every connection.
    Connected {
        /// The new session's public attributes.
        player: PlayerView,
    },
    /// Sent to the host after `CreateLobby`.
    LobbyCreated {
        /// The new lobby.
        lobby: LobbyView,
    },
    /// Sent to both members after a successful `JoinLobby`.
    LobbyJoined {
        /// The now complete lobby.
        lobby: LobbyView,
    },
    /// Sent to the requester when a lobby action fails.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Build an `Error` message from any displayable failure.
    pub fn error(err: &impl fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    /// The `type` this message is sent as.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Connected { .. } => MessageType::Connected,
            Self::LobbyCreated { .. } => MessageType::LobbyCreated,
            Self::LobbyJoined { .. } => MessageType::LobbyJoined,
            Self::Error { .. } => MessageType::Error,
        }
    }

    /// Serialize to a single text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|source| ProtocolError::Encode {
            kind: self.kind(),
            source,
        })
    }
}
